use std::sync::Arc;

use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use chrono::Utc;
use serde::Serialize;
use switchboard_agent::{AgentRuntime, RuntimeStatus};

#[derive(Clone)]
pub struct HealthState {
    runtime: Arc<AgentRuntime>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthCheck {
    pub status: &'static str,
    pub detail: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: HealthCheck,
    pub registry: HealthCheck,
    pub checked_at: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct StatusResponse {
    pub version: &'static str,
    #[serde(flatten)]
    pub runtime: RuntimeStatus,
}

pub fn router(runtime: Arc<AgentRuntime>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/v1/status", get(status))
        .with_state(HealthState { runtime })
}

pub async fn health(State(state): State<HealthState>) -> (StatusCode, Json<HealthResponse>) {
    let registry = registry_check(&state.runtime);
    let ready = registry.status == "ready";

    let payload = HealthResponse {
        status: if ready { "ready" } else { "degraded" },
        service: HealthCheck {
            status: "ready",
            detail: "switchboard-server runtime initialized".to_string(),
        },
        registry,
        checked_at: Utc::now().to_rfc3339(),
    };

    let status_code = if ready { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };
    (status_code, Json(payload))
}

pub async fn status(State(state): State<HealthState>) -> Json<StatusResponse> {
    Json(StatusResponse { version: env!("CARGO_PKG_VERSION"), runtime: state.runtime.status() })
}

fn registry_check(runtime: &AgentRuntime) -> HealthCheck {
    match runtime.registry().len() {
        0 => HealthCheck { status: "degraded", detail: "no capabilities registered".to_string() },
        count => HealthCheck { status: "ready", detail: format!("{count} capabilities registered") },
    }
}
