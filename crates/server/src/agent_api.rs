use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{delete, get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use switchboard_agent::{AgentRuntime, ExecutionOutcome};
use switchboard_core::{
    ApplicationError, CapabilityCard, ConversationTurn, DispatchError, InterfaceError, Invocation,
    SessionId,
};
use tracing::{info, warn};
use uuid::Uuid;

#[derive(Clone)]
pub struct AgentApiState {
    runtime: Arc<AgentRuntime>,
    dispatch_timeout: Duration,
}

#[derive(Debug, Deserialize)]
pub struct DispatchRequest {
    pub instruction: String,
    #[serde(default)]
    pub context: Value,
    pub session_id: Option<String>,
    #[serde(default)]
    pub execute: bool,
}

#[derive(Debug, Serialize)]
pub struct DispatchResponse {
    pub correlation_id: String,
    pub invocation: Invocation,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub execution: Option<ExecutionOutcome>,
}

#[derive(Debug, Default, Deserialize)]
pub struct HistoryQuery {
    pub limit: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct HistoryResponse {
    pub session_id: String,
    pub turns: Vec<ConversationTurn>,
}

#[derive(Debug, Serialize)]
pub struct ClearResponse {
    pub session_id: String,
    pub cleared: bool,
}

#[derive(Debug, Serialize)]
pub struct CapabilitiesResponse {
    pub capabilities: Vec<CapabilityCard>,
}

#[derive(Debug, Serialize)]
pub struct ApiError {
    pub error: String,
    pub detail: String,
    pub correlation_id: String,
}

type ApiRejection = (StatusCode, Json<ApiError>);

pub fn router(runtime: Arc<AgentRuntime>, dispatch_timeout: Duration) -> Router {
    Router::new()
        .route("/api/v1/agent/dispatch", post(dispatch))
        .route("/api/v1/agent/sessions/{session_id}/history", get(history))
        .route("/api/v1/agent/sessions/{session_id}", delete(clear_session))
        .route("/api/v1/agent/capabilities", get(capabilities))
        .with_state(AgentApiState { runtime, dispatch_timeout })
}

fn reject(error: ApplicationError, correlation_id: &str) -> ApiRejection {
    let interface = error.into_interface(correlation_id);
    let status = match &interface {
        InterfaceError::BadRequest { .. } => StatusCode::BAD_REQUEST,
        InterfaceError::BadGateway { .. } => StatusCode::BAD_GATEWAY,
        InterfaceError::ServiceUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
        InterfaceError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
    };
    warn!(
        event_name = "server.agent.request_failed",
        correlation_id = %interface.correlation_id(),
        status = status.as_u16(),
        error = %interface,
        "agent request failed"
    );
    (
        status,
        Json(ApiError {
            error: interface.user_message().to_string(),
            detail: interface.message().to_string(),
            correlation_id: interface.correlation_id().to_string(),
        }),
    )
}

fn session_id(raw: Option<String>) -> Option<SessionId> {
    raw.map(|value| value.trim().to_string()).filter(|value| !value.is_empty()).map(SessionId::new)
}

pub async fn dispatch(
    State(state): State<AgentApiState>,
    Json(request): Json<DispatchRequest>,
) -> Result<Json<DispatchResponse>, ApiRejection> {
    let correlation_id = Uuid::new_v4().to_string();
    if request.instruction.trim().is_empty() {
        return Err(reject(
            DispatchError::InvalidArguments("instruction must not be empty".to_string()).into(),
            &correlation_id,
        ));
    }
    let session_id = session_id(request.session_id);

    let dispatched = tokio::time::timeout(
        state.dispatch_timeout,
        state.runtime.dispatch(&request.instruction, &request.context, session_id.as_ref()),
    )
    .await;
    let invocation = match dispatched {
        Ok(Ok(invocation)) => invocation,
        Ok(Err(error)) => return Err(reject(error.into(), &correlation_id)),
        Err(_) => {
            return Err(reject(
                ApplicationError::Timeout(state.dispatch_timeout.as_secs()),
                &correlation_id,
            ))
        }
    };

    info!(
        event_name = "server.agent.dispatched",
        correlation_id = %correlation_id,
        capability = invocation.capability_name().unwrap_or("none"),
        session_id = session_id.as_ref().map(SessionId::as_str),
        execute = request.execute,
        "dispatch request handled"
    );

    let execution = if request.execute && !invocation.is_none() {
        let outcome = state
            .runtime
            .execute(&invocation)
            .await
            .map_err(|error| reject(error, &correlation_id))?;
        Some(outcome)
    } else {
        None
    };

    Ok(Json(DispatchResponse { correlation_id, invocation, execution }))
}

pub async fn history(
    State(state): State<AgentApiState>,
    Path(session_id): Path<String>,
    Query(query): Query<HistoryQuery>,
) -> Json<HistoryResponse> {
    let turns = state.runtime.history(&SessionId::new(session_id.as_str()), query.limit);
    Json(HistoryResponse { session_id, turns })
}

pub async fn clear_session(
    State(state): State<AgentApiState>,
    Path(session_id): Path<String>,
) -> Json<ClearResponse> {
    state.runtime.clear(&SessionId::new(session_id.as_str()));
    info!(
        event_name = "server.agent.session_cleared",
        session_id = %session_id,
        "session cleared"
    );
    Json(ClearResponse { session_id, cleared: true })
}

pub async fn capabilities(State(state): State<AgentApiState>) -> Json<CapabilitiesResponse> {
    Json(CapabilitiesResponse { capabilities: state.runtime.capabilities() })
}
