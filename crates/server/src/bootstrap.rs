use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use switchboard_agent::{AgentRuntime, BuildError};
use switchboard_core::config::{AppConfig, ConfigError};
use thiserror::Error;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::{agent_api, health};

pub struct Application {
    pub config: AppConfig,
    pub agent_runtime: Arc<AgentRuntime>,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("agent runtime could not be built: {0}")]
    Runtime(#[from] BuildError),
}

impl Application {
    pub fn router(&self) -> Router {
        let dispatch_timeout = Duration::from_secs(self.config.dispatcher.dispatch_timeout_secs);
        Router::new()
            .merge(health::router(Arc::clone(&self.agent_runtime)))
            .merge(agent_api::router(Arc::clone(&self.agent_runtime), dispatch_timeout))
            .layer(TraceLayer::new_for_http())
    }
}

pub fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        classifier = ?config.dispatcher.classifier,
        "starting application bootstrap"
    );

    let agent_runtime = Arc::new(AgentRuntime::from_config(&config)?);
    info!(
        event_name = "system.bootstrap.runtime_ready",
        correlation_id = "bootstrap",
        capabilities = agent_runtime.registry().len(),
        "agent runtime initialized"
    );

    Ok(Application { config, agent_runtime })
}

#[cfg(test)]
mod tests {
    use switchboard_core::config::{AppConfig, ConfigOverrides, LoadOptions};

    use crate::bootstrap::{bootstrap_with_config, Application, BootstrapError};

    fn bootstrap(options: LoadOptions) -> Result<Application, BootstrapError> {
        bootstrap_with_config(AppConfig::load(options)?)
    }

    #[test]
    fn bootstrap_fails_fast_when_llm_classifier_has_no_key() {
        let result = bootstrap(LoadOptions {
            config_path: Some("/nonexistent/switchboard.toml".into()),
            overrides: ConfigOverrides {
                classifier: Some(switchboard_core::config::ClassifierKind::Llm),
                llm_api_key: Some(String::new()),
                ..ConfigOverrides::default()
            },
            ..LoadOptions::default()
        });

        let message = result.err().expect("error").to_string();
        assert!(message.contains("llm.api_key"));
    }

    #[test]
    fn bootstrap_fails_when_knowledge_base_is_missing() {
        let result = bootstrap(LoadOptions {
            config_path: Some("/nonexistent/switchboard.toml".into()),
            overrides: ConfigOverrides {
                knowledge_base_dir: Some("/nonexistent/knowledge".into()),
                ..ConfigOverrides::default()
            },
            ..LoadOptions::default()
        });

        assert!(result.is_err());
    }

    #[test]
    fn bootstrap_registers_stock_capabilities() {
        let app = bootstrap(LoadOptions {
            config_path: Some("/nonexistent/switchboard.toml".into()),
            ..LoadOptions::default()
        })
        .expect("default bootstrap");

        assert_eq!(app.agent_runtime.registry().len(), 5);
    }
}
