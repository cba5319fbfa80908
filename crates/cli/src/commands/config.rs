use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use secrecy::{ExposeSecret, SecretString};
use switchboard_core::config::{AppConfig, LoadOptions};
use toml::Value;

use crate::commands::{CommandResult, EXIT_CONFIG};

struct Field {
    key: &'static str,
    value: String,
    env_keys: &'static [&'static str],
}

impl Field {
    fn new(key: &'static str, value: impl Into<String>, env_keys: &'static [&'static str]) -> Self {
        Self { key, value: value.into(), env_keys }
    }
}

pub fn run() -> CommandResult {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure(
                "config",
                "config_validation",
                format!("config validation failed: {error}"),
                EXIT_CONFIG,
            )
        }
    };

    let config_file_path = detect_config_path();
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());

    let mut lines =
        vec!["effective config (source precedence: env > file > default):".to_string()];
    for field in fields(&config) {
        let source = field_source(
            field.key,
            field.env_keys,
            config_file_doc.as_ref(),
            config_file_path.as_deref(),
        );
        lines.push(render_line(field.key, &field.value, source));
    }

    CommandResult { exit_code: 0, output: lines.join("\n") }
}

fn fields(config: &AppConfig) -> Vec<Field> {
    let endpoints = if config.webhooks.endpoints.is_empty() {
        "<none>".to_string()
    } else {
        config.webhooks.endpoints.keys().cloned().collect::<Vec<_>>().join(", ")
    };

    vec![
        Field::new("server.bind_address", &config.server.bind_address, &[
            "SWITCHBOARD_SERVER_BIND_ADDRESS",
        ]),
        Field::new("server.port", config.server.port.to_string(), &["SWITCHBOARD_SERVER_PORT"]),
        Field::new(
            "server.graceful_shutdown_secs",
            config.server.graceful_shutdown_secs.to_string(),
            &["SWITCHBOARD_SERVER_GRACEFUL_SHUTDOWN_SECS"],
        ),
        Field::new(
            "dispatcher.classifier",
            format!("{:?}", config.dispatcher.classifier),
            &["SWITCHBOARD_DISPATCHER_CLASSIFIER"],
        ),
        Field::new(
            "dispatcher.max_session_turns",
            config.dispatcher.max_session_turns.to_string(),
            &["SWITCHBOARD_DISPATCHER_MAX_SESSION_TURNS"],
        ),
        Field::new(
            "dispatcher.dispatch_timeout_secs",
            config.dispatcher.dispatch_timeout_secs.to_string(),
            &["SWITCHBOARD_DISPATCHER_TIMEOUT_SECS"],
        ),
        Field::new(
            "dispatcher.knowledge_base_dir",
            config
                .dispatcher
                .knowledge_base_dir
                .as_ref()
                .map(|dir| dir.display().to_string())
                .unwrap_or_else(|| "<unset>".to_string()),
            &["SWITCHBOARD_KNOWLEDGE_BASE_DIR"],
        ),
        Field::new("llm.provider", format!("{:?}", config.llm.provider), &[
            "SWITCHBOARD_LLM_PROVIDER",
        ]),
        Field::new("llm.model", &config.llm.model, &["SWITCHBOARD_LLM_MODEL"]),
        Field::new("llm.base_url", config.llm.base_url.as_deref().unwrap_or("<unset>"), &[
            "SWITCHBOARD_LLM_BASE_URL",
        ]),
        Field::new("llm.api_key", redact_secret(config.llm.api_key.as_ref()), &[
            "SWITCHBOARD_LLM_API_KEY",
            "OPENAI_API_KEY",
        ]),
        Field::new("llm.timeout_secs", config.llm.timeout_secs.to_string(), &[
            "SWITCHBOARD_LLM_TIMEOUT_SECS",
        ]),
        Field::new(
            "webhooks.signing_secret",
            redact_secret(config.webhooks.signing_secret.as_ref()),
            &["SWITCHBOARD_WEBHOOK_SIGNING_SECRET"],
        ),
        Field::new("webhooks.endpoints", endpoints, &[]),
        Field::new("logging.level", &config.logging.level, &[
            "SWITCHBOARD_LOGGING_LEVEL",
            "SWITCHBOARD_LOG_LEVEL",
        ]),
        Field::new("logging.format", format!("{:?}", config.logging.format), &[
            "SWITCHBOARD_LOGGING_FORMAT",
            "SWITCHBOARD_LOG_FORMAT",
        ]),
    ]
}

fn detect_config_path() -> Option<PathBuf> {
    [PathBuf::from("switchboard.toml"), PathBuf::from("config/switchboard.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let raw = fs::read_to_string(path?).ok()?;
    raw.parse::<Value>().ok()
}

fn field_source(
    key_path: &str,
    env_keys: &[&str],
    config_file_doc: Option<&Value>,
    config_file_path: Option<&Path>,
) -> String {
    if let Some(env_key) = env_keys.iter().find(|key| env::var_os(key).is_some()) {
        return format!("env ({env_key})");
    }

    if let Some(doc) = config_file_doc {
        if contains_path(doc, key_path) {
            let file_path = config_file_path
                .map(|path| path.display().to_string())
                .unwrap_or_else(|| "config file".to_string());
            return format!("file ({file_path})");
        }
    }

    "default".to_string()
}

fn contains_path(root: &Value, key_path: &str) -> bool {
    let mut current = root;
    for key in key_path.split('.') {
        let Some(next) = current.get(key) else {
            return false;
        };
        current = next;
    }
    true
}

fn render_line(key: &str, value: &str, source: String) -> String {
    format!("- {key} = {value} (source: {source})")
}

fn redact_secret(secret: Option<&SecretString>) -> String {
    let Some(secret) = secret else {
        return "<unset>".to_string();
    };
    let trimmed = secret.expose_secret().trim();
    if trimmed.is_empty() {
        return "<empty>".to_string();
    }

    match trimmed.split_once('-') {
        Some((prefix, _)) if prefix.len() <= 5 => format!("{prefix}-***"),
        _ => "<redacted>".to_string(),
    }
}
