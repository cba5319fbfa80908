use std::collections::BTreeMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub dispatcher: DispatcherConfig,
    pub llm: LlmConfig,
    pub webhooks: WebhookConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,
    pub graceful_shutdown_secs: u64,
}

#[derive(Clone, Debug)]
pub struct DispatcherConfig {
    pub max_session_turns: usize,
    pub dispatch_timeout_secs: u64,
    pub classifier: ClassifierKind,
    pub knowledge_base_dir: Option<PathBuf>,
}

#[derive(Clone, Debug)]
pub struct LlmConfig {
    pub provider: LlmProvider,
    pub api_key: Option<SecretString>,
    pub base_url: Option<String>,
    pub model: String,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug, Default)]
pub struct WebhookConfig {
    pub signing_secret: Option<SecretString>,
    /// Capability name to n8n (or any HTTP) webhook URL.
    pub endpoints: BTreeMap<String, String>,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClassifierKind {
    Keyword,
    Llm,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LlmProvider {
    OpenAi,
    Ollama,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub log_level: Option<String>,
    pub bind_address: Option<String>,
    pub port: Option<u16>,
    pub classifier: Option<ClassifierKind>,
    pub max_session_turns: Option<usize>,
    pub knowledge_base_dir: Option<PathBuf>,
    pub llm_provider: Option<LlmProvider>,
    pub llm_model: Option<String>,
    pub llm_api_key: Option<String>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("environment variable interpolation failed for `{var}`")]
    MissingEnvInterpolation { var: String },
    #[error("unterminated environment interpolation expression")]
    UnterminatedInterpolation,
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

pub const DEFAULT_MAX_SESSION_TURNS: usize = 10;

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                bind_address: "127.0.0.1".to_string(),
                port: 8000,
                graceful_shutdown_secs: 15,
            },
            dispatcher: DispatcherConfig {
                max_session_turns: DEFAULT_MAX_SESSION_TURNS,
                dispatch_timeout_secs: 30,
                classifier: ClassifierKind::Keyword,
                knowledge_base_dir: None,
            },
            llm: LlmConfig {
                provider: LlmProvider::OpenAi,
                api_key: None,
                base_url: Some("https://api.openai.com/v1".to_string()),
                model: "gpt-4".to_string(),
                timeout_secs: 30,
            },
            webhooks: WebhookConfig::default(),
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

fn secret_value(value: String) -> SecretString {
    value.into()
}

impl std::str::FromStr for ClassifierKind {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "keyword" => Ok(Self::Keyword),
            "llm" => Ok(Self::Llm),
            other => Err(ConfigError::Validation(format!(
                "unsupported classifier `{other}` (expected keyword|llm)"
            ))),
        }
    }
}

impl std::str::FromStr for LlmProvider {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "openai" | "open_ai" => Ok(Self::OpenAi),
            "ollama" => Ok(Self::Ollama),
            other => Err(ConfigError::Validation(format!(
                "unsupported llm provider `{other}` (expected openai|ollama)"
            ))),
        }
    }
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let expected =
                options.config_path.unwrap_or_else(|| PathBuf::from("switchboard.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(server) = patch.server {
            if let Some(bind_address) = server.bind_address {
                self.server.bind_address = bind_address;
            }
            if let Some(port) = server.port {
                self.server.port = port;
            }
            if let Some(graceful_shutdown_secs) = server.graceful_shutdown_secs {
                self.server.graceful_shutdown_secs = graceful_shutdown_secs;
            }
        }

        if let Some(dispatcher) = patch.dispatcher {
            if let Some(max_session_turns) = dispatcher.max_session_turns {
                self.dispatcher.max_session_turns = max_session_turns;
            }
            if let Some(dispatch_timeout_secs) = dispatcher.dispatch_timeout_secs {
                self.dispatcher.dispatch_timeout_secs = dispatch_timeout_secs;
            }
            if let Some(classifier) = dispatcher.classifier {
                self.dispatcher.classifier = classifier;
            }
            if let Some(knowledge_base_dir) = dispatcher.knowledge_base_dir {
                self.dispatcher.knowledge_base_dir = Some(knowledge_base_dir);
            }
        }

        if let Some(llm) = patch.llm {
            if let Some(provider) = llm.provider {
                self.llm.provider = provider;
            }
            if let Some(llm_api_key_value) = llm.api_key {
                self.llm.api_key = Some(secret_value(llm_api_key_value));
            }
            if let Some(base_url) = llm.base_url {
                self.llm.base_url = Some(base_url);
            }
            if let Some(model) = llm.model {
                self.llm.model = model;
            }
            if let Some(timeout_secs) = llm.timeout_secs {
                self.llm.timeout_secs = timeout_secs;
            }
        }

        if let Some(webhooks) = patch.webhooks {
            if let Some(signing_secret) = webhooks.signing_secret {
                self.webhooks.signing_secret = Some(secret_value(signing_secret));
            }
            self.webhooks.endpoints.extend(webhooks.endpoints);
        }

        if let Some(logging) = patch.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(format) = logging.format {
                self.logging.format = format;
            }
        }
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(value) = read_env("SWITCHBOARD_SERVER_BIND_ADDRESS") {
            self.server.bind_address = value;
        }
        if let Some(value) = read_env("SWITCHBOARD_SERVER_PORT") {
            self.server.port = parse_u16("SWITCHBOARD_SERVER_PORT", &value)?;
        }
        if let Some(value) = read_env("SWITCHBOARD_SERVER_GRACEFUL_SHUTDOWN_SECS") {
            self.server.graceful_shutdown_secs =
                parse_u64("SWITCHBOARD_SERVER_GRACEFUL_SHUTDOWN_SECS", &value)?;
        }

        if let Some(value) = read_env("SWITCHBOARD_DISPATCHER_MAX_SESSION_TURNS") {
            self.dispatcher.max_session_turns =
                parse_usize("SWITCHBOARD_DISPATCHER_MAX_SESSION_TURNS", &value)?;
        }
        if let Some(value) = read_env("SWITCHBOARD_DISPATCHER_TIMEOUT_SECS") {
            self.dispatcher.dispatch_timeout_secs =
                parse_u64("SWITCHBOARD_DISPATCHER_TIMEOUT_SECS", &value)?;
        }
        if let Some(value) = read_env("SWITCHBOARD_DISPATCHER_CLASSIFIER") {
            self.dispatcher.classifier = value.parse()?;
        }
        if let Some(value) = read_env("SWITCHBOARD_KNOWLEDGE_BASE_DIR") {
            self.dispatcher.knowledge_base_dir = Some(PathBuf::from(value));
        }

        if let Some(value) = read_env("SWITCHBOARD_LLM_PROVIDER") {
            self.llm.provider = value.parse()?;
        }
        let api_key = read_env("SWITCHBOARD_LLM_API_KEY").or_else(|| read_env("OPENAI_API_KEY"));
        if let Some(value) = api_key {
            self.llm.api_key = Some(secret_value(value));
        }
        if let Some(value) = read_env("SWITCHBOARD_LLM_BASE_URL") {
            self.llm.base_url = Some(value);
        }
        if let Some(value) = read_env("SWITCHBOARD_LLM_MODEL") {
            self.llm.model = value;
        }
        if let Some(value) = read_env("SWITCHBOARD_LLM_TIMEOUT_SECS") {
            self.llm.timeout_secs = parse_u64("SWITCHBOARD_LLM_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("SWITCHBOARD_WEBHOOK_SIGNING_SECRET") {
            self.webhooks.signing_secret = Some(secret_value(value));
        }

        let log_level =
            read_env("SWITCHBOARD_LOGGING_LEVEL").or_else(|| read_env("SWITCHBOARD_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("SWITCHBOARD_LOGGING_FORMAT").or_else(|| read_env("SWITCHBOARD_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
        if let Some(bind_address) = overrides.bind_address {
            self.server.bind_address = bind_address;
        }
        if let Some(port) = overrides.port {
            self.server.port = port;
        }
        if let Some(classifier) = overrides.classifier {
            self.dispatcher.classifier = classifier;
        }
        if let Some(max_session_turns) = overrides.max_session_turns {
            self.dispatcher.max_session_turns = max_session_turns;
        }
        if let Some(knowledge_base_dir) = overrides.knowledge_base_dir {
            self.dispatcher.knowledge_base_dir = Some(knowledge_base_dir);
        }
        if let Some(llm_provider) = overrides.llm_provider {
            self.llm.provider = llm_provider;
        }
        if let Some(llm_model) = overrides.llm_model {
            self.llm.model = llm_model;
        }
        if let Some(llm_api_key) = overrides.llm_api_key {
            self.llm.api_key = Some(secret_value(llm_api_key));
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_server(&self.server)?;
        validate_dispatcher(&self.dispatcher)?;
        if self.dispatcher.classifier == ClassifierKind::Llm {
            validate_llm(&self.llm)?;
        }
        validate_webhooks(&self.webhooks)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("switchboard.toml"), PathBuf::from("config/switchboard.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;

    let interpolated = interpolate_env_vars(&raw)?;
    toml::from_str::<ConfigPatch>(&interpolated)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next();
            let mut key = String::new();

            loop {
                match chars.next() {
                    Some('}') => break,
                    Some(next) => key.push(next),
                    None => return Err(ConfigError::UnterminatedInterpolation),
                }
            }

            let value = env::var(&key)
                .map_err(|_| ConfigError::MissingEnvInterpolation { var: key.clone() })?;
            output.push_str(&value);
            continue;
        }

        output.push(ch);
    }

    Ok(output)
}

fn validate_server(server: &ServerConfig) -> Result<(), ConfigError> {
    if server.bind_address.trim().is_empty() {
        return Err(ConfigError::Validation("server.bind_address must not be empty".to_string()));
    }

    if server.port == 0 {
        return Err(ConfigError::Validation("server.port must be greater than zero".to_string()));
    }

    if server.graceful_shutdown_secs == 0 {
        return Err(ConfigError::Validation(
            "server.graceful_shutdown_secs must be greater than zero".to_string(),
        ));
    }

    Ok(())
}

fn validate_dispatcher(dispatcher: &DispatcherConfig) -> Result<(), ConfigError> {
    if dispatcher.max_session_turns == 0 || dispatcher.max_session_turns > 1_000 {
        return Err(ConfigError::Validation(
            "dispatcher.max_session_turns must be in range 1..=1000".to_string(),
        ));
    }

    if dispatcher.dispatch_timeout_secs == 0 || dispatcher.dispatch_timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "dispatcher.dispatch_timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    if let Some(dir) = &dispatcher.knowledge_base_dir {
        if !dir.is_dir() {
            return Err(ConfigError::Validation(format!(
                "dispatcher.knowledge_base_dir `{}` is not a directory",
                dir.display()
            )));
        }
    }

    Ok(())
}

fn validate_llm(llm: &LlmConfig) -> Result<(), ConfigError> {
    if llm.timeout_secs == 0 || llm.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "llm.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    if llm.model.trim().is_empty() {
        return Err(ConfigError::Validation("llm.model must not be empty".to_string()));
    }

    match llm.provider {
        LlmProvider::OpenAi => {
            let missing = llm
                .api_key
                .as_ref()
                .map(|value| value.expose_secret().trim().is_empty())
                .unwrap_or(true);
            if missing {
                return Err(ConfigError::Validation(
                    "llm.api_key is required for the openai provider when dispatcher.classifier = \"llm\" (set SWITCHBOARD_LLM_API_KEY or OPENAI_API_KEY)"
                        .to_string(),
                ));
            }
        }
        LlmProvider::Ollama => {
            let missing =
                llm.base_url.as_ref().map(|value| value.trim().is_empty()).unwrap_or(true);
            if missing {
                return Err(ConfigError::Validation(
                    "llm.base_url is required for ollama provider".to_string(),
                ));
            }
        }
    }

    Ok(())
}

fn validate_webhooks(webhooks: &WebhookConfig) -> Result<(), ConfigError> {
    for (capability, url) in &webhooks.endpoints {
        if !url.starts_with("http://") && !url.starts_with("https://") {
            return Err(ConfigError::Validation(format!(
                "webhooks.endpoints.{capability} must start with http:// or https://"
            )));
        }
    }

    Ok(())
}

fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
    let level = logging.level.trim().to_ascii_lowercase();
    match level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(ConfigError::Validation(
            "logging.level must be one of trace|debug|info|warn|error".to_string(),
        )),
    }
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_u16(key: &str, value: &str) -> Result<u16, ConfigError> {
    value.parse::<u16>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u64(key: &str, value: &str) -> Result<u64, ConfigError> {
    value.parse::<u64>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_usize(key: &str, value: &str) -> Result<usize, ConfigError> {
    value.parse::<usize>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    server: Option<ServerPatch>,
    dispatcher: Option<DispatcherPatch>,
    llm: Option<LlmPatch>,
    webhooks: Option<WebhooksPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct ServerPatch {
    bind_address: Option<String>,
    port: Option<u16>,
    graceful_shutdown_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct DispatcherPatch {
    max_session_turns: Option<usize>,
    dispatch_timeout_secs: Option<u64>,
    classifier: Option<ClassifierKind>,
    knowledge_base_dir: Option<PathBuf>,
}

#[derive(Debug, Default, Deserialize)]
struct LlmPatch {
    provider: Option<LlmProvider>,
    api_key: Option<String>,
    base_url: Option<String>,
    model: Option<String>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct WebhooksPatch {
    signing_secret: Option<String>,
    #[serde(default)]
    endpoints: BTreeMap<String, String>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}

#[cfg(test)]
mod tests {
    use std::env;
    use std::fs;
    use std::io;
    use std::sync::{Mutex, OnceLock};

    use secrecy::ExposeSecret;
    use tempfile::TempDir;

    use super::{AppConfig, ClassifierKind, ConfigError, ConfigOverrides, LoadOptions, LogFormat};

    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();

    fn env_lock() -> &'static Mutex<()> {
        ENV_LOCK.get_or_init(|| Mutex::new(()))
    }

    fn clear_vars(vars: &[&str]) {
        for var in vars {
            env::remove_var(var);
        }
    }

    fn ensure(condition: bool, message: &'static str) -> Result<(), String> {
        if condition {
            Ok(())
        } else {
            Err(message.to_string())
        }
    }

    #[test]
    fn defaults_load_without_file_or_env() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        let config = AppConfig::load(LoadOptions::default())
            .map_err(|err| format!("config load failed: {err}"))?;

        ensure(config.dispatcher.max_session_turns == 10, "default window should be 10 turns")?;
        ensure(
            config.dispatcher.classifier == ClassifierKind::Keyword,
            "keyword classifier should be the default",
        )?;
        ensure(matches!(config.logging.format, LogFormat::Compact), "compact is the default")
    }

    #[test]
    fn file_load_supports_env_interpolation() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("TEST_SWITCHBOARD_KEY", "sk-from-env");
        env::set_var("TEST_SWITCHBOARD_HOOK", "https://n8n.local/webhook/email");

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = dir.path().join("switchboard.toml");
            fs::write(
                &path,
                r#"
[dispatcher]
classifier = "llm"

[llm]
api_key = "${TEST_SWITCHBOARD_KEY}"

[webhooks.endpoints]
send_email = "${TEST_SWITCHBOARD_HOOK}"
"#,
            )
            .map_err(|err| err.to_string())?;

            let config =
                AppConfig::load(LoadOptions { config_path: Some(path), ..LoadOptions::default() })
                    .map_err(|err| format!("config load failed: {err}"))?;

            ensure(
                config.llm.api_key.as_ref().map(|key| key.expose_secret() == "sk-from-env")
                    == Some(true),
                "api key should be interpolated from environment",
            )?;
            ensure(
                config.webhooks.endpoints.get("send_email").map(String::as_str)
                    == Some("https://n8n.local/webhook/email"),
                "webhook endpoint should be interpolated from environment",
            )?;
            Ok(())
        })();

        clear_vars(&["TEST_SWITCHBOARD_KEY", "TEST_SWITCHBOARD_HOOK"]);
        result
    }

    #[test]
    fn precedence_defaults_file_env_overrides() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("SWITCHBOARD_SERVER_PORT", "9100");
        env::set_var("SWITCHBOARD_DISPATCHER_MAX_SESSION_TURNS", "25");

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = dir.path().join("switchboard.toml");
            fs::write(
                &path,
                r#"
[server]
port = 9000
bind_address = "0.0.0.0"

[dispatcher]
max_session_turns = 5

[logging]
level = "warn"
"#,
            )
            .map_err(|err| err.to_string())?;

            let config = AppConfig::load(LoadOptions {
                config_path: Some(path),
                overrides: ConfigOverrides {
                    max_session_turns: Some(3),
                    log_level: Some("debug".to_string()),
                    ..ConfigOverrides::default()
                },
                ..LoadOptions::default()
            })
            .map_err(|err| format!("config load failed: {err}"))?;

            ensure(config.server.bind_address == "0.0.0.0", "file bind address should apply")?;
            ensure(config.server.port == 9100, "env port should win over file")?;
            ensure(config.dispatcher.max_session_turns == 3, "override should win over env")?;
            ensure(config.logging.level == "debug", "overridden log level should be debug")?;
            Ok(())
        })();

        clear_vars(&["SWITCHBOARD_SERVER_PORT", "SWITCHBOARD_DISPATCHER_MAX_SESSION_TURNS"]);
        result
    }

    #[test]
    fn llm_classifier_without_api_key_fails_fast() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("SWITCHBOARD_DISPATCHER_CLASSIFIER", "llm");

        let result = (|| -> Result<(), String> {
            let error = match AppConfig::load(LoadOptions::default()) {
                Ok(_) => {
                    return Err("expected validation failure but config load succeeded".to_string())
                }
                Err(error) => error,
            };
            let has_message = matches!(
                error,
                ConfigError::Validation(ref message) if message.contains("llm.api_key")
            );
            ensure(has_message, "validation failure should mention llm.api_key")
        })();

        clear_vars(&["SWITCHBOARD_DISPATCHER_CLASSIFIER"]);
        result
    }

    #[test]
    fn invalid_numeric_env_override_is_reported() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("SWITCHBOARD_DISPATCHER_MAX_SESSION_TURNS", "lots");

        let result = match AppConfig::load(LoadOptions::default()) {
            Err(ConfigError::InvalidEnvOverride { key, .. }) => ensure(
                key == "SWITCHBOARD_DISPATCHER_MAX_SESSION_TURNS",
                "error should name the offending variable",
            ),
            _ => Err("expected invalid env override error".to_string()),
        };

        clear_vars(&["SWITCHBOARD_DISPATCHER_MAX_SESSION_TURNS"]);
        result
    }

    #[test]
    fn secret_values_are_not_leaked_by_debug() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("SWITCHBOARD_LLM_API_KEY", "sk-secret-value");
        env::set_var("SWITCHBOARD_WEBHOOK_SIGNING_SECRET", "whsec-secret-value");

        let result = (|| -> Result<(), String> {
            let config = AppConfig::load(LoadOptions::default())
                .map_err(|err| format!("config load failed: {err}"))?;
            let debug = format!("{config:?}");

            ensure(!debug.contains("sk-secret-value"), "debug output should not contain api key")?;
            ensure(
                !debug.contains("whsec-secret-value"),
                "debug output should not contain webhook secret",
            )?;
            Ok(())
        })();

        clear_vars(&["SWITCHBOARD_LLM_API_KEY", "SWITCHBOARD_WEBHOOK_SIGNING_SECRET"]);
        result
    }
}
