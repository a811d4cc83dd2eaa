//! Assistant configuration loader.

use crate::llm_client::ModelEndpoint;
use crate::store::SessionConfig;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Config file not found: {0}")]
    NotFound(String),

    #[error("Config file is empty")]
    Empty,

    #[error("Invalid YAML: {0}")]
    InvalidYaml(String),

    #[error("Invalid config: {0}")]
    Invalid(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Fully resolved assistant configuration.
#[derive(Debug, Clone)]
pub struct AssistantConfig {
    pub model: ModelSettings,
    pub session: SessionSettings,
    pub service: ServiceSettings,
    /// System prompt content, loaded from the referenced file when one is
    /// configured.
    pub system_prompt: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ModelSettings {
    pub base_url: String,
    pub model: String,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SessionSettings {
    #[serde(default = "default_max_sessions")]
    pub max_sessions: usize,
    #[serde(default = "default_ttl_secs")]
    pub ttl_secs: u64,
    /// Defaults to ttl / 24 when absent.
    #[serde(default)]
    pub sweep_interval_secs: Option<u64>,
    #[serde(default = "default_max_rounds")]
    pub max_rounds: usize,
    /// Path to the system prompt file, relative to the config file.
    #[serde(default)]
    pub system_prompt_file: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServiceSettings {
    #[serde(default = "default_max_concurrent_turns")]
    pub max_concurrent_turns: usize,
    #[serde(default)]
    pub turn_timeout_secs: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct RawConfig {
    model: ModelSettings,
    #[serde(default)]
    session: Option<SessionSettings>,
    #[serde(default)]
    service: Option<ServiceSettings>,
}

fn default_max_tokens() -> u32 {
    1024
}

fn default_request_timeout_secs() -> u64 {
    120
}

fn default_max_sessions() -> usize {
    100
}

fn default_ttl_secs() -> u64 {
    30 * 60
}

fn default_max_rounds() -> usize {
    crate::engine::DEFAULT_MAX_ROUNDS
}

fn default_max_concurrent_turns() -> usize {
    100
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            max_sessions: default_max_sessions(),
            ttl_secs: default_ttl_secs(),
            sweep_interval_secs: None,
            max_rounds: default_max_rounds(),
            system_prompt_file: None,
        }
    }
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self {
            max_concurrent_turns: default_max_concurrent_turns(),
            turn_timeout_secs: None,
        }
    }
}

/// Load and validate assistant configuration from a YAML file.
///
/// The system prompt file, when configured, is resolved relative to the
/// config file and loaded eagerly so a bad path fails at startup rather
/// than on the first chat message.
pub fn load_config(config_path: &str) -> Result<AssistantConfig, ConfigError> {
    let config_file = Path::new(config_path);

    if !config_file.exists() {
        return Err(ConfigError::NotFound(config_path.to_string()));
    }

    let content = std::fs::read_to_string(config_file)?;
    if content.trim().is_empty() {
        return Err(ConfigError::Empty);
    }

    let raw: RawConfig =
        serde_yaml::from_str(&content).map_err(|err| ConfigError::InvalidYaml(err.to_string()))?;

    let session = raw.session.unwrap_or_default();
    let service = raw.service.unwrap_or_default();

    validate(&raw.model, &session, &service)?;

    let system_prompt = match &session.system_prompt_file {
        Some(prompt_file) => {
            let prompt_path = if Path::new(prompt_file).is_absolute() {
                Path::new(prompt_file).to_path_buf()
            } else {
                config_file
                    .parent()
                    .unwrap_or_else(|| Path::new("."))
                    .join(prompt_file)
            };
            if !prompt_path.exists() {
                return Err(ConfigError::Invalid(format!(
                    "System prompt file not found: {}",
                    prompt_path.display()
                )));
            }
            Some(std::fs::read_to_string(&prompt_path)?)
        }
        None => None,
    };

    Ok(AssistantConfig {
        model: raw.model,
        session,
        service,
        system_prompt,
    })
}

fn validate(
    model: &ModelSettings,
    session: &SessionSettings,
    service: &ServiceSettings,
) -> Result<(), ConfigError> {
    if model.base_url.trim().is_empty() {
        return Err(ConfigError::Invalid(
            "model.base_url must be non-empty".to_string(),
        ));
    }
    if model.model.trim().is_empty() {
        return Err(ConfigError::Invalid(
            "model.model must be non-empty".to_string(),
        ));
    }
    if session.max_sessions == 0 {
        return Err(ConfigError::Invalid(
            "session.max_sessions must be positive".to_string(),
        ));
    }
    if session.ttl_secs == 0 {
        return Err(ConfigError::Invalid(
            "session.ttl_secs must be positive".to_string(),
        ));
    }
    if session.max_rounds == 0 {
        return Err(ConfigError::Invalid(
            "session.max_rounds must be positive".to_string(),
        ));
    }
    if let Some(sweep) = session.sweep_interval_secs {
        if sweep == 0 || sweep > session.ttl_secs {
            return Err(ConfigError::Invalid(
                "session.sweep_interval_secs must be positive and no longer than the TTL"
                    .to_string(),
            ));
        }
    }
    if service.max_concurrent_turns == 0 {
        return Err(ConfigError::Invalid(
            "service.max_concurrent_turns must be positive".to_string(),
        ));
    }
    Ok(())
}

impl AssistantConfig {
    /// Session store configuration derived from these settings.
    pub fn session_config(&self) -> SessionConfig {
        let ttl = Duration::from_secs(self.session.ttl_secs);
        let sweep_interval = self
            .session
            .sweep_interval_secs
            .map(Duration::from_secs)
            .unwrap_or_else(|| SessionConfig::derive_sweep_interval(ttl));

        let defaults = SessionConfig::default();
        SessionConfig {
            max_sessions: self.session.max_sessions,
            ttl,
            sweep_interval,
            max_rounds: self.session.max_rounds,
            system_prompt: self
                .system_prompt
                .clone()
                .unwrap_or(defaults.system_prompt),
        }
    }

    /// Model endpoint settings; the API key is supplied by the caller (it
    /// comes from the environment, never from config files).
    pub fn endpoint(&self, api_key: String) -> ModelEndpoint {
        ModelEndpoint {
            base_url: self.model.base_url.clone(),
            api_key,
            model: self.model.model.clone(),
            max_tokens: self.model.max_tokens,
            request_timeout: Duration::from_secs(self.model.request_timeout_secs),
        }
    }

    pub fn turn_timeout(&self) -> Option<Duration> {
        self.service.turn_timeout_secs.map(Duration::from_secs)
    }
}
