use std::time::Duration;

use config::{Config, ConfigError, Environment, File, FileFormat};
use serde::Deserialize;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ClientSettings {
    pub server_url: String,
    pub workflow_id: String,
    pub interviewer_assistant: String,
    #[serde(default)]
    pub feedback_timeout_secs: Option<u64>,
}

impl ClientSettings {
    /// Defaults, then `call_client.toml` if present, then `CALL_CLIENT__*`
    /// environment variables.
    pub fn load() -> Result<Self, ConfigError> {
        Self::builder()?
            .add_source(File::with_name("call_client").required(false))
            .add_source(
                Environment::with_prefix("CALL_CLIENT")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()
    }

    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        Self::builder()?
            .add_source(File::from_str(raw, FileFormat::Toml))
            .build()?
            .try_deserialize()
    }

    fn builder() -> Result<config::ConfigBuilder<config::builder::DefaultState>, ConfigError> {
        Config::builder()
            .set_default("server_url", "http://127.0.0.1:8080")?
            .set_default("workflow_id", "interview-generator")?
            .set_default("interviewer_assistant", "interviewer")
    }

    pub fn feedback_timeout(&self) -> Option<Duration> {
        self.feedback_timeout_secs
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
    }
}
