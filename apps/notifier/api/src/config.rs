//! API process settings.

use core_config::server::ServerConfig;
use core_config::{ConfigError, FromEnv, env_optional, env_or_default};
use domain_notifications::MqConfig;
use messaging::nats::NatsConfig;
use std::path::PathBuf;

pub const DEFAULT_CONFIG_PATH: &str = "config.json";
pub const DEFAULT_API_PORT: u16 = 8080;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiSettings {
    /// `NOTIFIER_CONFIG_PATH`
    pub config_path: PathBuf,
    /// `HOST` / `API_PORT`
    pub server: ServerConfig,
    /// `NATS_URL`, overrides `mq.name_server`
    pub nats_url: Option<String>,
}

impl FromEnv for ApiSettings {
    fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            config_path: PathBuf::from(env_or_default("NOTIFIER_CONFIG_PATH", DEFAULT_CONFIG_PATH)),
            server: ServerConfig::from_env_port("API_PORT", DEFAULT_API_PORT)?,
            nats_url: env_optional("NATS_URL"),
        })
    }
}

/// Publisher connection settings for the relay's `mq` section.
pub fn nats_config(mq: &MqConfig, url_override: Option<&str>) -> NatsConfig {
    let url = url_override.unwrap_or(mq.name_server.as_str());
    let mut config = NatsConfig::new(url)
        .with_stream(mq.stream_name.as_str())
        .with_consumer_prefix(format!("{}-api", mq.group_name));

    if let Some((user, password)) = mq.credentials() {
        config = config.with_credentials(user, password);
    }
    config
}
