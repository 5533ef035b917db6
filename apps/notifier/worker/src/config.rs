//! Worker process settings.

use core_config::server::ServerConfig;
use core_config::{env_optional, env_or_default, env_parse, ConfigError, FromEnv};
use domain_notifications::{MqConfig, DEFAULT_HTTP_TIMEOUT};
use messaging::nats::NatsConfig;
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_CONFIG_PATH: &str = "config.json";
pub const DEFAULT_HEALTH_PORT: u16 = 8081;

/// Settings read from the environment; routing lives in the relay config file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerSettings {
    /// `NOTIFIER_CONFIG_PATH`
    pub config_path: PathBuf,
    /// `HOST` / `HEALTH_PORT`
    pub health: ServerConfig,
    /// `HTTP_TIMEOUT_SECS`, per outbound attempt
    pub http_timeout: Duration,
    /// `NATS_URL`, overrides `mq.name_server`
    pub nats_url: Option<String>,
}

impl FromEnv for WorkerSettings {
    fn from_env() -> Result<Self, ConfigError> {
        let timeout_secs: u64 = env_parse("HTTP_TIMEOUT_SECS", DEFAULT_HTTP_TIMEOUT.as_secs())?;
        if timeout_secs == 0 {
            return Err(ConfigError::ParseError {
                key: "HTTP_TIMEOUT_SECS".to_string(),
                details: "must be greater than zero".to_string(),
            });
        }

        Ok(Self {
            config_path: PathBuf::from(env_or_default("NOTIFIER_CONFIG_PATH", DEFAULT_CONFIG_PATH)),
            health: ServerConfig::from_env_port("HEALTH_PORT", DEFAULT_HEALTH_PORT)?,
            http_timeout: Duration::from_secs(timeout_secs),
            nats_url: env_optional("NATS_URL"),
        })
    }
}

/// Broker settings for the relay's `mq` section.
pub fn nats_config(mq: &MqConfig, url_override: Option<&str>) -> NatsConfig {
    let url = url_override.unwrap_or(mq.name_server.as_str());
    let mut config = NatsConfig::new(url)
        .with_stream(mq.stream_name.as_str())
        .with_consumer_prefix(mq.group_name.as_str());

    if let Some((user, password)) = mq.credentials() {
        config = config.with_credentials(user, password);
    }
    config
}
