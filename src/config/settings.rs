use crate::protocol::CompletionMarker;
use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::env;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub connection: ConnectionConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub backend: BackendConfig,
    #[serde(default)]
    pub speech: SpeechConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionConfig {
    /// WebSocket endpoint of the session manager backend.
    pub endpoint: String,
    /// Reconnect budget. Once exhausted the session stays disconnected
    /// until `connect()` is called again.
    pub max_reconnect_attempts: u32,
    /// Base delay for the linear backoff: attempt n waits n * base.
    pub backoff_base_ms: u64,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            endpoint: "ws://localhost:5000/api/query".to_string(),
            max_reconnect_attempts: 5,
            backoff_base_ms: 1000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// User id attached to every outbound request.
    pub user_id: String,
    pub channel_buffer_size: usize,
    /// How long a one-shot callback registration may wait for a response.
    pub callback_timeout_ms: u64,
    /// Granularity of the callback expiry sweep.
    pub callback_sweep_ms: u64,
    /// Which answer field marks a response as final.
    pub completion_marker: CompletionMarker,
    /// Retry eligibility when an error payload carries no `retry` flag.
    pub retry_by_default: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            user_id: "anonymous".to_string(),
            channel_buffer_size: 64,
            callback_timeout_ms: 5000,
            callback_sweep_ms: 250,
            completion_marker: CompletionMarker::default(),
            retry_by_default: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    /// Base URL of the auxiliary HTTP API (user profiles, chat sessions).
    pub base_url: String,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:5000".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpeechConfig {
    /// Base URL of the speech token endpoint.
    pub token_endpoint: String,
    /// Token lifetime as issued by the service. Tokens are refreshed a
    /// minute before this elapses.
    pub token_ttl_secs: u64,
    pub queue_buffer_size: usize,
}

impl Default for SpeechConfig {
    fn default() -> Self {
        Self {
            token_endpoint: "http://localhost:5000".to_string(),
            token_ttl_secs: 480,
            queue_buffer_size: 32,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl Settings {
    /// Layered load: optional `config/{CONFIG_ENV}` file, then `APP__`
    /// prefixed environment variables. Every field has a default, so an
    /// empty environment yields a working configuration.
    pub fn new() -> Result<Self, ConfigError> {
        let config_env = env::var("CONFIG_ENV").unwrap_or_else(|_| "default".to_string());

        let config = Config::builder()
            .add_source(File::with_name(&format!("config/{}", config_env)).required(false))
            .add_source(Environment::with_prefix("APP").separator("__"))
            .build()?;

        config.try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_usable() {
        let settings = Settings::default();
        assert_eq!(settings.connection.max_reconnect_attempts, 5);
        assert_eq!(settings.session.user_id, "anonymous");
        assert_eq!(
            settings.session.completion_marker,
            CompletionMarker::IsFinalFlag
        );
        assert!(!settings.session.retry_by_default);
    }

    #[test]
    fn test_completion_marker_from_config_string() {
        let marker: CompletionMarker = serde_json::from_str("\"data_points\"").unwrap();
        assert_eq!(marker, CompletionMarker::DataPoints);
    }
}
