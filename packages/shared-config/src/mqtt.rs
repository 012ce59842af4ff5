//! MQTT broker configuration types

use crate::{get_env_or_default, parse_env, ConfigResult};
use std::env;

/// MQTT broker configuration
#[derive(Debug, Clone)]
pub struct MqttConfig {
    /// Broker hostname
    pub host: String,

    /// Broker port
    pub port: u16,

    /// Optional username for broker authentication
    pub username: Option<String>,

    /// Optional password for broker authentication
    pub password: Option<String>,

    /// Client identifier prefix (a unique suffix is appended per process)
    pub client_id_prefix: String,

    /// Keep-alive interval in seconds
    pub keep_alive_secs: u64,

    /// Inbound event channel capacity
    pub channel_capacity: usize,
}

impl MqttConfig {
    /// Load MQTT configuration from environment variables
    pub fn from_env() -> ConfigResult<Self> {
        Ok(Self {
            host: get_env_or_default("MQTT_BROKER_HOST", "localhost"),
            port: parse_env("MQTT_BROKER_PORT", 1883)?,
            username: env::var("MQTT_USERNAME").ok().filter(|s| !s.is_empty()),
            password: env::var("MQTT_PASSWORD").ok().filter(|s| !s.is_empty()),
            client_id_prefix: get_env_or_default("MQTT_CLIENT_ID_PREFIX", "vitalink-ingest"),
            keep_alive_secs: parse_env("MQTT_KEEP_ALIVE", 60)?,
            channel_capacity: parse_env("MQTT_CHANNEL_CAPACITY", 256)?,
        })
    }

    /// Check if broker credentials are configured
    pub fn has_credentials(&self) -> bool {
        self.username.is_some() && self.password.is_some()
    }
}

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 1883,
            username: None,
            password: None,
            client_id_prefix: "vitalink-ingest".to_string(),
            keep_alive_secs: 60,
            channel_capacity: 256,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = MqttConfig::default();
        assert_eq!(config.host, "localhost");
        assert_eq!(config.port, 1883);
        assert!(!config.has_credentials());
    }

    #[test]
    fn test_has_credentials() {
        let config = MqttConfig {
            username: Some("user".to_string()),
            password: Some("pass".to_string()),
            ..MqttConfig::default()
        };
        assert!(config.has_credentials());
    }
}
