//! Shared configuration types for Vitalink services
//!
//! This crate provides common configuration types used by the ingest core
//! and any companion services, ensuring consistency across the deployment.

mod database;
mod error;
mod mqtt;
mod redis;

pub use database::DatabaseConfig;
pub use error::{ConfigError, ConfigResult};
pub use mqtt::MqttConfig;
pub use redis::RedisConfig;

use std::env;

/// Common configuration shared between all services
#[derive(Debug, Clone)]
pub struct CommonConfig {
    /// Database configuration
    pub database: DatabaseConfig,

    /// Redis configuration
    pub redis: RedisConfig,

    /// MQTT broker configuration
    pub mqtt: MqttConfig,

    /// Environment mode (development, staging, production)
    pub environment: Environment,

    /// Log level (from RUST_LOG or LOG_LEVEL)
    pub log_level: String,
}

/// Application environment mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Environment {
    #[default]
    Development,
    Staging,
    Production,
}

impl std::str::FromStr for Environment {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.to_lowercase().as_str() {
            "production" | "prod" => Self::Production,
            "staging" | "stage" => Self::Staging,
            _ => Self::Development,
        })
    }
}

impl Environment {
    /// Check if this is a production environment
    pub fn is_production(&self) -> bool {
        matches!(self, Self::Production)
    }

    /// Check if this is a development environment
    pub fn is_development(&self) -> bool {
        matches!(self, Self::Development)
    }
}

impl std::fmt::Display for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Development => write!(f, "development"),
            Self::Staging => write!(f, "staging"),
            Self::Production => write!(f, "production"),
        }
    }
}

impl CommonConfig {
    /// Load common configuration from environment variables
    pub fn from_env() -> ConfigResult<Self> {
        Ok(Self {
            database: DatabaseConfig::from_env()?,
            redis: RedisConfig::from_env()?,
            mqtt: MqttConfig::from_env()?,
            environment: env::var("ENVIRONMENT")
                .unwrap_or_else(|_| "development".to_string())
                .parse()
                .unwrap_or_default(),
            log_level: env::var("RUST_LOG")
                .or_else(|_| env::var("LOG_LEVEL"))
                .unwrap_or_else(|_| "info".to_string()),
        })
    }
}

/// Helper function to get a required environment variable
pub fn get_required_env(name: &str) -> ConfigResult<String> {
    env::var(name).map_err(|_| ConfigError::MissingEnvVar(name.to_string()))
}

/// Helper function to get an optional environment variable with a default
pub fn get_env_or_default(name: &str, default: &str) -> String {
    env::var(name).unwrap_or_else(|_| default.to_string())
}

/// Helper function to parse an environment variable into a specific type
pub fn parse_env<T>(name: &str, default: T) -> ConfigResult<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(name) {
        Ok(val) => val
            .parse()
            .map_err(|e| ConfigError::InvalidValue(name.to_string(), format!("{}", e))),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_environment_parsing() {
        assert_eq!(
            "production".parse::<Environment>().unwrap(),
            Environment::Production
        );
        assert_eq!(
            "prod".parse::<Environment>().unwrap(),
            Environment::Production
        );
        assert_eq!(
            "staging".parse::<Environment>().unwrap(),
            Environment::Staging
        );
        assert_eq!(
            "anything".parse::<Environment>().unwrap(),
            Environment::Development
        );
    }

    #[test]
    fn test_environment_display() {
        assert_eq!(format!("{}", Environment::Production), "production");
        assert_eq!(format!("{}", Environment::Development), "development");
    }

    #[test]
    fn test_parse_env_helpers() {
        temp_env::with_vars(
            [
                ("VL_TEST_PORT", Some("5432")),
                ("VL_TEST_NAME", Some("vitalink")),
            ],
            || {
                assert_eq!(parse_env("VL_TEST_PORT", 0u16).unwrap(), 5432);
                assert_eq!(parse_env("VL_TEST_MISSING", 9u16).unwrap(), 9);
                assert_eq!(get_env_or_default("VL_TEST_NAME", "x"), "vitalink");
                assert_eq!(get_required_env("VL_TEST_NAME").unwrap(), "vitalink");
                assert!(get_required_env("VL_TEST_MISSING").is_err());
            },
        );
    }

    #[test]
    fn test_parse_env_rejects_garbage() {
        temp_env::with_var("VL_TEST_PORT", Some("not_a_port"), || {
            assert!(parse_env("VL_TEST_PORT", 0u16).is_err());
        });
    }

    #[test]
    fn test_environment_checks() {
        assert!(Environment::Production.is_production());
        assert!(!Environment::Production.is_development());
        assert!(Environment::Development.is_development());
        assert!(!Environment::Development.is_production());
    }
}
