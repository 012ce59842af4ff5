//! Ingest configuration loaded from environment variables
//!
//! Thresholds and intervals default to the values the band fleet has been
//! tuned against; all of them can be overridden per deployment.

use std::env;
use std::str::FromStr;

use anyhow::{Context, Result};
use vitalink_shared_config::{CommonConfig, DatabaseConfig, Environment, MqttConfig, RedisConfig};

/// What `create` does when the band already has a pending or running session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionConflictPolicy {
    /// Force-terminate the stale session, then create the new one
    #[default]
    Cleanup,
    /// Refuse the new session with a conflict error
    Reject,
}

impl FromStr for SessionConflictPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "cleanup" => Ok(Self::Cleanup),
            "reject" => Ok(Self::Reject),
            other => Err(format!("unknown conflict policy: {}", other)),
        }
    }
}

/// Ingest service configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Common configuration shared with other services
    pub common: CommonConfig,

    /// MQTT topic root for the band fleet
    pub topic_root: String,

    /// Heart rate above this raises a high-HR event (bpm)
    pub hr_high_threshold: i32,

    /// Heart rate below this raises a low-HR event (bpm)
    pub hr_low_threshold: i32,

    /// SpO2 below this raises a low-SpO2 event (%)
    pub spo2_low_threshold: i32,

    /// Battery below this raises a battery-low event (%)
    pub battery_low_threshold: i32,

    /// Suppress repeated battery-low events within this window (seconds)
    pub battery_realert_secs: i64,

    /// A band with no data for this long is considered offline (seconds)
    pub offline_threshold_secs: i64,

    /// Interval between disconnect sweeps (seconds)
    pub offline_sweep_interval_secs: u64,

    /// Interval between session-timeout sweeps (seconds)
    pub session_sweep_interval_secs: u64,

    /// Grace added past planned session duration before timing out (seconds)
    pub session_grace_secs: i64,

    /// Discrete-event dedup window (milliseconds)
    pub dedup_window_ms: u64,

    /// GPS fixes further than this from the last fix are rejected (km)
    pub gps_max_jump_km: f64,

    /// Behavior when creating a session over an existing active one
    pub session_conflict_policy: SessionConflictPolicy,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let common = CommonConfig::from_env()
            .map_err(|e| anyhow::anyhow!("Failed to load config: {}", e))?;

        Ok(Self {
            common,

            topic_root: env::var("MQTT_TOPIC_ROOT").unwrap_or_else(|_| "/DT/eHG4".to_string()),

            hr_high_threshold: env::var("VITAL_HR_HIGH")
                .unwrap_or_else(|_| "120".to_string())
                .parse()
                .context("Invalid VITAL_HR_HIGH value")?,

            hr_low_threshold: env::var("VITAL_HR_LOW")
                .unwrap_or_else(|_| "50".to_string())
                .parse()
                .context("Invalid VITAL_HR_LOW value")?,

            spo2_low_threshold: env::var("VITAL_SPO2_LOW")
                .unwrap_or_else(|_| "95".to_string())
                .parse()
                .context("Invalid VITAL_SPO2_LOW value")?,

            battery_low_threshold: env::var("BATTERY_LOW_THRESHOLD")
                .unwrap_or_else(|_| "20".to_string())
                .parse()
                .context("Invalid BATTERY_LOW_THRESHOLD value")?,

            battery_realert_secs: env::var("BATTERY_REALERT_SECS")
                .unwrap_or_else(|_| "3600".to_string())
                .parse()
                .context("Invalid BATTERY_REALERT_SECS value")?,

            offline_threshold_secs: env::var("OFFLINE_THRESHOLD_SECS")
                .unwrap_or_else(|_| "300".to_string())
                .parse()
                .context("Invalid OFFLINE_THRESHOLD_SECS value")?,

            offline_sweep_interval_secs: env::var("OFFLINE_SWEEP_INTERVAL_SECS")
                .unwrap_or_else(|_| "60".to_string())
                .parse()
                .context("Invalid OFFLINE_SWEEP_INTERVAL_SECS value")?,

            session_sweep_interval_secs: env::var("SESSION_SWEEP_INTERVAL_SECS")
                .unwrap_or_else(|_| "60".to_string())
                .parse()
                .context("Invalid SESSION_SWEEP_INTERVAL_SECS value")?,

            session_grace_secs: env::var("SESSION_GRACE_SECS")
                .unwrap_or_else(|_| "300".to_string())
                .parse()
                .context("Invalid SESSION_GRACE_SECS value")?,

            dedup_window_ms: env::var("DEDUP_WINDOW_MS")
                .unwrap_or_else(|_| "500".to_string())
                .parse()
                .context("Invalid DEDUP_WINDOW_MS value")?,

            gps_max_jump_km: env::var("GPS_MAX_JUMP_KM")
                .unwrap_or_else(|_| "700".to_string())
                .parse()
                .context("Invalid GPS_MAX_JUMP_KM value")?,

            session_conflict_policy: env::var("SESSION_CONFLICT_POLICY")
                .unwrap_or_else(|_| "cleanup".to_string())
                .parse()
                .map_err(|e: String| anyhow::anyhow!(e))
                .context("Invalid SESSION_CONFLICT_POLICY value")?,
        })
    }

    // Convenience accessors for common config fields

    /// Get database URL
    pub fn database_url(&self) -> &str {
        &self.common.database.url
    }

    /// Get Redis URL
    pub fn redis_url(&self) -> String {
        self.common.redis.connection_url()
    }

    /// Get database configuration
    pub fn database(&self) -> &DatabaseConfig {
        &self.common.database
    }

    /// Get Redis configuration
    pub fn redis(&self) -> &RedisConfig {
        &self.common.redis
    }

    /// Get MQTT broker configuration
    pub fn mqtt(&self) -> &MqttConfig {
        &self.common.mqtt
    }

    /// Get environment mode
    pub fn environment(&self) -> Environment {
        self.common.environment
    }

    /// Check if running in production
    pub fn is_production(&self) -> bool {
        self.common.environment.is_production()
    }
}
