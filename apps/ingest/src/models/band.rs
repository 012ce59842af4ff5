//! Band identity and connection state

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Band connection state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "text", rename_all = "lowercase")]
pub enum ConnectState {
    Online,
    Offline,
}

impl ConnectState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Online => "online",
            Self::Offline => "offline",
        }
    }
}

/// Derive the canonical band identifier from the hardware extended address.
///
/// The band reports its 64-bit IEEE address as two 32-bit halves; the bid is
/// the decimal rendering of `(high << 32) | low`.
pub fn bid_from_ext_address(high: u32, low: u32) -> String {
    (((high as u64) << 32) | low as u64).to_string()
}

/// A band record
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Band {
    pub id: i64,
    /// Canonical device identifier derived from the extended address
    pub bid: String,
    pub connect_state: ConnectState,
    pub connect_time: Option<DateTime<Utc>>,
    pub disconnect_time: Option<DateTime<Utc>>,
    /// Last accepted inbound data of any kind
    pub last_data_at: Option<DateTime<Utc>>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    /// Cumulative reconciled step counters
    pub walk_steps: i64,
    pub run_steps: i64,
    /// Raw device counters as last reported, for reconciliation
    pub raw_walk_steps: i64,
    pub raw_run_steps: i64,
    pub battery: Option<i32>,
    pub stimulator_id: Option<String>,
    pub stimulator_connected: bool,
    /// Guardian contact for emergency alerts
    pub guardian_phone: Option<String>,
    /// Wearer's display name for alert messages
    pub wearer_name: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Band {
    /// A freshly provisioned band, created on first contact
    pub fn provisioned(id: i64, bid: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            id,
            bid: bid.into(),
            connect_state: ConnectState::Offline,
            connect_time: None,
            disconnect_time: None,
            last_data_at: None,
            latitude: None,
            longitude: None,
            walk_steps: 0,
            run_steps: 0,
            raw_walk_steps: 0,
            raw_run_steps: 0,
            battery: None,
            stimulator_id: None,
            stimulator_connected: false,
            guardian_phone: None,
            wearer_name: None,
            created_at: now,
        }
    }

    pub fn is_online(&self) -> bool {
        self.connect_state == ConnectState::Online
    }
}
