//! Alert events raised by the ingest core

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Kind of alert event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "text", rename_all = "snake_case")]
pub enum EventKind {
    Sos,
    Fall,
    HrHigh,
    HrLow,
    Spo2Low,
    BatteryLow,
    DeviceOffline,
    StimDisconnected,
    StimError,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sos => "sos",
            Self::Fall => "fall",
            Self::HrHigh => "hr_high",
            Self::HrLow => "hr_low",
            Self::Spo2Low => "spo2_low",
            Self::BatteryLow => "battery_low",
            Self::DeviceOffline => "device_offline",
            Self::StimDisconnected => "stim_disconnected",
            Self::StimError => "stim_error",
        }
    }

    /// Severity 1..=4; 3 and up triggers guardian SMS
    pub fn severity(&self) -> i32 {
        match self {
            Self::Sos | Self::Fall => 4,
            Self::HrHigh | Self::HrLow | Self::Spo2Low | Self::StimError => 3,
            Self::BatteryLow | Self::DeviceOffline | Self::StimDisconnected => 2,
        }
    }
}

/// A persisted alert event
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Event {
    pub id: i64,
    pub band_id: i64,
    pub kind: EventKind,
    pub severity: i32,
    pub value: Option<f64>,
    pub note: Option<String>,
    pub recorded_at: DateTime<Utc>,
    /// Read/resolved are mutated by the dashboard, never by the core
    pub read: bool,
    pub resolved: bool,
    pub sms_sent: bool,
}

/// Event data before persistence assigns an id
#[derive(Debug, Clone)]
pub struct NewEvent {
    pub band_id: i64,
    pub kind: EventKind,
    pub value: Option<f64>,
    pub note: Option<String>,
    pub recorded_at: DateTime<Utc>,
}

impl NewEvent {
    pub fn new(band_id: i64, kind: EventKind, recorded_at: DateTime<Utc>) -> Self {
        Self {
            band_id,
            kind,
            value: None,
            note: None,
            recorded_at,
        }
    }

    pub fn with_value(mut self, value: f64) -> Self {
        self.value = Some(value);
        self
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }

    pub fn severity(&self) -> i32 {
        self.kind.severity()
    }
}
