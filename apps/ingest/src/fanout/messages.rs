//! Fanout channels and event payloads

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{ConnectState, EndReason, EventKind, SessionStatus};

/// A fanout channel subscribers attach to
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Channel {
    /// Everything about one band
    Band(String),
    /// Everything about one session
    Session(String),
    /// Fleet-wide status changes
    Dashboard,
    /// Raised alert events
    Alerts,
}

impl Channel {
    pub fn band(bid: impl Into<String>) -> Self {
        Self::Band(bid.into())
    }

    pub fn session(session_id: impl Into<String>) -> Self {
        Self::Session(session_id.into())
    }

    /// Channel name as used on the wire and in Redis
    pub fn name(&self) -> String {
        match self {
            Self::Band(bid) => format!("band:{}", bid),
            Self::Session(session_id) => format!("session:{}", session_id),
            Self::Dashboard => "dashboard".to_string(),
            Self::Alerts => "alerts".to_string(),
        }
    }

    /// Parse a channel name back into a `Channel`
    pub fn parse(name: &str) -> Option<Self> {
        if let Some(bid) = name.strip_prefix("band:") {
            return Some(Self::Band(bid.to_string()));
        }
        if let Some(session_id) = name.strip_prefix("session:") {
            return Some(Self::Session(session_id.to_string()));
        }
        match name {
            "dashboard" => Some(Self::Dashboard),
            "alerts" => Some(Self::Alerts),
            _ => None,
        }
    }
}

/// Events published to subscribers
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "event_type", rename_all = "snake_case")]
pub enum FanoutEvent {
    /// Band connection or battery status changed
    BandStatus {
        bid: String,
        connect_state: ConnectState,
        battery: Option<i32>,
        at: DateTime<Utc>,
    },
    /// New telemetry accepted from a band
    Telemetry {
        bid: String,
        heart_rate: Option<i32>,
        spo2: Option<i32>,
        walk_steps: i64,
        run_steps: i64,
        at: DateTime<Utc>,
    },
    /// New location fix accepted from a band
    Location {
        bid: String,
        latitude: f64,
        longitude: f64,
        at: DateTime<Utc>,
    },
    /// Session state changed
    SessionUpdate {
        session_id: String,
        bid: String,
        status: SessionStatus,
        level: i32,
        end_reason: Option<EndReason>,
        at: DateTime<Utc>,
    },
    /// Alert event raised
    Alert {
        bid: String,
        kind: EventKind,
        severity: i32,
        value: Option<f64>,
        at: DateTime<Utc>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_names() {
        assert_eq!(Channel::band("12345").name(), "band:12345");
        assert_eq!(
            Channel::session("STIM-20260830-ABC123").name(),
            "session:STIM-20260830-ABC123"
        );
        assert_eq!(Channel::Dashboard.name(), "dashboard");
        assert_eq!(Channel::Alerts.name(), "alerts");
    }

    #[test]
    fn test_channel_parse_round_trip() {
        for channel in [
            Channel::band("12345"),
            Channel::session("STIM-20260830-ABC123"),
            Channel::Dashboard,
            Channel::Alerts,
        ] {
            assert_eq!(Channel::parse(&channel.name()), Some(channel));
        }
        assert_eq!(Channel::parse("unknown"), None);
    }

    #[test]
    fn test_event_serialization_tag() {
        let event = FanoutEvent::Alert {
            bid: "12345".to_string(),
            kind: EventKind::Sos,
            severity: 4,
            value: None,
            at: Utc::now(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event_type"], "alert");
        assert_eq!(json["kind"], "sos");
    }
}
