//! Nerve-stimulation session models

use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Minimum stimulation level
pub const MIN_STIM_LEVEL: i32 = 1;
/// Maximum stimulation level
pub const MAX_STIM_LEVEL: i32 = 10;

/// Characters used for the random session id suffix
const SESSION_ID_CHARSET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// Session lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "text", rename_all = "lowercase")]
pub enum SessionStatus {
    Pending,
    Running,
    Completed,
    Stopped,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Stopped => "stopped",
        }
    }

    /// Pending and Running sessions occupy the band
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Pending | Self::Running)
    }

    pub fn is_terminal(&self) -> bool {
        !self.is_active()
    }
}

/// Why a session ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "text", rename_all = "snake_case")]
pub enum EndReason {
    Completed,
    UserStop,
    Error,
    Timeout,
    Disconnected,
    SystemCleanup,
}

impl EndReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Completed => "completed",
            Self::UserStop => "user_stop",
            Self::Error => "error",
            Self::Timeout => "timeout",
            Self::Disconnected => "disconnected",
            Self::SystemCleanup => "system_cleanup",
        }
    }
}

/// Stimulation parameters fixed at session creation (level may change while
/// running)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StimParams {
    /// Intensity level, 1..=10
    pub level: i32,
    pub frequency_hz: i32,
    pub pulse_width_us: i32,
    /// Planned duration in minutes
    pub duration_min: i32,
    pub target_nerve: String,
    pub mode: String,
}

/// A blood-pressure reading taken around a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BloodPressure {
    pub systolic: i32,
    pub diastolic: i32,
    pub pulse: i32,
}

/// A nerve-stimulation session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StimSession {
    /// Unique id of the form `STIM-YYYYMMDD-XXXXXX`
    pub session_id: String,
    pub band_id: i64,
    pub stimulator_id: String,
    pub status: SessionStatus,
    pub params: StimParams,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    pub end_reason: Option<EndReason>,
    pub bp_before: Option<BloodPressure>,
    pub bp_after: Option<BloodPressure>,
}

impl StimSession {
    /// When a Running session times out: planned end plus grace
    pub fn timeout_deadline(&self, grace_secs: i64) -> Option<DateTime<Utc>> {
        let started = self.started_at?;
        Some(started + chrono::Duration::minutes(self.params.duration_min as i64) + chrono::Duration::seconds(grace_secs))
    }
}

/// Immutable history snapshot written exactly once at termination
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct SessionRecord {
    pub session_id: String,
    pub band_id: i64,
    pub stimulator_id: String,
    pub level: i32,
    pub frequency_hz: i32,
    pub pulse_width_us: i32,
    pub target_nerve: String,
    pub mode: String,
    /// Planned duration in minutes
    pub planned_duration_min: i32,
    /// Actual duration in minutes, zero when never started
    pub actual_duration_min: i32,
    pub end_reason: EndReason,
    pub bp_before_systolic: Option<i32>,
    pub bp_before_diastolic: Option<i32>,
    pub bp_after_systolic: Option<i32>,
    pub bp_after_diastolic: Option<i32>,
    /// After minus before systolic; negative means pressure dropped
    pub bp_change: Option<i32>,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: DateTime<Utc>,
}

impl SessionRecord {
    /// Snapshot a terminated session into its history record
    pub fn from_session(session: &StimSession, end_reason: EndReason, ended_at: DateTime<Utc>) -> Self {
        let actual_duration_min = session
            .started_at
            .map(|started| ((ended_at - started).num_seconds().max(0) / 60) as i32)
            .unwrap_or(0);

        let bp_change = match (&session.bp_before, &session.bp_after) {
            (Some(before), Some(after)) => Some(after.systolic - before.systolic),
            _ => None,
        };

        Self {
            session_id: session.session_id.clone(),
            band_id: session.band_id,
            stimulator_id: session.stimulator_id.clone(),
            level: session.params.level,
            frequency_hz: session.params.frequency_hz,
            pulse_width_us: session.params.pulse_width_us,
            target_nerve: session.params.target_nerve.clone(),
            mode: session.params.mode.clone(),
            planned_duration_min: session.params.duration_min,
            actual_duration_min,
            end_reason,
            bp_before_systolic: session.bp_before.map(|bp| bp.systolic),
            bp_before_diastolic: session.bp_before.map(|bp| bp.diastolic),
            bp_after_systolic: session.bp_after.map(|bp| bp.systolic),
            bp_after_diastolic: session.bp_after.map(|bp| bp.diastolic),
            bp_change,
            started_at: session.started_at,
            ended_at,
        }
    }
}

/// Generate a session id of the form `STIM-YYYYMMDD-XXXXXX`
pub fn generate_session_id(now: DateTime<Utc>) -> String {
    let mut rng = rand::thread_rng();
    let suffix: String = (0..6)
        .map(|_| {
            let idx = rng.gen_range(0..SESSION_ID_CHARSET.len());
            SESSION_ID_CHARSET[idx] as char
        })
        .collect();
    format!("STIM-{}-{}", now.format("%Y%m%d"), suffix)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sample_session() -> StimSession {
        StimSession {
            session_id: "STIM-20260830-ABC123".to_string(),
            band_id: 1,
            stimulator_id: "NS-100".to_string(),
            status: SessionStatus::Running,
            params: StimParams {
                level: 5,
                frequency_hz: 20,
                pulse_width_us: 200,
                duration_min: 30,
                target_nerve: "vagus".to_string(),
                mode: "continuous".to_string(),
            },
            created_at: Utc.with_ymd_and_hms(2026, 8, 30, 10, 0, 0).unwrap(),
            started_at: Some(Utc.with_ymd_and_hms(2026, 8, 30, 10, 5, 0).unwrap()),
            ended_at: None,
            end_reason: None,
            bp_before: Some(BloodPressure {
                systolic: 140,
                diastolic: 90,
                pulse: 80,
            }),
            bp_after: None,
        }
    }

    #[test]
    fn test_status_activity() {
        assert!(SessionStatus::Pending.is_active());
        assert!(SessionStatus::Running.is_active());
        assert!(SessionStatus::Completed.is_terminal());
        assert!(SessionStatus::Stopped.is_terminal());
    }

    #[test]
    fn test_session_id_format() {
        let now = Utc.with_ymd_and_hms(2026, 8, 30, 12, 0, 0).unwrap();
        let id = generate_session_id(now);
        assert!(id.starts_with("STIM-20260830-"));
        assert_eq!(id.len(), "STIM-20260830-".len() + 6);
        assert!(id
            .rsplit('-')
            .next()
            .unwrap()
            .chars()
            .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit()));
    }

    #[test]
    fn test_timeout_deadline() {
        let session = sample_session();
        let deadline = session.timeout_deadline(300).unwrap();
        // 10:05 start + 30 min + 5 min grace
        assert_eq!(
            deadline,
            Utc.with_ymd_and_hms(2026, 8, 30, 10, 40, 0).unwrap()
        );
    }

    #[test]
    fn test_timeout_deadline_requires_start() {
        let mut session = sample_session();
        session.started_at = None;
        assert!(session.timeout_deadline(300).is_none());
    }

    #[test]
    fn test_record_bp_change_sign() {
        let mut session = sample_session();
        session.bp_after = Some(BloodPressure {
            systolic: 128,
            diastolic: 85,
            pulse: 76,
        });
        let ended = Utc.with_ymd_and_hms(2026, 8, 30, 10, 35, 0).unwrap();
        let record = SessionRecord::from_session(&session, EndReason::Completed, ended);
        assert_eq!(record.bp_change, Some(-12));
        assert_eq!(record.actual_duration_min, 30);
        assert_eq!(record.planned_duration_min, 30);
    }

    #[test]
    fn test_record_without_after_bp() {
        let session = sample_session();
        let ended = Utc.with_ymd_and_hms(2026, 8, 30, 10, 20, 0).unwrap();
        let record = SessionRecord::from_session(&session, EndReason::UserStop, ended);
        assert_eq!(record.bp_change, None);
        assert_eq!(record.actual_duration_min, 15);
    }

    #[test]
    fn test_record_never_started() {
        let mut session = sample_session();
        session.started_at = None;
        let record =
            SessionRecord::from_session(&session, EndReason::SystemCleanup, Utc::now());
        assert_eq!(record.actual_duration_min, 0);
        assert!(record.started_at.is_none());
    }
}
