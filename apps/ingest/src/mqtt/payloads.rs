//! Wire payloads exchanged with the band fleet
//!
//! Inbound frames are decoded with serde at the boundary; missing
//! optional fields become `None` rather than decode failures. Hardware
//! identity arrives as a split 64-bit address pair, never as a bid.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{bid_from_ext_address, EventKind, StimParams, TelemetrySample};

/// Split 64-bit hardware address as the bands report it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub struct ExtAddress {
    pub low: u32,
    pub high: u32,
}

impl ExtAddress {
    /// Canonical band identifier derived from the address pair
    pub fn bid(&self) -> String {
        bid_from_ext_address(self.high, self.low)
    }
}

/// Nested sensor block inside a sync frame
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BandData {
    pub hr: Option<i32>,
    pub spo2: Option<i32>,
    pub battery_level: Option<i32>,
    pub skin_temp: Option<f64>,
    pub x: Option<f64>,
    pub y: Option<f64>,
    pub z: Option<f64>,
    pub walk_steps: Option<i64>,
    pub run_steps: Option<i64>,
    pub activity: Option<i32>,
    #[serde(rename = "motionFlag")]
    pub motion_flag: Option<i32>,
    #[serde(rename = "scdState")]
    pub scd_state: Option<i32>,
    pub rssi: Option<i32>,
}

/// Frame carried on the sync and async post topics
///
/// Sync frames carry `bandData`; async frames carry `type` and `value`.
/// The hardware occasionally sends both in one frame, so the decoder
/// accepts either combination.
#[derive(Debug, Clone, Deserialize)]
pub struct BandFrame {
    #[serde(rename = "extAddress")]
    pub ext_address: ExtAddress,
    #[serde(rename = "type")]
    pub type_code: Option<i32>,
    pub value: Option<i32>,
    #[serde(rename = "bandData")]
    pub band_data: Option<BandData>,
}

impl BandFrame {
    /// Build a telemetry sample from the sensor block, if present
    pub fn sample(&self, band_id: i64, recorded_at: DateTime<Utc>) -> Option<TelemetrySample> {
        let data = self.band_data.as_ref()?;
        Some(TelemetrySample {
            band_id,
            recorded_at,
            heart_rate: data.hr,
            spo2: data.spo2,
            motion: data.motion_flag,
            scd_state: data.scd_state,
            activity: data.activity,
            battery: data.battery_level,
            rssi: data.rssi,
            skin_temp: data.skin_temp,
            raw_walk_steps: data.walk_steps.unwrap_or(0),
            raw_run_steps: data.run_steps.unwrap_or(0),
            accel_x: data.x,
            accel_y: data.y,
            accel_z: data.z,
        })
    }

    /// Discrete event signalled by this frame, if the type code is known
    pub fn event_kind(&self) -> Option<EventKind> {
        self.type_code.and_then(event_kind_from_code)
    }
}

/// Map the hardware's async event type codes to event kinds
pub fn event_kind_from_code(code: i32) -> Option<EventKind> {
    match code {
        6 => Some(EventKind::Sos),
        7 => Some(EventKind::Fall),
        8 => Some(EventKind::HrHigh),
        9 => Some(EventKind::HrLow),
        10 => Some(EventKind::Spo2Low),
        _ => None,
    }
}

/// GPS position frame
#[derive(Debug, Clone, Deserialize)]
pub struct LocationFrame {
    #[serde(rename = "extAddress")]
    pub ext_address: ExtAddress,
    /// `lat,lon,alt[,speed[,course[,satellites]]]`
    pub position: String,
    /// ISO-8601 fix time; ingest time is used when absent
    pub timestamp: Option<DateTime<Utc>>,
}

/// Out-of-band weather request from a band
#[derive(Debug, Clone, Deserialize)]
pub struct WeatherRequestFrame {
    #[serde(rename = "extAddress")]
    pub ext_address: ExtAddress,
}

/// Weather conditions pushed back to the fleet as scaled integers
#[derive(Debug, Clone, Serialize)]
pub struct WeatherStatusPush {
    pub bid: String,
    /// Degrees Celsius x10
    pub temperature: i32,
    /// Degrees Celsius x10
    pub feels_like: i32,
    /// Percent x10
    pub humidity: i32,
    pub timestamp: i64,
}

// ========== Stimulator device reports ==========

#[derive(Debug, Clone, Deserialize)]
pub struct StimConnectReport {
    pub bid: String,
    pub stimulator_id: String,
    pub rssi: Option<i32>,
    pub battery_level: Option<i32>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StimDisconnectReport {
    pub bid: String,
    pub stimulator_id: Option<String>,
    pub reason: Option<String>,
    pub last_session_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StimStatusReport {
    pub session_id: String,
    pub bid: Option<String>,
    pub status: Option<String>,
    pub current_level: Option<i32>,
    pub elapsed_time: Option<i64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StimCompleteReport {
    pub session_id: String,
    pub total_duration: Option<i64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StimErrorReport {
    pub session_id: String,
    pub error_code: Option<String>,
    pub error_message: Option<String>,
}

// ========== Outbound stimulator commands ==========

/// Start command carrying the full stimulation program
#[derive(Debug, Clone, Serialize)]
pub struct StartCommand {
    pub bid: String,
    pub session_id: String,
    pub stimulator_id: String,
    pub level: i32,
    pub frequency: i32,
    pub pulse_width: i32,
    pub duration: i32,
    pub target_nerve: String,
    pub timestamp: i64,
}

impl StartCommand {
    pub fn new(
        bid: impl Into<String>,
        session_id: impl Into<String>,
        stimulator_id: impl Into<String>,
        params: &StimParams,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            bid: bid.into(),
            session_id: session_id.into(),
            stimulator_id: stimulator_id.into(),
            level: params.level,
            frequency: params.frequency_hz,
            pulse_width: params.pulse_width_us,
            duration: params.duration_min,
            target_nerve: params.target_nerve.clone(),
            timestamp: now.timestamp_millis(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct StopCommand {
    pub bid: String,
    pub session_id: String,
    pub stimulator_id: String,
    pub timestamp: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChangeLevelCommand {
    pub bid: String,
    pub session_id: String,
    pub stimulator_id: String,
    pub level: i32,
    pub timestamp: i64,
}
