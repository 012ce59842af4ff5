//! Telemetry samples and location fixes

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use thiserror::Error;

/// Mean Earth radius in kilometers
const EARTH_RADIUS_KM: f64 = 6371.0;

/// One telemetry frame from a band, append-only
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct TelemetrySample {
    pub band_id: i64,
    pub recorded_at: DateTime<Utc>,
    pub heart_rate: Option<i32>,
    pub spo2: Option<i32>,
    pub motion: Option<i32>,
    /// Skin contact detector state; 0 means the band is off the wrist
    pub scd_state: Option<i32>,
    pub activity: Option<i32>,
    pub battery: Option<i32>,
    pub rssi: Option<i32>,
    pub skin_temp: Option<f64>,
    /// Raw device step counters, pre-reconciliation
    pub raw_walk_steps: i64,
    pub raw_run_steps: i64,
    pub accel_x: Option<f64>,
    pub accel_y: Option<f64>,
    pub accel_z: Option<f64>,
}

impl TelemetrySample {
    /// The band reports skin contact lost
    pub fn skin_contact_lost(&self) -> bool {
        self.scd_state == Some(0)
    }
}

/// Errors from parsing the band's location string
#[derive(Debug, Error)]
pub enum LocationParseError {
    #[error("expected 3 to 6 comma-separated fields, got {0}")]
    FieldCount(usize),
    #[error("field {index} is not a number: '{value}'")]
    NotANumber { index: usize, value: String },
    #[error("latitude out of range: {0}")]
    LatitudeRange(f64),
    #[error("longitude out of range: {0}")]
    LongitudeRange(f64),
}

/// A GPS fix reported by a band
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocationFix {
    pub latitude: f64,
    pub longitude: f64,
    pub altitude: f64,
    pub speed: Option<f64>,
    pub course: Option<f64>,
    pub satellites: Option<i32>,
    pub recorded_at: DateTime<Utc>,
}

impl LocationFix {
    /// Parse the band's comma-separated location string:
    /// `lat,lon,alt[,speed[,course[,satellites]]]`
    pub fn parse(raw: &str, recorded_at: DateTime<Utc>) -> Result<Self, LocationParseError> {
        let fields: Vec<&str> = raw.split(',').map(str::trim).collect();
        if !(3..=6).contains(&fields.len()) {
            return Err(LocationParseError::FieldCount(fields.len()));
        }

        let number = |index: usize| -> Result<f64, LocationParseError> {
            fields[index]
                .parse()
                .map_err(|_| LocationParseError::NotANumber {
                    index,
                    value: fields[index].to_string(),
                })
        };

        let latitude = number(0)?;
        if !(-90.0..=90.0).contains(&latitude) {
            return Err(LocationParseError::LatitudeRange(latitude));
        }
        let longitude = number(1)?;
        if !(-180.0..=180.0).contains(&longitude) {
            return Err(LocationParseError::LongitudeRange(longitude));
        }
        let altitude = number(2)?;

        let speed = if fields.len() > 3 {
            Some(number(3)?)
        } else {
            None
        };
        let course = if fields.len() > 4 {
            Some(number(4)?)
        } else {
            None
        };
        let satellites = if fields.len() > 5 {
            Some(number(5)? as i32)
        } else {
            None
        };

        Ok(Self {
            latitude,
            longitude,
            altitude,
            speed,
            course,
            satellites,
            recorded_at,
        })
    }
}

/// Great-circle distance between two coordinate pairs in kilometers
pub fn haversine_km(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let phi1 = lat1.to_radians();
    let phi2 = lat2.to_radians();
    let d_phi = (lat2 - lat1).to_radians();
    let d_lambda = (lon2 - lon1).to_radians();

    let a = (d_phi / 2.0).sin().powi(2) + phi1.cos() * phi2.cos() * (d_lambda / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_KM * a.sqrt().asin()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_minimal_fix() {
        let fix = LocationFix::parse("37.5665,126.9780,38.0", Utc::now()).unwrap();
        assert!((fix.latitude - 37.5665).abs() < f64::EPSILON);
        assert!((fix.longitude - 126.9780).abs() < f64::EPSILON);
        assert!(fix.speed.is_none());
        assert!(fix.satellites.is_none());
    }

    #[test]
    fn test_parse_full_fix() {
        let fix = LocationFix::parse("37.5665, 126.9780, 38.0, 1.2, 270.0, 8", Utc::now()).unwrap();
        assert_eq!(fix.speed, Some(1.2));
        assert_eq!(fix.course, Some(270.0));
        assert_eq!(fix.satellites, Some(8));
    }

    #[test]
    fn test_parse_rejects_field_counts() {
        assert!(matches!(
            LocationFix::parse("37.5,126.9", Utc::now()),
            Err(LocationParseError::FieldCount(2))
        ));
        assert!(matches!(
            LocationFix::parse("1,2,3,4,5,6,7", Utc::now()),
            Err(LocationParseError::FieldCount(7))
        ));
    }

    #[test]
    fn test_parse_rejects_garbage_field() {
        assert!(matches!(
            LocationFix::parse("37.5,abc,38.0", Utc::now()),
            Err(LocationParseError::NotANumber { index: 1, .. })
        ));
    }

    #[test]
    fn test_parse_rejects_out_of_range() {
        assert!(matches!(
            LocationFix::parse("91.0,126.9,0", Utc::now()),
            Err(LocationParseError::LatitudeRange(_))
        ));
        assert!(matches!(
            LocationFix::parse("37.5,181.0,0", Utc::now()),
            Err(LocationParseError::LongitudeRange(_))
        ));
    }

    #[test]
    fn test_haversine_known_distance() {
        // Seoul to Busan is roughly 325 km
        let d = haversine_km(37.5665, 126.9780, 35.1796, 129.0756);
        assert!((d - 325.0).abs() < 10.0, "got {}", d);
    }

    #[test]
    fn test_haversine_zero_distance() {
        let d = haversine_km(37.5665, 126.9780, 37.5665, 126.9780);
        assert!(d.abs() < 1e-9);
    }

    #[test]
    fn test_skin_contact_lost() {
        let mut sample = TelemetrySample {
            band_id: 1,
            recorded_at: Utc::now(),
            heart_rate: Some(72),
            spo2: Some(98),
            motion: None,
            scd_state: Some(0),
            activity: None,
            battery: Some(80),
            rssi: None,
            skin_temp: None,
            raw_walk_steps: 0,
            raw_run_steps: 0,
            accel_x: None,
            accel_y: None,
            accel_z: None,
        };
        assert!(sample.skin_contact_lost());
        sample.scd_state = Some(1);
        assert!(!sample.skin_contact_lost());
        sample.scd_state = None;
        assert!(!sample.skin_contact_lost());
    }
}
