//! Weather API response models

use serde::{Deserialize, Serialize};

/// Heat-wave advisory threshold (degrees C)
const HEAT_ADVISORY_C: f64 = 33.0;

/// Heat-wave warning threshold (degrees C)
const HEAT_WARNING_C: f64 = 35.0;

/// Cold-wave advisory threshold (degrees C)
const COLD_ADVISORY_C: f64 = -12.0;

/// Cold-wave warning threshold (degrees C)
const COLD_WARNING_C: f64 = -15.0;

/// Current weather conditions at a grid point
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CurrentConditions {
    /// Air temperature (degrees C)
    pub temperature_c: f64,
    /// Relative humidity (%)
    pub humidity_pct: f64,
    /// Wind speed (m/s), when reported
    pub wind_speed_ms: Option<f64>,
    /// One-hour rainfall (mm), when reported
    pub rainfall_mm: Option<f64>,
}

impl CurrentConditions {
    /// Apparent temperature in degrees C.
    ///
    /// Uses the standard wind-chill formula when it applies (temperature at or
    /// below 10 C with wind at or above 1.34 m/s); otherwise the air
    /// temperature is returned unchanged.
    pub fn feels_like_c(&self) -> f64 {
        let t = self.temperature_c;
        match self.wind_speed_ms {
            Some(w) if t <= 10.0 && w >= 1.34 => {
                let v = (w * 3.6).powf(0.16);
                13.12 + 0.6215 * t - 11.37 * v + 0.3965 * t * v
            }
            _ => t,
        }
    }

    /// Temperature as a x10 scaled integer for fixed-point wire payloads
    pub fn temperature_scaled(&self) -> i32 {
        scale_tenths(self.temperature_c)
    }

    /// Apparent temperature as a x10 scaled integer
    pub fn feels_like_scaled(&self) -> i32 {
        scale_tenths(self.feels_like_c())
    }

    /// Humidity as a x10 scaled integer
    pub fn humidity_scaled(&self) -> i32 {
        scale_tenths(self.humidity_pct)
    }

    /// Extreme-temperature warning derived from the current temperature
    pub fn warning(&self) -> Option<WeatherWarning> {
        let t = self.temperature_c;
        if t >= HEAT_ADVISORY_C {
            let level = if t >= HEAT_WARNING_C {
                WarningLevel::Warning
            } else {
                WarningLevel::Advisory
            };
            return Some(WeatherWarning {
                kind: WarningKind::HeatWave,
                level,
                value: t,
            });
        }
        if t <= COLD_ADVISORY_C {
            let level = if t <= COLD_WARNING_C {
                WarningLevel::Warning
            } else {
                WarningLevel::Advisory
            };
            return Some(WeatherWarning {
                kind: WarningKind::ColdWave,
                level,
                value: t,
            });
        }
        None
    }
}

fn scale_tenths(value: f64) -> i32 {
    (value * 10.0).round() as i32
}

/// Extreme-weather warning
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeatherWarning {
    pub kind: WarningKind,
    pub level: WarningLevel,
    /// Observed temperature that triggered the warning (degrees C)
    pub value: f64,
}

/// Kind of extreme-weather condition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarningKind {
    HeatWave,
    ColdWave,
}

/// Severity of an extreme-weather condition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarningLevel {
    Advisory,
    Warning,
}

// Internal response types for deserialization

#[derive(Debug, Deserialize)]
pub(crate) struct NowcastEnvelope {
    pub response: NowcastResponse,
}

#[derive(Debug, Deserialize)]
pub(crate) struct NowcastResponse {
    pub header: NowcastHeader,
    #[serde(default)]
    pub body: Option<NowcastBody>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct NowcastHeader {
    #[serde(rename = "resultCode")]
    pub result_code: String,
    #[serde(rename = "resultMsg")]
    pub result_msg: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct NowcastBody {
    pub items: NowcastItems,
}

#[derive(Debug, Deserialize)]
pub(crate) struct NowcastItems {
    #[serde(default)]
    pub item: Vec<NowcastItem>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct NowcastItem {
    pub category: String,
    #[serde(rename = "obsrValue")]
    pub obsr_value: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn conditions(temp: f64, wind: Option<f64>) -> CurrentConditions {
        CurrentConditions {
            temperature_c: temp,
            humidity_pct: 60.0,
            wind_speed_ms: wind,
            rainfall_mm: None,
        }
    }

    #[test]
    fn test_feels_like_equals_temperature_when_warm() {
        let c = conditions(21.3, Some(5.0));
        assert!((c.feels_like_c() - 21.3).abs() < f64::EPSILON);
    }

    #[test]
    fn test_feels_like_below_temperature_in_cold_wind() {
        let c = conditions(-5.0, Some(8.0));
        assert!(c.feels_like_c() < -5.0);
    }

    #[test]
    fn test_feels_like_without_wind_reading() {
        let c = conditions(-5.0, None);
        assert!((c.feels_like_c() - (-5.0)).abs() < f64::EPSILON);
    }

    #[test]
    fn test_scaled_values_round_to_tenths() {
        let c = conditions(21.34, None);
        assert_eq!(c.temperature_scaled(), 213);
        assert_eq!(c.humidity_scaled(), 600);
    }

    #[test]
    fn test_heat_wave_advisory_and_warning() {
        let advisory = conditions(33.5, None).warning().unwrap();
        assert_eq!(advisory.kind, WarningKind::HeatWave);
        assert_eq!(advisory.level, WarningLevel::Advisory);

        let warning = conditions(36.0, None).warning().unwrap();
        assert_eq!(warning.level, WarningLevel::Warning);
    }

    #[test]
    fn test_cold_wave_advisory_and_warning() {
        let advisory = conditions(-13.0, None).warning().unwrap();
        assert_eq!(advisory.kind, WarningKind::ColdWave);
        assert_eq!(advisory.level, WarningLevel::Advisory);

        let warning = conditions(-16.0, None).warning().unwrap();
        assert_eq!(warning.level, WarningLevel::Warning);
    }

    #[test]
    fn test_no_warning_in_normal_range() {
        assert!(conditions(20.0, None).warning().is_none());
        assert!(conditions(-5.0, None).warning().is_none());
    }
}
