//! Weather lookup client for Vitalink
//!
//! This crate provides a client for the KMA open-data nowcast API, enabling:
//! - Current conditions lookup for a band's reported position
//! - Extreme-temperature warnings (heat wave, cold wave)
//!
//! # Example
//!
//! ```rust,no_run
//! use vitalink_weather_client::WeatherClient;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = WeatherClient::new("your_service_key")?;
//!
//! let conditions = client.current_conditions(37.5665, 126.9780).await?;
//! println!(
//!     "{:.1} C (feels like {:.1}), {:.0}% humidity",
//!     conditions.temperature_c,
//!     conditions.feels_like_c(),
//!     conditions.humidity_pct
//! );
//!
//! if let Some(warning) = conditions.warning() {
//!     println!("{:?} {:?}", warning.kind, warning.level);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! # Environment Variables
//!
//! - `WEATHER_SERVICE_KEY`: service key for the weather API (required)

mod client;
mod error;
mod models;

pub use client::WeatherClient;
pub use error::{WeatherError, WeatherResult};
pub use models::{CurrentConditions, WarningKind, WarningLevel, WeatherWarning};
