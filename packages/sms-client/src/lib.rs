//! Guardian alert SMS dispatch for Vitalink
//!
//! This crate sends templated alert messages through the SMS gateway:
//! - Emergency alerts (fall, SOS)
//! - Vital-sign anomalies (heart rate, SpO2)
//! - Device notices (battery, connectivity, stimulation sessions)
//!
//! # Example
//!
//! ```rust,no_run
//! use vitalink_sms_client::{AlertTemplate, SmsClient, TemplateVars};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = SmsClient::new("api_key", "0212345678")?;
//!
//! client
//!     .send_alert(
//!         "010-1234-5678",
//!         AlertTemplate::HrHigh,
//!         &TemplateVars::named("홍길동").with_value(135),
//!     )
//!     .await?;
//! # Ok(())
//! # }
//! ```
//!
//! # Environment Variables
//!
//! - `SMS_API_KEY`: gateway API key (required)
//! - `SMS_SENDER_NUMBER`: registered sender number (required)
//! - `SMS_GATEWAY_URL`: gateway endpoint override (optional)

mod client;
mod error;
mod phone;
mod templates;

pub use client::SmsClient;
pub use error::{SmsError, SmsResult};
pub use phone::{display_phone_number, normalize_phone_number};
pub use templates::{truncate_message, AlertTemplate, TemplateVars, MAX_LMS_LENGTH, MAX_SMS_LENGTH};
