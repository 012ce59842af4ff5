//! Vitalink ingest core
//!
//! Telemetry ingestion and nerve-stimulation session engine for the
//! band fleet: MQTT routing, per-band state tracking, the session
//! state machine, timer-driven sweeps and real-time fanout.

pub mod config;
pub mod error;
pub mod fanout;
pub mod models;
pub mod mqtt;
pub mod services;
pub mod store;
pub mod sweeps;

pub use config::{Config, SessionConflictPolicy};
pub use error::{CoreError, CoreResult, ErrorSeverity};
