//! Core services: band tracking, session engine, alerts, commands

pub mod alerts;
pub mod commands;
pub mod engine;
pub mod locks;
pub mod tracker;

pub use alerts::AlertService;
pub use commands::CommandSink;
pub use engine::SessionEngine;
pub use locks::KeyedLocks;
pub use tracker::{LocationOutcome, SampleOutcome, Tracker, TrackerSettings};
