//! MQTT transport: topic layout, wire payloads, dedup and routing

pub mod client;
pub mod dedup;
pub mod payloads;
pub mod router;
pub mod topics;

pub use client::{connect, run_event_loop, MqttPublisher};
pub use dedup::DedupCache;
pub use router::Router;
pub use topics::{Route, TopicMap};
