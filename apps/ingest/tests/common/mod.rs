//! Shared fixtures for ingest integration tests
//!
//! Everything runs against the in-memory store, the in-process fanout
//! and a recording command sink, so tests exercise the real router,
//! tracker and engine with no broker or database.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use vitalink_ingest::config::SessionConflictPolicy;
use vitalink_ingest::fanout::Fanout;
use vitalink_ingest::models::StimParams;
use vitalink_ingest::mqtt::{DedupCache, Router, TopicMap};
use vitalink_ingest::services::{
    AlertService, CommandSink, KeyedLocks, SessionEngine, Tracker, TrackerSettings,
};
use vitalink_ingest::store::{MemoryStore, Store};
use vitalink_ingest::sweeps::Sweeper;

pub const TOPIC_ROOT: &str = "/DT/eHG4";

pub struct Harness {
    pub mem: MemoryStore,
    pub store: Store,
    pub fanout: Fanout,
    pub commands: CommandSink,
    pub tracker: Tracker,
    pub engine: SessionEngine,
    pub router: Router,
    pub sweeper: Sweeper,
}

pub fn harness() -> Harness {
    harness_with_policy(SessionConflictPolicy::Cleanup)
}

pub fn harness_with_policy(policy: SessionConflictPolicy) -> Harness {
    let mem = MemoryStore::new();
    let store = Store::Memory(mem.clone());
    let fanout = Fanout::new_in_memory();
    let topics = TopicMap::new(TOPIC_ROOT);
    let commands = CommandSink::memory(topics.clone());
    let band_locks = Arc::new(KeyedLocks::new());

    let tracker = Tracker::new(
        store.clone(),
        fanout.clone(),
        band_locks.clone(),
        TrackerSettings::default(),
    );
    let engine = SessionEngine::new(
        store.clone(),
        fanout.clone(),
        commands.clone(),
        band_locks,
        policy,
        300,
    );
    let alerts = AlertService::new(store.clone(), fanout.clone(), None);

    let router = Router::new(
        topics,
        store.clone(),
        tracker.clone(),
        engine.clone(),
        alerts.clone(),
        commands.clone(),
        DedupCache::new(Duration::from_millis(500)),
        None,
    );
    let sweeper = Sweeper::new(store.clone(), tracker.clone(), engine.clone(), alerts, 300);

    Harness {
        mem,
        store,
        fanout,
        commands,
        tracker,
        engine,
        router,
        sweeper,
    }
}

/// A sync frame for band (high=0, low) with the given sensor readings
pub fn sync_payload(low: u32, hr: i32, spo2: i32, walk: i64, scd: i32) -> Vec<u8> {
    serde_json::json!({
        "extAddress": {"low": low, "high": 0},
        "bandData": {
            "hr": hr,
            "spo2": spo2,
            "battery_level": 80,
            "walk_steps": walk,
            "run_steps": 0,
            "scdState": scd
        }
    })
    .to_string()
    .into_bytes()
}

pub fn async_payload(low: u32, type_code: i32, value: i32) -> Vec<u8> {
    serde_json::json!({
        "extAddress": {"low": low, "high": 0},
        "type": type_code,
        "value": value
    })
    .to_string()
    .into_bytes()
}

pub fn location_payload(low: u32, position: &str) -> Vec<u8> {
    serde_json::json!({
        "extAddress": {"low": low, "high": 0},
        "position": position
    })
    .to_string()
    .into_bytes()
}

pub fn topic(suffix: &str) -> String {
    format!("{}{}", TOPIC_ROOT, suffix)
}

pub fn default_params() -> StimParams {
    StimParams {
        level: 5,
        frequency_hz: 20,
        pulse_width_us: 200,
        duration_min: 30,
        target_nerve: "vagus".to_string(),
        mode: "continuous".to_string(),
    }
}
