//! Persistence facade
//!
//! `Store` dispatches to Postgres in production or the in-memory backend for
//! tests and single-node development, so every service above it stays agnostic
//! of the storage engine.

mod memory;
mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::error::CoreResult;
use crate::models::{
    Band, Event, EventKind, NewEvent, SessionRecord, StimSession, TelemetrySample,
};

/// Storage backend with enum dispatch
#[derive(Clone)]
pub enum Store {
    Postgres(PgStore),
    Memory(MemoryStore),
}

impl Store {
    /// Create a Postgres-backed store
    pub fn postgres(pool: PgPool) -> Self {
        Self::Postgres(PgStore::new(pool))
    }

    /// Create an in-memory store
    pub fn memory() -> Self {
        Self::Memory(MemoryStore::new())
    }

    // ========== Bands ==========

    /// Fetch the band with this bid, provisioning it on first contact
    pub async fn get_or_provision_band(&self, bid: &str, now: DateTime<Utc>) -> CoreResult<Band> {
        match self {
            Self::Postgres(s) => s.get_or_provision_band(bid, now).await,
            Self::Memory(s) => s.get_or_provision_band(bid, now).await,
        }
    }

    pub async fn get_band(&self, band_id: i64) -> CoreResult<Option<Band>> {
        match self {
            Self::Postgres(s) => s.get_band(band_id).await,
            Self::Memory(s) => s.get_band(band_id).await,
        }
    }

    pub async fn get_band_by_bid(&self, bid: &str) -> CoreResult<Option<Band>> {
        match self {
            Self::Postgres(s) => s.get_band_by_bid(bid).await,
            Self::Memory(s) => s.get_band_by_bid(bid).await,
        }
    }

    /// Persist the whole band row
    pub async fn update_band(&self, band: &Band) -> CoreResult<()> {
        match self {
            Self::Postgres(s) => s.update_band(band).await,
            Self::Memory(s) => s.update_band(band).await,
        }
    }

    /// Online bands whose last accepted data predates the cutoff
    pub async fn stale_online_bands(&self, cutoff: DateTime<Utc>) -> CoreResult<Vec<Band>> {
        match self {
            Self::Postgres(s) => s.stale_online_bands(cutoff).await,
            Self::Memory(s) => s.stale_online_bands(cutoff).await,
        }
    }

    // ========== Telemetry ==========

    pub async fn insert_sample(&self, sample: &TelemetrySample) -> CoreResult<()> {
        match self {
            Self::Postgres(s) => s.insert_sample(sample).await,
            Self::Memory(s) => s.insert_sample(sample).await,
        }
    }

    // ========== Sessions ==========

    pub async fn insert_session(&self, session: &StimSession) -> CoreResult<()> {
        match self {
            Self::Postgres(s) => s.insert_session(session).await,
            Self::Memory(s) => s.insert_session(session).await,
        }
    }

    pub async fn get_session(&self, session_id: &str) -> CoreResult<Option<StimSession>> {
        match self {
            Self::Postgres(s) => s.get_session(session_id).await,
            Self::Memory(s) => s.get_session(session_id).await,
        }
    }

    pub async fn update_session(&self, session: &StimSession) -> CoreResult<()> {
        match self {
            Self::Postgres(s) => s.update_session(session).await,
            Self::Memory(s) => s.update_session(session).await,
        }
    }

    /// The band's Pending or Running session, if any
    pub async fn active_session_for_band(&self, band_id: i64) -> CoreResult<Option<StimSession>> {
        match self {
            Self::Postgres(s) => s.active_session_for_band(band_id).await,
            Self::Memory(s) => s.active_session_for_band(band_id).await,
        }
    }

    pub async fn running_sessions(&self) -> CoreResult<Vec<StimSession>> {
        match self {
            Self::Postgres(s) => s.running_sessions().await,
            Self::Memory(s) => s.running_sessions().await,
        }
    }

    pub async fn insert_session_record(&self, record: &SessionRecord) -> CoreResult<()> {
        match self {
            Self::Postgres(s) => s.insert_session_record(record).await,
            Self::Memory(s) => s.insert_session_record(record).await,
        }
    }

    pub async fn get_session_record(&self, session_id: &str) -> CoreResult<Option<SessionRecord>> {
        match self {
            Self::Postgres(s) => s.get_session_record(session_id).await,
            Self::Memory(s) => s.get_session_record(session_id).await,
        }
    }

    // ========== Events ==========

    pub async fn insert_event(&self, event: &NewEvent) -> CoreResult<Event> {
        match self {
            Self::Postgres(s) => s.insert_event(event).await,
            Self::Memory(s) => s.insert_event(event).await,
        }
    }

    pub async fn mark_event_sms_sent(&self, event_id: i64) -> CoreResult<()> {
        match self {
            Self::Postgres(s) => s.mark_event_sms_sent(event_id).await,
            Self::Memory(s) => s.mark_event_sms_sent(event_id).await,
        }
    }

    /// Most recent event of this kind for the band, for re-alert suppression
    pub async fn last_event_of_kind(
        &self,
        band_id: i64,
        kind: EventKind,
    ) -> CoreResult<Option<Event>> {
        match self {
            Self::Postgres(s) => s.last_event_of_kind(band_id, kind).await,
            Self::Memory(s) => s.last_event_of_kind(band_id, kind).await,
        }
    }
}
