//! In-memory storage backend
//!
//! Mirrors the Postgres backend's semantics over plain maps. Used by the test
//! suite and by single-node development without a database.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use crate::error::{CoreError, CoreResult};
use crate::models::{
    Band, Event, EventKind, NewEvent, SessionRecord, SessionStatus, StimSession, TelemetrySample,
};

#[derive(Default)]
struct Inner {
    bands: HashMap<i64, Band>,
    bid_index: HashMap<String, i64>,
    samples: Vec<TelemetrySample>,
    sessions: HashMap<String, StimSession>,
    records: HashMap<String, SessionRecord>,
    events: Vec<Event>,
    next_band_id: i64,
    next_event_id: i64,
    failing_sessions: HashSet<String>,
}

/// In-memory store
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<RwLock<Inner>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get_or_provision_band(&self, bid: &str, now: DateTime<Utc>) -> CoreResult<Band> {
        let mut inner = self.inner.write().await;
        if let Some(id) = inner.bid_index.get(bid).copied() {
            if let Some(band) = inner.bands.get(&id) {
                return Ok(band.clone());
            }
        }
        inner.next_band_id += 1;
        let id = inner.next_band_id;
        let band = Band::provisioned(id, bid, now);
        inner.bid_index.insert(bid.to_string(), id);
        inner.bands.insert(id, band.clone());
        Ok(band)
    }

    pub async fn get_band(&self, band_id: i64) -> CoreResult<Option<Band>> {
        Ok(self.inner.read().await.bands.get(&band_id).cloned())
    }

    pub async fn get_band_by_bid(&self, bid: &str) -> CoreResult<Option<Band>> {
        let inner = self.inner.read().await;
        Ok(inner
            .bid_index
            .get(bid)
            .and_then(|id| inner.bands.get(id))
            .cloned())
    }

    pub async fn update_band(&self, band: &Band) -> CoreResult<()> {
        let mut inner = self.inner.write().await;
        inner.bands.insert(band.id, band.clone());
        Ok(())
    }

    pub async fn stale_online_bands(&self, cutoff: DateTime<Utc>) -> CoreResult<Vec<Band>> {
        let inner = self.inner.read().await;
        Ok(inner
            .bands
            .values()
            .filter(|b| b.is_online() && b.last_data_at.map(|t| t < cutoff).unwrap_or(true))
            .cloned()
            .collect())
    }

    pub async fn insert_sample(&self, sample: &TelemetrySample) -> CoreResult<()> {
        self.inner.write().await.samples.push(sample.clone());
        Ok(())
    }

    pub async fn insert_session(&self, session: &StimSession) -> CoreResult<()> {
        let mut inner = self.inner.write().await;
        inner
            .sessions
            .insert(session.session_id.clone(), session.clone());
        Ok(())
    }

    pub async fn get_session(&self, session_id: &str) -> CoreResult<Option<StimSession>> {
        let inner = self.inner.read().await;
        if inner.failing_sessions.contains(session_id) {
            return Err(CoreError::Internal(format!(
                "injected read failure for {}",
                session_id
            )));
        }
        Ok(inner.sessions.get(session_id).cloned())
    }

    pub async fn update_session(&self, session: &StimSession) -> CoreResult<()> {
        self.insert_session(session).await
    }

    pub async fn active_session_for_band(&self, band_id: i64) -> CoreResult<Option<StimSession>> {
        let inner = self.inner.read().await;
        Ok(inner
            .sessions
            .values()
            .filter(|s| s.band_id == band_id && s.status.is_active())
            .max_by_key(|s| s.created_at)
            .cloned())
    }

    pub async fn running_sessions(&self) -> CoreResult<Vec<StimSession>> {
        let inner = self.inner.read().await;
        Ok(inner
            .sessions
            .values()
            .filter(|s| s.status == SessionStatus::Running)
            .cloned()
            .collect())
    }

    pub async fn insert_session_record(&self, record: &SessionRecord) -> CoreResult<()> {
        let mut inner = self.inner.write().await;
        inner
            .records
            .insert(record.session_id.clone(), record.clone());
        Ok(())
    }

    pub async fn get_session_record(&self, session_id: &str) -> CoreResult<Option<SessionRecord>> {
        Ok(self.inner.read().await.records.get(session_id).cloned())
    }

    pub async fn insert_event(&self, event: &NewEvent) -> CoreResult<Event> {
        let mut inner = self.inner.write().await;
        inner.next_event_id += 1;
        let stored = Event {
            id: inner.next_event_id,
            band_id: event.band_id,
            kind: event.kind,
            severity: event.severity(),
            value: event.value,
            note: event.note.clone(),
            recorded_at: event.recorded_at,
            read: false,
            resolved: false,
            sms_sent: false,
        };
        inner.events.push(stored.clone());
        Ok(stored)
    }

    pub async fn mark_event_sms_sent(&self, event_id: i64) -> CoreResult<()> {
        let mut inner = self.inner.write().await;
        if let Some(event) = inner.events.iter_mut().find(|e| e.id == event_id) {
            event.sms_sent = true;
        }
        Ok(())
    }

    pub async fn last_event_of_kind(
        &self,
        band_id: i64,
        kind: EventKind,
    ) -> CoreResult<Option<Event>> {
        let inner = self.inner.read().await;
        Ok(inner
            .events
            .iter()
            .filter(|e| e.band_id == band_id && e.kind == kind)
            .max_by_key(|e| e.recorded_at)
            .cloned())
    }

    // ========== Test inspection helpers ==========

    /// Count of persisted samples for a band
    pub async fn sample_count(&self, band_id: i64) -> usize {
        self.inner
            .read()
            .await
            .samples
            .iter()
            .filter(|s| s.band_id == band_id)
            .count()
    }

    /// All persisted events for a band, in insertion order
    pub async fn events_for_band(&self, band_id: i64) -> Vec<Event> {
        self.inner
            .read()
            .await
            .events
            .iter()
            .filter(|e| e.band_id == band_id)
            .cloned()
            .collect()
    }

    /// Count of session history records
    pub async fn record_count(&self) -> usize {
        self.inner.read().await.records.len()
    }

    /// Make every subsequent read of one session fail, for exercising
    /// per-key error isolation
    pub async fn fail_session_reads(&self, session_id: &str) {
        self.inner
            .write()
            .await
            .failing_sessions
            .insert(session_id.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_provision_is_idempotent() {
        let store = MemoryStore::new();
        let now = Utc::now();
        let first = store.get_or_provision_band("12345", now).await.unwrap();
        let second = store.get_or_provision_band("12345", now).await.unwrap();
        assert_eq!(first.id, second.id);

        let other = store.get_or_provision_band("67890", now).await.unwrap();
        assert_ne!(other.id, first.id);
    }

    #[tokio::test]
    async fn test_stale_band_query() {
        let store = MemoryStore::new();
        let now = Utc::now();
        let mut band = store.get_or_provision_band("1", now).await.unwrap();
        band.connect_state = crate::models::ConnectState::Online;
        band.last_data_at = Some(now - chrono::Duration::minutes(10));
        store.update_band(&band).await.unwrap();

        let stale = store
            .stale_online_bands(now - chrono::Duration::minutes(5))
            .await
            .unwrap();
        assert_eq!(stale.len(), 1);

        // Fresh data keeps it out of the sweep
        band.last_data_at = Some(now);
        store.update_band(&band).await.unwrap();
        let stale = store
            .stale_online_bands(now - chrono::Duration::minutes(5))
            .await
            .unwrap();
        assert!(stale.is_empty());
    }

    #[tokio::test]
    async fn test_event_ids_increment() {
        let store = MemoryStore::new();
        let now = Utc::now();
        let e1 = store
            .insert_event(&NewEvent::new(1, EventKind::Sos, now))
            .await
            .unwrap();
        let e2 = store
            .insert_event(&NewEvent::new(1, EventKind::Fall, now))
            .await
            .unwrap();
        assert!(e2.id > e1.id);
        assert_eq!(e1.severity, 4);
    }

    #[tokio::test]
    async fn test_last_event_of_kind() {
        let store = MemoryStore::new();
        let now = Utc::now();
        store
            .insert_event(&NewEvent::new(1, EventKind::BatteryLow, now - chrono::Duration::hours(2)))
            .await
            .unwrap();
        let recent = store
            .insert_event(&NewEvent::new(1, EventKind::BatteryLow, now))
            .await
            .unwrap();

        let last = store
            .last_event_of_kind(1, EventKind::BatteryLow)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(last.id, recent.id);

        assert!(store
            .last_event_of_kind(1, EventKind::Sos)
            .await
            .unwrap()
            .is_none());
    }
}
