//! Per-band connection, counter and position state
//!
//! All mutations for one band run under its key lock so reconciliation
//! sees updates in arrival order. Fanout happens after the lock is
//! released and the mutation is durable.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tracing::{info, warn};

use crate::error::CoreResult;
use crate::fanout::{Channel, Fanout, FanoutEvent};
use crate::models::{Band, ConnectState, Event, EventKind, LocationFix, NewEvent, TelemetrySample};
use crate::mqtt::payloads::BandFrame;
use crate::services::locks::KeyedLocks;
use crate::store::Store;

/// Vital and battery thresholds the tracker raises events against
#[derive(Debug, Clone)]
pub struct TrackerSettings {
    pub hr_high_threshold: i32,
    pub hr_low_threshold: i32,
    pub spo2_low_threshold: i32,
    pub battery_low_threshold: i32,
    /// Suppress repeated battery-low events within this window
    pub battery_realert_secs: i64,
    /// Fixes further than this from the last fix are rejected
    pub gps_max_jump_km: f64,
}

impl Default for TrackerSettings {
    fn default() -> Self {
        Self {
            hr_high_threshold: 120,
            hr_low_threshold: 50,
            spo2_low_threshold: 95,
            battery_low_threshold: 20,
            battery_realert_secs: 3600,
            gps_max_jump_km: 700.0,
        }
    }
}

/// Result of applying a telemetry frame
#[derive(Debug)]
pub struct SampleOutcome {
    pub band: Band,
    /// Events raised by this frame, already persisted
    pub events: Vec<Event>,
    pub status_flipped: bool,
}

/// Result of applying a location fix
#[derive(Debug)]
pub enum LocationOutcome {
    Accepted(Band),
    /// Fix discarded as a teleportation artifact
    Rejected { distance_km: f64 },
    /// Fix for a band we have never seen; location frames never provision
    UnknownBand,
}

#[derive(Clone)]
pub struct Tracker {
    store: Store,
    fanout: Fanout,
    band_locks: Arc<KeyedLocks<String>>,
    settings: TrackerSettings,
}

impl Tracker {
    pub fn new(
        store: Store,
        fanout: Fanout,
        band_locks: Arc<KeyedLocks<String>>,
        settings: TrackerSettings,
    ) -> Self {
        Self {
            store,
            fanout,
            band_locks,
            settings,
        }
    }

    /// Apply a full telemetry frame: counters, battery, connection and
    /// vital anomaly events. Auto-provisions unknown bands.
    pub async fn apply_sample(
        &self,
        frame: &BandFrame,
        now: DateTime<Utc>,
    ) -> CoreResult<Option<SampleOutcome>> {
        let bid = frame.ext_address.bid();
        let guard = self.band_locks.acquire(&bid).await;

        let mut band = self.store.get_or_provision_band(&bid, now).await?;
        let Some(sample) = frame.sample(band.id, now) else {
            // Frame carried no sensor block; arrival still counts as contact
            band.last_data_at = Some(now);
            let flipped = self.refresh_connection(&mut band, false, now);
            self.store.update_band(&band).await?;
            drop(guard);
            self.publish_status_if_flipped(&band, flipped, now).await;
            return Ok(None);
        };

        reconcile_steps(&mut band, &sample);
        if sample.battery.is_some() {
            band.battery = sample.battery;
        }
        band.last_data_at = Some(now);
        let status_flipped = self.refresh_connection(&mut band, sample.skin_contact_lost(), now);

        self.store.insert_sample(&sample).await?;

        let mut events = Vec::new();
        for new_event in self.vital_events(&band, &sample, now).await? {
            events.push(self.store.insert_event(&new_event).await?);
        }

        self.store.update_band(&band).await?;
        drop(guard);

        self.fanout
            .publish(
                Channel::band(&band.bid),
                FanoutEvent::Telemetry {
                    bid: band.bid.clone(),
                    heart_rate: sample.heart_rate,
                    spo2: sample.spo2,
                    walk_steps: band.walk_steps,
                    run_steps: band.run_steps,
                    at: now,
                },
            )
            .await;
        self.publish_status_if_flipped(&band, status_flipped, now).await;

        Ok(Some(SampleOutcome {
            band,
            events,
            status_flipped,
        }))
    }

    /// Apply an accepted GPS fix, rejecting implausible jumps.
    /// Only telemetry frames provision bands; a fix for an unknown
    /// band is dropped.
    pub async fn apply_location(
        &self,
        bid: &str,
        fix: &LocationFix,
        now: DateTime<Utc>,
    ) -> CoreResult<LocationOutcome> {
        let guard = self.band_locks.acquire(&bid.to_string()).await;

        let Some(mut band) = self.store.get_band_by_bid(bid).await? else {
            warn!(bid = %bid, "dropping location fix for unknown band");
            return Ok(LocationOutcome::UnknownBand);
        };
        if let (Some(lat), Some(lon)) = (band.latitude, band.longitude) {
            let distance_km =
                crate::models::haversine_km(lat, lon, fix.latitude, fix.longitude);
            if distance_km > self.settings.gps_max_jump_km {
                warn!(
                    bid = %bid,
                    distance_km = distance_km,
                    "rejecting location fix, jump exceeds limit"
                );
                return Ok(LocationOutcome::Rejected { distance_km });
            }
        }

        band.latitude = Some(fix.latitude);
        band.longitude = Some(fix.longitude);
        band.last_data_at = Some(now);
        self.store.update_band(&band).await?;
        drop(guard);

        self.fanout
            .publish(
                Channel::band(&band.bid),
                FanoutEvent::Location {
                    bid: band.bid.clone(),
                    latitude: fix.latitude,
                    longitude: fix.longitude,
                    at: fix.recorded_at,
                },
            )
            .await;

        Ok(LocationOutcome::Accepted(band))
    }

    /// Flip one stale band offline; used by the disconnect sweep
    pub async fn mark_offline(&self, bid: &str, now: DateTime<Utc>) -> CoreResult<Option<Event>> {
        let guard = self.band_locks.acquire(&bid.to_string()).await;

        let Some(mut band) = self.store.get_band_by_bid(bid).await? else {
            return Ok(None);
        };
        if !band.is_online() {
            // Raced with a skin-contact offline; nothing to do
            return Ok(None);
        }

        band.connect_state = ConnectState::Offline;
        band.disconnect_time = Some(now);
        self.store.update_band(&band).await?;

        let event = self
            .store
            .insert_event(&NewEvent::new(band.id, EventKind::DeviceOffline, now))
            .await?;
        drop(guard);

        info!(bid = %bid, "band marked offline by sweep");
        self.publish_status_if_flipped(&band, true, now).await;

        Ok(Some(event))
    }

    /// Record the stimulator pairing reported on its Connect topic
    pub async fn attach_stimulator(
        &self,
        bid: &str,
        stimulator_id: &str,
        now: DateTime<Utc>,
    ) -> CoreResult<Band> {
        let _guard = self.band_locks.acquire(&bid.to_string()).await;

        let mut band = self.store.get_or_provision_band(bid, now).await?;
        band.stimulator_id = Some(stimulator_id.to_string());
        band.stimulator_connected = true;
        self.store.update_band(&band).await?;
        Ok(band)
    }

    /// Clear the stimulator pairing; the session side is the engine's job
    pub async fn detach_stimulator(&self, bid: &str) -> CoreResult<Option<Band>> {
        let _guard = self.band_locks.acquire(&bid.to_string()).await;

        let Some(mut band) = self.store.get_band_by_bid(bid).await? else {
            return Ok(None);
        };
        band.stimulator_connected = false;
        self.store.update_band(&band).await?;
        Ok(Some(band))
    }

    /// Connection transitions from one accepted message. A lost skin
    /// contact flag forces offline immediately; otherwise any accepted
    /// message means online. Returns whether the state flipped.
    fn refresh_connection(
        &self,
        band: &mut Band,
        skin_contact_lost: bool,
        now: DateTime<Utc>,
    ) -> bool {
        let target = if skin_contact_lost {
            ConnectState::Offline
        } else {
            ConnectState::Online
        };
        if band.connect_state == target {
            return false;
        }
        band.connect_state = target;
        match target {
            ConnectState::Online => band.connect_time = Some(now),
            ConnectState::Offline => {
                band.disconnect_time = Some(now);
                info!(bid = %band.bid, "skin contact lost, band forced offline");
            }
        }
        true
    }

    async fn publish_status_if_flipped(&self, band: &Band, flipped: bool, now: DateTime<Utc>) {
        if !flipped {
            return;
        }
        let event = FanoutEvent::BandStatus {
            bid: band.bid.clone(),
            connect_state: band.connect_state,
            battery: band.battery,
            at: now,
        };
        self.fanout
            .publish(Channel::band(&band.bid), event.clone())
            .await;
        self.fanout.publish(Channel::Dashboard, event).await;
    }

    /// Threshold checks against one sample. Battery-low re-alerts are
    /// suppressed inside the configured window.
    async fn vital_events(
        &self,
        band: &Band,
        sample: &TelemetrySample,
        now: DateTime<Utc>,
    ) -> CoreResult<Vec<NewEvent>> {
        let mut events = Vec::new();

        if let Some(hr) = sample.heart_rate {
            if hr > self.settings.hr_high_threshold {
                events.push(NewEvent::new(band.id, EventKind::HrHigh, now).with_value(hr as f64));
            } else if hr < self.settings.hr_low_threshold {
                events.push(NewEvent::new(band.id, EventKind::HrLow, now).with_value(hr as f64));
            }
        }
        if let Some(spo2) = sample.spo2 {
            if spo2 < self.settings.spo2_low_threshold {
                events
                    .push(NewEvent::new(band.id, EventKind::Spo2Low, now).with_value(spo2 as f64));
            }
        }
        if let Some(battery) = sample.battery {
            if battery <= self.settings.battery_low_threshold
                && self.battery_alert_due(band.id, now).await?
            {
                events.push(
                    NewEvent::new(band.id, EventKind::BatteryLow, now).with_value(battery as f64),
                );
            }
        }

        Ok(events)
    }

    async fn battery_alert_due(&self, band_id: i64, now: DateTime<Utc>) -> CoreResult<bool> {
        let last = self
            .store
            .last_event_of_kind(band_id, EventKind::BatteryLow)
            .await?;
        Ok(match last {
            Some(event) => {
                now - event.recorded_at >= Duration::seconds(self.settings.battery_realert_secs)
            }
            None => true,
        })
    }
}

/// Fold raw device counters into the cumulative totals.
///
/// The hardware counter is cumulative but resets on reboot: an equal
/// reading is a retransmission (no-op), a higher reading contributes
/// its delta, and a lower reading means the counter restarted, so the
/// raw value itself is the progress since reset.
fn reconcile_steps(band: &mut Band, sample: &TelemetrySample) {
    band.walk_steps += step_delta(band.raw_walk_steps, sample.raw_walk_steps);
    band.run_steps += step_delta(band.raw_run_steps, sample.raw_run_steps);
    band.raw_walk_steps = sample.raw_walk_steps;
    band.raw_run_steps = sample.raw_run_steps;
}

fn step_delta(previous: i64, raw: i64) -> i64 {
    if raw > previous {
        raw - previous
    } else if raw < previous && raw > 0 {
        raw
    } else {
        0
    }
}
