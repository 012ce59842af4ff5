//! Timer-driven recovery: disconnect detection and session timeouts
//!
//! Both sweeps compare persisted timestamps against the current wall
//! clock, so a process restart recovers pending deadlines from the
//! store alone. A failure on one band or session is logged and the
//! sweep moves on.

use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info};

use crate::error::CoreResult;
use crate::services::{AlertService, SessionEngine, Tracker};
use crate::store::Store;

#[derive(Clone)]
pub struct Sweeper {
    store: Store,
    tracker: Tracker,
    engine: SessionEngine,
    alerts: AlertService,
    /// A band silent for this long is considered offline
    offline_threshold_secs: i64,
}

impl Sweeper {
    pub fn new(
        store: Store,
        tracker: Tracker,
        engine: SessionEngine,
        alerts: AlertService,
        offline_threshold_secs: i64,
    ) -> Self {
        Self {
            store,
            tracker,
            engine,
            alerts,
            offline_threshold_secs,
        }
    }

    /// Flip every band silent past the threshold to offline.
    /// Returns how many bands were flipped.
    pub async fn sweep_offline(&self, now: DateTime<Utc>) -> CoreResult<usize> {
        let cutoff = now - Duration::seconds(self.offline_threshold_secs);
        let stale = self.store.stale_online_bands(cutoff).await?;
        if stale.is_empty() {
            return Ok(0);
        }

        let mut flipped = 0;
        for band in stale {
            match self.tracker.mark_offline(&band.bid, now).await {
                Ok(Some(event)) => {
                    flipped += 1;
                    if let Ok(Some(band)) = self.store.get_band(event.band_id).await {
                        self.alerts.dispatch(&band, &[event]).await;
                    }
                }
                Ok(None) => {}
                Err(e) => e.log(),
            }
        }
        if flipped > 0 {
            info!(count = flipped, "disconnect sweep flipped bands offline");
        }
        Ok(flipped)
    }

    /// Time out overdue running sessions.
    /// Returns how many sessions were terminated.
    pub async fn sweep_sessions(&self, now: DateTime<Utc>) -> CoreResult<usize> {
        let records = self.engine.sweep_timeouts(now).await?;
        if !records.is_empty() {
            info!(count = records.len(), "session sweep timed out sessions");
        }
        Ok(records.len())
    }
}

/// Run the disconnect sweep forever
pub async fn run_offline_loop(sweeper: Sweeper, interval_secs: u64) {
    let mut ticker = tokio::time::interval(StdDuration::from_secs(interval_secs));
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    loop {
        ticker.tick().await;
        debug!("running disconnect sweep");
        if let Err(e) = sweeper.sweep_offline(Utc::now()).await {
            e.log();
        }
    }
}

/// Run the session-timeout sweep forever
pub async fn run_session_loop(sweeper: Sweeper, interval_secs: u64) {
    let mut ticker = tokio::time::interval(StdDuration::from_secs(interval_secs));
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    loop {
        ticker.tick().await;
        debug!("running session-timeout sweep");
        if let Err(e) = sweeper.sweep_sessions(Utc::now()).await {
            e.log();
        }
    }
}
