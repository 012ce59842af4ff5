//! Nerve-stimulation session state machine
//!
//! `PENDING --start--> RUNNING --stop|complete|error|timeout|disconnect-->
//! {COMPLETED|STOPPED}`. Terminal states never transition out; every
//! termination writes exactly one immutable history record. Outbound
//! device commands are emitted after the state change is durable and
//! never roll it back.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{info, warn};

use crate::config::SessionConflictPolicy;
use crate::error::{CoreError, CoreResult};
use crate::fanout::{Channel, Fanout, FanoutEvent};
use crate::models::{
    generate_session_id, BloodPressure, EndReason, Event, NewEvent, SessionRecord, SessionStatus,
    StimParams, StimSession, MAX_STIM_LEVEL, MIN_STIM_LEVEL,
};
use crate::mqtt::payloads::{
    ChangeLevelCommand, StartCommand, StimCompleteReport, StimDisconnectReport, StimErrorReport,
    StimStatusReport, StopCommand,
};
use crate::models::EventKind;
use crate::services::commands::CommandSink;
use crate::services::locks::KeyedLocks;
use crate::store::Store;

#[derive(Clone)]
pub struct SessionEngine {
    store: Store,
    fanout: Fanout,
    commands: CommandSink,
    band_locks: Arc<KeyedLocks<String>>,
    session_locks: Arc<KeyedLocks<String>>,
    conflict_policy: SessionConflictPolicy,
    /// Grace past planned duration before a running session times out
    grace_secs: i64,
}

impl SessionEngine {
    pub fn new(
        store: Store,
        fanout: Fanout,
        commands: CommandSink,
        band_locks: Arc<KeyedLocks<String>>,
        conflict_policy: SessionConflictPolicy,
        grace_secs: i64,
    ) -> Self {
        Self {
            store,
            fanout,
            commands,
            band_locks,
            session_locks: Arc::new(KeyedLocks::new()),
            conflict_policy,
            grace_secs,
        }
    }

    /// Create a session in PENDING. Does not start the hardware.
    ///
    /// Under the cleanup policy an existing active session on the band
    /// is force-terminated with reason `system_cleanup` first; under
    /// the reject policy creation fails with a conflict.
    pub async fn create(
        &self,
        bid: &str,
        params: StimParams,
        now: DateTime<Utc>,
    ) -> CoreResult<StimSession> {
        validate_level(params.level)?;

        let band_guard = self.band_locks.acquire(&bid.to_string()).await;
        let band = self
            .store
            .get_band_by_bid(bid)
            .await?
            .ok_or_else(|| CoreError::BandNotFound(bid.to_string()))?;

        let mut cleaned_up = None;
        if let Some(active) = self.store.active_session_for_band(band.id).await? {
            match self.conflict_policy {
                SessionConflictPolicy::Reject => {
                    return Err(CoreError::SessionConflict {
                        band_id: band.id,
                        session_id: active.session_id,
                    });
                }
                SessionConflictPolicy::Cleanup => {
                    let _session_guard = self.session_locks.acquire(&active.session_id).await;
                    let mut stale = active;
                    warn!(
                        bid = %bid,
                        session_id = %stale.session_id,
                        "terminating stale session before creating a new one"
                    );
                    self.terminate_locked(&mut stale, EndReason::SystemCleanup, now)
                        .await?;
                    cleaned_up = Some(stale);
                }
            }
        }

        let session = StimSession {
            session_id: generate_session_id(now),
            band_id: band.id,
            stimulator_id: band
                .stimulator_id
                .clone()
                .unwrap_or_else(|| "UNKNOWN".to_string()),
            status: SessionStatus::Pending,
            params,
            created_at: now,
            started_at: None,
            ended_at: None,
            end_reason: None,
            bp_before: None,
            bp_after: None,
        };
        self.store.insert_session(&session).await?;
        drop(band_guard);

        if let Some(stale) = cleaned_up {
            self.publish_session_update(&stale, &band.bid, now).await;
        }
        info!(bid = %bid, session_id = %session.session_id, "session created");
        self.publish_session_update(&session, &band.bid, now).await;

        Ok(session)
    }

    /// Start a PENDING session, optionally attaching a pre-session
    /// blood-pressure reading, and command the stimulator on.
    pub async fn start(
        &self,
        session_id: &str,
        before_bp: Option<BloodPressure>,
        now: DateTime<Utc>,
    ) -> CoreResult<StimSession> {
        let guard = self.session_locks.acquire(&session_id.to_string()).await;
        let mut session = self.get_session(session_id).await?;

        if session.status != SessionStatus::Pending {
            return Err(CoreError::invalid_state(
                session_id,
                "pending",
                session.status.as_str(),
            ));
        }

        session.bp_before = before_bp;
        session.status = SessionStatus::Running;
        session.started_at = Some(now);
        self.store.update_session(&session).await?;
        drop(guard);

        let bid = self.band_bid(session.band_id).await?;
        let cmd = StartCommand::new(
            bid.clone(),
            session.session_id.clone(),
            session.stimulator_id.clone(),
            &session.params,
            now,
        );
        if let Err(e) = self.commands.stim_start(&cmd).await {
            warn!(session_id = %session_id, error = %e, "start command failed");
        }

        info!(session_id = %session_id, level = session.params.level, "session started");
        self.publish_session_update(&session, &bid, now).await;
        Ok(session)
    }

    /// Change stimulation intensity on a RUNNING session
    pub async fn change_level(
        &self,
        session_id: &str,
        level: i32,
        now: DateTime<Utc>,
    ) -> CoreResult<StimSession> {
        validate_level(level)?;

        let guard = self.session_locks.acquire(&session_id.to_string()).await;
        let mut session = self.get_session(session_id).await?;

        if session.status != SessionStatus::Running {
            return Err(CoreError::invalid_state(
                session_id,
                "running",
                session.status.as_str(),
            ));
        }

        session.params.level = level;
        self.store.update_session(&session).await?;
        drop(guard);

        let bid = self.band_bid(session.band_id).await?;
        let cmd = ChangeLevelCommand {
            bid: bid.clone(),
            session_id: session.session_id.clone(),
            stimulator_id: session.stimulator_id.clone(),
            level,
            timestamp: now.timestamp_millis(),
        };
        if let Err(e) = self.commands.stim_change_level(&cmd).await {
            warn!(session_id = %session_id, error = %e, "level change command failed");
        }

        self.publish_session_update(&session, &bid, now).await;
        Ok(session)
    }

    /// Stop a PENDING or RUNNING session by operator request,
    /// optionally attaching a post-session blood-pressure reading.
    pub async fn stop(
        &self,
        session_id: &str,
        after_bp: Option<BloodPressure>,
        now: DateTime<Utc>,
    ) -> CoreResult<SessionRecord> {
        let guard = self.session_locks.acquire(&session_id.to_string()).await;
        let mut session = self.get_session(session_id).await?;

        if session.status.is_terminal() {
            return Err(CoreError::invalid_state(
                session_id,
                "pending or running",
                session.status.as_str(),
            ));
        }

        session.bp_after = after_bp;
        let record = self
            .terminate_locked(&mut session, EndReason::UserStop, now)
            .await?;
        drop(guard);

        let bid = self.band_bid(session.band_id).await?;
        let cmd = StopCommand {
            bid: bid.clone(),
            session_id: session.session_id.clone(),
            stimulator_id: session.stimulator_id.clone(),
            timestamp: now.timestamp_millis(),
        };
        if let Err(e) = self.commands.stim_stop(&cmd).await {
            warn!(session_id = %session_id, error = %e, "stop command failed");
        }

        info!(session_id = %session_id, "session stopped by user");
        self.publish_session_update(&session, &bid, now).await;
        Ok(record)
    }

    /// Stimulator dropped off: terminate the band's active session with
    /// reason `disconnected` and raise an event. Returns the event, if
    /// a session was terminated.
    pub async fn handle_disconnect(
        &self,
        report: &StimDisconnectReport,
        now: DateTime<Utc>,
    ) -> CoreResult<Option<Event>> {
        let Some(band) = self.store.get_band_by_bid(&report.bid).await? else {
            return Ok(None);
        };
        let Some(active) = self.store.active_session_for_band(band.id).await? else {
            return Ok(None);
        };

        let guard = self.session_locks.acquire(&active.session_id).await;
        let mut session = self.get_session(&active.session_id).await?;
        if session.status.is_terminal() {
            return Ok(None);
        }
        let was_running = session.status == SessionStatus::Running;
        self.terminate_locked(&mut session, EndReason::Disconnected, now)
            .await?;
        drop(guard);

        let mut event = None;
        if was_running {
            let note = report
                .reason
                .clone()
                .unwrap_or_else(|| "stimulator disconnected".to_string());
            event = Some(
                self.store
                    .insert_event(
                        &NewEvent::new(band.id, EventKind::StimDisconnected, now).with_note(note),
                    )
                    .await?,
            );
        }

        warn!(
            bid = %report.bid,
            session_id = %session.session_id,
            "session terminated by stimulator disconnect"
        );
        self.publish_session_update(&session, &band.bid, now).await;
        Ok(event)
    }

    /// Stimulator progress report: fanned out, never persisted
    pub async fn handle_status(&self, report: &StimStatusReport, now: DateTime<Utc>) {
        let session = match self.store.get_session(&report.session_id).await {
            Ok(session) => session,
            Err(e) => {
                warn!(
                    session_id = %report.session_id,
                    error = %e,
                    "session lookup failed for status report"
                );
                None
            }
        };

        let bid = match (&report.bid, &session) {
            (Some(bid), _) => bid.clone(),
            (None, Some(session)) => match self.band_bid(session.band_id).await {
                Ok(bid) => bid,
                Err(e) => {
                    warn!(
                        session_id = %report.session_id,
                        error = %e,
                        "band lookup failed for status report"
                    );
                    String::new()
                }
            },
            (None, None) => String::new(),
        };
        let status = session
            .as_ref()
            .map(|s| s.status)
            .unwrap_or(SessionStatus::Running);
        let level = report
            .current_level
            .or_else(|| session.as_ref().map(|s| s.params.level))
            .unwrap_or(0);

        self.fanout
            .publish(
                Channel::session(&report.session_id),
                FanoutEvent::SessionUpdate {
                    session_id: report.session_id.clone(),
                    bid,
                    status,
                    level,
                    end_reason: None,
                    at: now,
                },
            )
            .await;
    }

    /// Stimulator finished its program on its own
    pub async fn handle_complete(
        &self,
        report: &StimCompleteReport,
        now: DateTime<Utc>,
    ) -> CoreResult<Option<SessionRecord>> {
        let guard = self.session_locks.acquire(&report.session_id).await;
        let mut session = self.get_session(&report.session_id).await?;
        if session.status.is_terminal() {
            return Ok(None);
        }
        let record = self
            .terminate_locked(&mut session, EndReason::Completed, now)
            .await?;
        drop(guard);

        let bid = self.band_bid(session.band_id).await?;
        info!(session_id = %session.session_id, "session completed by device");
        self.publish_session_update(&session, &bid, now).await;
        Ok(Some(record))
    }

    /// Stimulator fault: terminate with reason `error` and raise an event
    pub async fn handle_error(
        &self,
        report: &StimErrorReport,
        now: DateTime<Utc>,
    ) -> CoreResult<Option<Event>> {
        let guard = self.session_locks.acquire(&report.session_id).await;
        let mut session = self.get_session(&report.session_id).await?;
        if session.status.is_terminal() {
            return Ok(None);
        }
        self.terminate_locked(&mut session, EndReason::Error, now)
            .await?;
        drop(guard);

        let note = match (&report.error_code, &report.error_message) {
            (Some(code), Some(message)) => format!("{}: {}", code, message),
            (Some(code), None) => code.clone(),
            (None, Some(message)) => message.clone(),
            (None, None) => "stimulator error".to_string(),
        };
        let event = self
            .store
            .insert_event(&NewEvent::new(session.band_id, EventKind::StimError, now).with_note(note))
            .await?;

        let bid = self.band_bid(session.band_id).await?;
        warn!(session_id = %session.session_id, "session terminated by stimulator error");
        self.publish_session_update(&session, &bid, now).await;
        Ok(Some(event))
    }

    /// Force-terminate every RUNNING session past its deadline.
    /// Deadlines compare persisted timestamps against `now`, so pending
    /// timeouts survive a process restart. A failure on one session is
    /// logged and the sweep moves on. Returns the records written.
    pub async fn sweep_timeouts(&self, now: DateTime<Utc>) -> CoreResult<Vec<SessionRecord>> {
        let mut records = Vec::new();
        for candidate in self.store.running_sessions().await? {
            let Some(deadline) = candidate.timeout_deadline(self.grace_secs) else {
                continue;
            };
            if now <= deadline {
                continue;
            }

            let guard = self.session_locks.acquire(&candidate.session_id).await;
            let mut session = match self.get_session(&candidate.session_id).await {
                Ok(session) => session,
                Err(e) => {
                    e.log();
                    continue;
                }
            };
            // A stop or device report may have won the race
            if session.status != SessionStatus::Running {
                continue;
            }
            let record = match self
                .terminate_locked(&mut session, EndReason::Timeout, now)
                .await
            {
                Ok(record) => record,
                Err(e) => {
                    e.log();
                    continue;
                }
            };
            drop(guard);

            warn!(
                session_id = %session.session_id,
                planned_min = session.params.duration_min,
                "session timed out"
            );
            match self.band_bid(session.band_id).await {
                Ok(bid) => self.publish_session_update(&session, &bid, now).await,
                Err(e) => e.log(),
            }
            records.push(record);
        }
        Ok(records)
    }

    async fn get_session(&self, session_id: &str) -> CoreResult<StimSession> {
        self.store
            .get_session(session_id)
            .await?
            .ok_or_else(|| CoreError::SessionNotFound(session_id.to_string()))
    }

    async fn band_bid(&self, band_id: i64) -> CoreResult<String> {
        Ok(self
            .store
            .get_band(band_id)
            .await?
            .map(|band| band.bid)
            .unwrap_or_default())
    }

    /// Move a session to its terminal state and write the history
    /// record. Caller holds the session lock.
    async fn terminate_locked(
        &self,
        session: &mut StimSession,
        reason: EndReason,
        now: DateTime<Utc>,
    ) -> CoreResult<SessionRecord> {
        session.status = match reason {
            EndReason::Completed => SessionStatus::Completed,
            _ => SessionStatus::Stopped,
        };
        session.ended_at = Some(now);
        session.end_reason = Some(reason);
        self.store.update_session(session).await?;

        let record = SessionRecord::from_session(session, reason, now);
        self.store.insert_session_record(&record).await?;
        Ok(record)
    }

    async fn publish_session_update(&self, session: &StimSession, bid: &str, now: DateTime<Utc>) {
        let event = FanoutEvent::SessionUpdate {
            session_id: session.session_id.clone(),
            bid: bid.to_string(),
            status: session.status,
            level: session.params.level,
            end_reason: session.end_reason,
            at: now,
        };
        self.fanout
            .publish(Channel::session(&session.session_id), event.clone())
            .await;
        self.fanout
            .publish(Channel::band(bid), event.clone())
            .await;
        self.fanout.publish(Channel::Dashboard, event).await;
    }
}

fn validate_level(level: i32) -> CoreResult<()> {
    if !(MIN_STIM_LEVEL..=MAX_STIM_LEVEL).contains(&level) {
        return Err(CoreError::InvalidLevel(level));
    }
    Ok(())
}
