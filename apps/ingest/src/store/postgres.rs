//! Postgres storage backend
//!
//! One flat row type per table; nested domain shapes are folded in and out
//! here so the rest of the crate never sees column layout.

use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool};

use crate::error::CoreResult;
use crate::models::{
    Band, BloodPressure, EndReason, Event, EventKind, NewEvent, SessionRecord, SessionStatus,
    StimParams, StimSession, TelemetrySample,
};

/// Flat `stim_sessions` row
#[derive(Debug, FromRow)]
struct SessionRow {
    session_id: String,
    band_id: i64,
    stimulator_id: String,
    status: SessionStatus,
    level: i32,
    frequency_hz: i32,
    pulse_width_us: i32,
    duration_min: i32,
    target_nerve: String,
    mode: String,
    created_at: DateTime<Utc>,
    started_at: Option<DateTime<Utc>>,
    ended_at: Option<DateTime<Utc>>,
    end_reason: Option<EndReason>,
    bp_before_systolic: Option<i32>,
    bp_before_diastolic: Option<i32>,
    bp_before_pulse: Option<i32>,
    bp_after_systolic: Option<i32>,
    bp_after_diastolic: Option<i32>,
    bp_after_pulse: Option<i32>,
}

fn fold_bp(systolic: Option<i32>, diastolic: Option<i32>, pulse: Option<i32>) -> Option<BloodPressure> {
    match (systolic, diastolic, pulse) {
        (Some(systolic), Some(diastolic), Some(pulse)) => Some(BloodPressure {
            systolic,
            diastolic,
            pulse,
        }),
        _ => None,
    }
}

impl From<SessionRow> for StimSession {
    fn from(row: SessionRow) -> Self {
        Self {
            session_id: row.session_id,
            band_id: row.band_id,
            stimulator_id: row.stimulator_id,
            status: row.status,
            params: StimParams {
                level: row.level,
                frequency_hz: row.frequency_hz,
                pulse_width_us: row.pulse_width_us,
                duration_min: row.duration_min,
                target_nerve: row.target_nerve,
                mode: row.mode,
            },
            created_at: row.created_at,
            started_at: row.started_at,
            ended_at: row.ended_at,
            end_reason: row.end_reason,
            bp_before: fold_bp(
                row.bp_before_systolic,
                row.bp_before_diastolic,
                row.bp_before_pulse,
            ),
            bp_after: fold_bp(
                row.bp_after_systolic,
                row.bp_after_diastolic,
                row.bp_after_pulse,
            ),
        }
    }
}

/// Postgres store
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn get_or_provision_band(&self, bid: &str, now: DateTime<Utc>) -> CoreResult<Band> {
        let band = sqlx::query_as::<_, Band>(
            r#"
            INSERT INTO bands (bid, connect_state, walk_steps, run_steps,
                               raw_walk_steps, raw_run_steps, stimulator_connected, created_at)
            VALUES ($1, 'offline', 0, 0, 0, 0, FALSE, $2)
            ON CONFLICT (bid) DO UPDATE SET bid = EXCLUDED.bid
            RETURNING *
            "#,
        )
        .bind(bid)
        .bind(now)
        .fetch_one(&self.pool)
        .await?;
        Ok(band)
    }

    pub async fn get_band(&self, band_id: i64) -> CoreResult<Option<Band>> {
        let band = sqlx::query_as::<_, Band>("SELECT * FROM bands WHERE id = $1")
            .bind(band_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(band)
    }

    pub async fn get_band_by_bid(&self, bid: &str) -> CoreResult<Option<Band>> {
        let band = sqlx::query_as::<_, Band>("SELECT * FROM bands WHERE bid = $1")
            .bind(bid)
            .fetch_optional(&self.pool)
            .await?;
        Ok(band)
    }

    pub async fn update_band(&self, band: &Band) -> CoreResult<()> {
        sqlx::query(
            r#"
            UPDATE bands
            SET connect_state = $2, connect_time = $3, disconnect_time = $4,
                last_data_at = $5, latitude = $6, longitude = $7,
                walk_steps = $8, run_steps = $9, raw_walk_steps = $10, raw_run_steps = $11,
                battery = $12, stimulator_id = $13, stimulator_connected = $14,
                guardian_phone = $15, wearer_name = $16
            WHERE id = $1
            "#,
        )
        .bind(band.id)
        .bind(band.connect_state)
        .bind(band.connect_time)
        .bind(band.disconnect_time)
        .bind(band.last_data_at)
        .bind(band.latitude)
        .bind(band.longitude)
        .bind(band.walk_steps)
        .bind(band.run_steps)
        .bind(band.raw_walk_steps)
        .bind(band.raw_run_steps)
        .bind(band.battery)
        .bind(&band.stimulator_id)
        .bind(band.stimulator_connected)
        .bind(&band.guardian_phone)
        .bind(&band.wearer_name)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn stale_online_bands(&self, cutoff: DateTime<Utc>) -> CoreResult<Vec<Band>> {
        let bands = sqlx::query_as::<_, Band>(
            r#"
            SELECT * FROM bands
            WHERE connect_state = 'online'
              AND (last_data_at IS NULL OR last_data_at < $1)
            "#,
        )
        .bind(cutoff)
        .fetch_all(&self.pool)
        .await?;
        Ok(bands)
    }

    pub async fn insert_sample(&self, sample: &TelemetrySample) -> CoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO telemetry_samples
                (band_id, recorded_at, heart_rate, spo2, motion, scd_state, activity,
                 battery, rssi, skin_temp, raw_walk_steps, raw_run_steps,
                 accel_x, accel_y, accel_z)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
            "#,
        )
        .bind(sample.band_id)
        .bind(sample.recorded_at)
        .bind(sample.heart_rate)
        .bind(sample.spo2)
        .bind(sample.motion)
        .bind(sample.scd_state)
        .bind(sample.activity)
        .bind(sample.battery)
        .bind(sample.rssi)
        .bind(sample.skin_temp)
        .bind(sample.raw_walk_steps)
        .bind(sample.raw_run_steps)
        .bind(sample.accel_x)
        .bind(sample.accel_y)
        .bind(sample.accel_z)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn insert_session(&self, session: &StimSession) -> CoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO stim_sessions
                (session_id, band_id, stimulator_id, status, level, frequency_hz,
                 pulse_width_us, duration_min, target_nerve, mode, created_at,
                 started_at, ended_at, end_reason,
                 bp_before_systolic, bp_before_diastolic, bp_before_pulse,
                 bp_after_systolic, bp_after_diastolic, bp_after_pulse)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11,
                    $12, $13, $14, $15, $16, $17, $18, $19, $20)
            "#,
        )
        .bind(&session.session_id)
        .bind(session.band_id)
        .bind(&session.stimulator_id)
        .bind(session.status)
        .bind(session.params.level)
        .bind(session.params.frequency_hz)
        .bind(session.params.pulse_width_us)
        .bind(session.params.duration_min)
        .bind(&session.params.target_nerve)
        .bind(&session.params.mode)
        .bind(session.created_at)
        .bind(session.started_at)
        .bind(session.ended_at)
        .bind(session.end_reason)
        .bind(session.bp_before.map(|bp| bp.systolic))
        .bind(session.bp_before.map(|bp| bp.diastolic))
        .bind(session.bp_before.map(|bp| bp.pulse))
        .bind(session.bp_after.map(|bp| bp.systolic))
        .bind(session.bp_after.map(|bp| bp.diastolic))
        .bind(session.bp_after.map(|bp| bp.pulse))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn get_session(&self, session_id: &str) -> CoreResult<Option<StimSession>> {
        let row =
            sqlx::query_as::<_, SessionRow>("SELECT * FROM stim_sessions WHERE session_id = $1")
                .bind(session_id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.map(Into::into))
    }

    pub async fn update_session(&self, session: &StimSession) -> CoreResult<()> {
        sqlx::query(
            r#"
            UPDATE stim_sessions
            SET status = $2, level = $3, started_at = $4, ended_at = $5, end_reason = $6,
                bp_before_systolic = $7, bp_before_diastolic = $8, bp_before_pulse = $9,
                bp_after_systolic = $10, bp_after_diastolic = $11, bp_after_pulse = $12
            WHERE session_id = $1
            "#,
        )
        .bind(&session.session_id)
        .bind(session.status)
        .bind(session.params.level)
        .bind(session.started_at)
        .bind(session.ended_at)
        .bind(session.end_reason)
        .bind(session.bp_before.map(|bp| bp.systolic))
        .bind(session.bp_before.map(|bp| bp.diastolic))
        .bind(session.bp_before.map(|bp| bp.pulse))
        .bind(session.bp_after.map(|bp| bp.systolic))
        .bind(session.bp_after.map(|bp| bp.diastolic))
        .bind(session.bp_after.map(|bp| bp.pulse))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn active_session_for_band(&self, band_id: i64) -> CoreResult<Option<StimSession>> {
        let row = sqlx::query_as::<_, SessionRow>(
            r#"
            SELECT * FROM stim_sessions
            WHERE band_id = $1 AND status IN ('pending', 'running')
            ORDER BY created_at DESC
            LIMIT 1
            "#,
        )
        .bind(band_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Into::into))
    }

    pub async fn running_sessions(&self) -> CoreResult<Vec<StimSession>> {
        let rows = sqlx::query_as::<_, SessionRow>(
            "SELECT * FROM stim_sessions WHERE status = 'running'",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    pub async fn insert_session_record(&self, record: &SessionRecord) -> CoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO session_records
                (session_id, band_id, stimulator_id, level, frequency_hz, pulse_width_us,
                 target_nerve, mode, planned_duration_min, actual_duration_min, end_reason,
                 bp_before_systolic, bp_before_diastolic, bp_after_systolic, bp_after_diastolic,
                 bp_change, started_at, ended_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11,
                    $12, $13, $14, $15, $16, $17, $18)
            "#,
        )
        .bind(&record.session_id)
        .bind(record.band_id)
        .bind(&record.stimulator_id)
        .bind(record.level)
        .bind(record.frequency_hz)
        .bind(record.pulse_width_us)
        .bind(&record.target_nerve)
        .bind(&record.mode)
        .bind(record.planned_duration_min)
        .bind(record.actual_duration_min)
        .bind(record.end_reason)
        .bind(record.bp_before_systolic)
        .bind(record.bp_before_diastolic)
        .bind(record.bp_after_systolic)
        .bind(record.bp_after_diastolic)
        .bind(record.bp_change)
        .bind(record.started_at)
        .bind(record.ended_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn get_session_record(&self, session_id: &str) -> CoreResult<Option<SessionRecord>> {
        let record = sqlx::query_as::<_, SessionRecord>(
            "SELECT * FROM session_records WHERE session_id = $1",
        )
        .bind(session_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(record)
    }

    pub async fn insert_event(&self, event: &NewEvent) -> CoreResult<Event> {
        let stored = sqlx::query_as::<_, Event>(
            r#"
            INSERT INTO events (band_id, kind, severity, value, note, recorded_at,
                                read, resolved, sms_sent)
            VALUES ($1, $2, $3, $4, $5, $6, FALSE, FALSE, FALSE)
            RETURNING *
            "#,
        )
        .bind(event.band_id)
        .bind(event.kind)
        .bind(event.severity())
        .bind(event.value)
        .bind(&event.note)
        .bind(event.recorded_at)
        .fetch_one(&self.pool)
        .await?;
        Ok(stored)
    }

    pub async fn mark_event_sms_sent(&self, event_id: i64) -> CoreResult<()> {
        sqlx::query("UPDATE events SET sms_sent = TRUE WHERE id = $1")
            .bind(event_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn last_event_of_kind(
        &self,
        band_id: i64,
        kind: EventKind,
    ) -> CoreResult<Option<Event>> {
        let event = sqlx::query_as::<_, Event>(
            r#"
            SELECT * FROM events
            WHERE band_id = $1 AND kind = $2
            ORDER BY recorded_at DESC
            LIMIT 1
            "#,
        )
        .bind(band_id)
        .bind(kind)
        .fetch_optional(&self.pool)
        .await?;
        Ok(event)
    }
}
