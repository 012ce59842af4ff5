//! Inbound message routing
//!
//! Decodes and classifies every frame from the fleet and hands it to
//! the right service. Errors out of `dispatch` are logged by the event
//! loop and never tear down the connection; a malformed frame costs
//! only itself.

use chrono::Utc;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};
use vitalink_weather_client::WeatherClient;

use crate::error::{CoreError, CoreResult};
use crate::models::{Event, LocationFix, NewEvent};
use crate::mqtt::dedup::DedupCache;
use crate::mqtt::payloads::{
    BandFrame, LocationFrame, StimCompleteReport, StimConnectReport, StimDisconnectReport,
    StimErrorReport, StimStatusReport, WeatherRequestFrame, WeatherStatusPush,
};
use crate::mqtt::topics::{Route, TopicMap};
use crate::services::{AlertService, CommandSink, SessionEngine, Tracker};
use crate::store::Store;

pub struct Router {
    topics: TopicMap,
    store: Store,
    tracker: Tracker,
    engine: SessionEngine,
    alerts: AlertService,
    commands: CommandSink,
    dedup: DedupCache,
    weather: Option<WeatherClient>,
}

impl Router {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        topics: TopicMap,
        store: Store,
        tracker: Tracker,
        engine: SessionEngine,
        alerts: AlertService,
        commands: CommandSink,
        dedup: DedupCache,
        weather: Option<WeatherClient>,
    ) -> Self {
        Self {
            topics,
            store,
            tracker,
            engine,
            alerts,
            commands,
            dedup,
            weather,
        }
    }

    /// Route one inbound frame to its handler
    pub async fn dispatch(&self, topic: &str, payload: &[u8]) -> CoreResult<()> {
        let Some(route) = self.topics.classify(topic) else {
            return Err(CoreError::UnknownTopic(topic.to_string()));
        };

        match route {
            Route::TelemetrySync | Route::AsyncEvent => {
                let frame: BandFrame = decode(payload)?;
                self.handle_band_frame(&frame).await
            }
            Route::GpsLocation => {
                let frame: LocationFrame = decode(payload)?;
                self.handle_location(&frame).await
            }
            Route::WeatherRequest => {
                let frame: WeatherRequestFrame = decode(payload)?;
                self.handle_weather_request(&frame).await
            }
            Route::StimConnect => {
                let report: StimConnectReport = decode(payload)?;
                self.tracker
                    .attach_stimulator(&report.bid, &report.stimulator_id, Utc::now())
                    .await?;
                Ok(())
            }
            Route::StimDisconnect => {
                let report: StimDisconnectReport = decode(payload)?;
                self.handle_stim_disconnect(&report).await
            }
            Route::StimStatus => {
                let report: StimStatusReport = decode(payload)?;
                self.engine.handle_status(&report, Utc::now()).await;
                Ok(())
            }
            Route::StimComplete => {
                let report: StimCompleteReport = decode(payload)?;
                self.engine.handle_complete(&report, Utc::now()).await?;
                Ok(())
            }
            Route::StimError => {
                let report: StimErrorReport = decode(payload)?;
                let event = self.engine.handle_error(&report, Utc::now()).await?;
                if let Some(event) = event {
                    self.dispatch_alert(event).await?;
                }
                Ok(())
            }
        }
    }

    /// Sync and async frames share a shape; either part may be present
    async fn handle_band_frame(&self, frame: &BandFrame) -> CoreResult<()> {
        let now = Utc::now();

        if let Some(outcome) = self.tracker.apply_sample(frame, now).await? {
            self.alerts.dispatch(&outcome.band, &outcome.events).await;
        }

        if let Some(kind) = frame.event_kind() {
            let bid = frame.ext_address.bid();
            let type_code = frame.type_code.unwrap_or_default();
            let value = frame.value.unwrap_or_default();
            if !self.dedup.admit(&bid, type_code, value) {
                debug!(bid = %bid, type_code, "duplicate event suppressed");
                return Ok(());
            }

            let band = self.store.get_or_provision_band(&bid, now).await?;
            let event = self
                .store
                .insert_event(&NewEvent::new(band.id, kind, now).with_value(value as f64))
                .await?;
            self.alerts.dispatch(&band, &[event]).await;
        } else if let Some(code) = frame.type_code {
            debug!(type_code = code, "ignoring unknown event type code");
        }

        Ok(())
    }

    async fn handle_location(&self, frame: &LocationFrame) -> CoreResult<()> {
        let now = Utc::now();
        let recorded_at = frame.timestamp.unwrap_or(now);
        let fix = LocationFix::parse(&frame.position, recorded_at)
            .map_err(|e| CoreError::InvalidLocation(e.to_string()))?;

        self.tracker
            .apply_location(&frame.ext_address.bid(), &fix, now)
            .await?;
        Ok(())
    }

    async fn handle_weather_request(&self, frame: &WeatherRequestFrame) -> CoreResult<()> {
        let Some(weather) = &self.weather else {
            debug!("weather request received but no weather client configured");
            return Ok(());
        };

        let bid = frame.ext_address.bid();
        let Some(band) = self.store.get_band_by_bid(&bid).await? else {
            warn!(bid = %bid, "weather request from unknown band");
            return Ok(());
        };
        let (Some(lat), Some(lon)) = (band.latitude, band.longitude) else {
            warn!(bid = %bid, "weather request but band has no position");
            return Ok(());
        };

        let conditions = weather
            .current_conditions(lat, lon)
            .await
            .map_err(|e| CoreError::Internal(format!("weather lookup failed: {}", e)))?;

        let push = WeatherStatusPush {
            bid,
            temperature: conditions.temperature_scaled(),
            feels_like: conditions.feels_like_scaled(),
            humidity: conditions.humidity_scaled(),
            timestamp: Utc::now().timestamp_millis(),
        };
        self.commands.weather_status(&push).await
    }

    async fn handle_stim_disconnect(&self, report: &StimDisconnectReport) -> CoreResult<()> {
        let now = Utc::now();
        // Band pairing first, then the session, keeping lock order fixed
        self.tracker.detach_stimulator(&report.bid).await?;
        if let Some(event) = self.engine.handle_disconnect(report, now).await? {
            self.dispatch_alert(event).await?;
        }
        Ok(())
    }

    async fn dispatch_alert(&self, event: Event) -> CoreResult<()> {
        if let Some(band) = self.store.get_band(event.band_id).await? {
            self.alerts.dispatch(&band, &[event]).await;
        }
        Ok(())
    }
}

fn decode<T: DeserializeOwned>(payload: &[u8]) -> CoreResult<T> {
    serde_json::from_slice(payload).map_err(|e| CoreError::InvalidPayload(e.to_string()))
}
