//! Alert delivery: fanout plus guardian SMS for severe events
//!
//! Every persisted event is fanned out; events at severity 3 or above
//! additionally go to the band's guardian by SMS when a gateway is
//! configured. SMS delivery is best-effort and never fails ingestion.

use tracing::{info, warn};
use vitalink_sms_client::{AlertTemplate, SmsClient, TemplateVars};

use crate::fanout::{Channel, Fanout, FanoutEvent};
use crate::models::{Band, Event, EventKind};

/// Events at or above this severity page the guardian
const SMS_SEVERITY_THRESHOLD: i32 = 3;

#[derive(Clone)]
pub struct AlertService {
    fanout: Fanout,
    sms: Option<SmsClient>,
    store: crate::store::Store,
}

impl AlertService {
    pub fn new(store: crate::store::Store, fanout: Fanout, sms: Option<SmsClient>) -> Self {
        Self { fanout, sms, store }
    }

    /// Fan out and, for severe events, page the guardian
    pub async fn dispatch(&self, band: &Band, events: &[Event]) {
        for event in events {
            let fanout_event = FanoutEvent::Alert {
                bid: band.bid.clone(),
                kind: event.kind,
                severity: event.severity,
                value: event.value,
                at: event.recorded_at,
            };
            self.fanout
                .publish(Channel::Alerts, fanout_event.clone())
                .await;
            self.fanout
                .publish(Channel::band(&band.bid), fanout_event)
                .await;

            if event.severity >= SMS_SEVERITY_THRESHOLD {
                self.page_guardian(band, event).await;
            }
        }
    }

    async fn page_guardian(&self, band: &Band, event: &Event) {
        let Some(sms) = &self.sms else {
            return;
        };
        let Some(phone) = &band.guardian_phone else {
            warn!(bid = %band.bid, kind = %event.kind.as_str(), "severe event but no guardian phone");
            return;
        };

        let name = band.wearer_name.clone().unwrap_or_else(|| band.bid.clone());
        let mut vars = TemplateVars::named(name);
        if let Some(value) = event.value {
            vars = vars.with_value(value);
        }
        if let (Some(lat), Some(lon)) = (band.latitude, band.longitude) {
            vars = vars.with_location(format!("{:.5},{:.5}", lat, lon));
        }
        if let Some(note) = &event.note {
            vars = vars.with_message(note.clone());
        }

        match sms.send_alert(phone, template_for(event.kind), &vars).await {
            Ok(message_id) => {
                info!(
                    bid = %band.bid,
                    kind = %event.kind.as_str(),
                    message_id = message_id.as_deref().unwrap_or(""),
                    "guardian paged"
                );
                if let Err(e) = self.store.mark_event_sms_sent(event.id).await {
                    warn!(event_id = event.id, error = %e, "failed to stamp sms_sent");
                }
            }
            Err(e) => {
                warn!(bid = %band.bid, kind = %event.kind.as_str(), error = %e, "guardian sms failed");
            }
        }
    }
}

fn template_for(kind: EventKind) -> AlertTemplate {
    match kind {
        EventKind::Sos => AlertTemplate::SosButton,
        EventKind::Fall => AlertTemplate::FallDetected,
        EventKind::HrHigh => AlertTemplate::HrHigh,
        EventKind::HrLow => AlertTemplate::HrLow,
        EventKind::Spo2Low => AlertTemplate::Spo2Low,
        EventKind::BatteryLow => AlertTemplate::BatteryLow,
        EventKind::DeviceOffline => AlertTemplate::DeviceOffline,
        EventKind::StimDisconnected => AlertTemplate::StimulatorDisconnected,
        EventKind::StimError => AlertTemplate::StimError,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_template_mapping_is_total() {
        // Severe kinds must have a matching SMS template
        for kind in [
            EventKind::Sos,
            EventKind::Fall,
            EventKind::HrHigh,
            EventKind::HrLow,
            EventKind::Spo2Low,
            EventKind::StimError,
        ] {
            assert!(kind.severity() >= SMS_SEVERITY_THRESHOLD);
            let _ = template_for(kind);
        }
    }
}
