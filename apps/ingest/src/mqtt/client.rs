//! MQTT broker connection and outbound publishing
//!
//! rumqttc reconnects on its own; subscriptions are re-issued on every
//! ConnAck so a broker restart does not silently drop the fleet topics.

use std::sync::Arc;
use std::time::Duration;

use rumqttc::{AsyncClient, Event, EventLoop, MqttOptions, Packet, QoS};
use serde::Serialize;
use tracing::{debug, error, info, warn};
use uuid::Uuid;
use vitalink_shared_config::MqttConfig;

use crate::error::{CoreError, CoreResult};
use crate::mqtt::router::Router;
use crate::mqtt::topics::TopicMap;

/// Delay before re-polling after a connection error
const RECONNECT_DELAY_SECS: u64 = 1;

/// Open a broker connection; the returned event loop must be polled
pub fn connect(config: &MqttConfig) -> (MqttPublisher, EventLoop) {
    let client_id = format!("{}-{}", config.client_id_prefix, Uuid::new_v4().simple());
    let mut options = MqttOptions::new(client_id, config.host.clone(), config.port);
    options.set_keep_alive(Duration::from_secs(config.keep_alive_secs));
    if let (Some(username), Some(password)) = (&config.username, &config.password) {
        options.set_credentials(username.clone(), password.clone());
    }

    let (client, eventloop) = AsyncClient::new(options, config.channel_capacity);
    (MqttPublisher { client }, eventloop)
}

/// Thin outbound handle, cheap to clone
#[derive(Clone)]
pub struct MqttPublisher {
    client: AsyncClient,
}

impl MqttPublisher {
    /// Publish a JSON payload at QoS 1
    pub async fn publish_json<T: Serialize>(&self, topic: &str, payload: &T) -> CoreResult<()> {
        let body = serde_json::to_vec(payload)?;
        self.client
            .publish(topic, QoS::AtLeastOnce, false, body)
            .await
            .map_err(|e| CoreError::Mqtt(e.to_string()))?;
        debug!(topic = %topic, "published mqtt message");
        Ok(())
    }

    /// Subscribe to every inbound fleet topic
    pub async fn subscribe_all(&self, topics: &TopicMap) -> CoreResult<()> {
        for topic in topics.subscriptions() {
            self.client
                .subscribe(&topic, QoS::AtLeastOnce)
                .await
                .map_err(|e| CoreError::Mqtt(e.to_string()))?;
            debug!(topic = %topic, "subscribed");
        }
        Ok(())
    }
}

/// Drive the broker connection, feeding inbound publishes to the router
///
/// Runs until the process shuts down. Handler errors are logged and
/// never tear down the connection.
pub async fn run_event_loop(
    mut eventloop: EventLoop,
    publisher: MqttPublisher,
    topics: TopicMap,
    router: Arc<Router>,
) {
    loop {
        match eventloop.poll().await {
            Ok(Event::Incoming(Packet::ConnAck(_))) => {
                info!("connected to mqtt broker");
                if let Err(e) = publisher.subscribe_all(&topics).await {
                    error!(error = %e, "failed to subscribe to fleet topics");
                }
            }
            Ok(Event::Incoming(Packet::Publish(publish))) => {
                if let Err(e) = router.dispatch(&publish.topic, &publish.payload).await {
                    e.log();
                }
            }
            Ok(_) => {}
            Err(e) => {
                warn!(error = %e, "mqtt connection error, retrying");
                tokio::time::sleep(Duration::from_secs(RECONNECT_DELAY_SECS)).await;
            }
        }
    }
}
