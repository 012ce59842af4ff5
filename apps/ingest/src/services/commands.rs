//! Outbound device commands
//!
//! Command emission is fire-and-forget: a failed publish is logged by
//! the caller and never rolls back a state transition. The memory
//! variant records what would have gone to the broker, for tests and
//! broker-less development.

use std::sync::{Arc, Mutex};

use serde::Serialize;
use tracing::debug;

use crate::error::{CoreError, CoreResult};
use crate::mqtt::payloads::{ChangeLevelCommand, StartCommand, StopCommand, WeatherStatusPush};
use crate::mqtt::{MqttPublisher, TopicMap};

#[derive(Clone)]
pub struct CommandSink {
    inner: CommandSinkInner,
}

#[derive(Clone)]
enum CommandSinkInner {
    Mqtt {
        publisher: MqttPublisher,
        topics: TopicMap,
    },
    Memory {
        topics: TopicMap,
        sent: Arc<Mutex<Vec<(String, serde_json::Value)>>>,
    },
}

impl CommandSink {
    pub fn mqtt(publisher: MqttPublisher, topics: TopicMap) -> Self {
        Self {
            inner: CommandSinkInner::Mqtt { publisher, topics },
        }
    }

    /// A sink that records commands instead of publishing them
    pub fn memory(topics: TopicMap) -> Self {
        Self {
            inner: CommandSinkInner::Memory {
                topics,
                sent: Arc::new(Mutex::new(Vec::new())),
            },
        }
    }

    pub async fn stim_start(&self, cmd: &StartCommand) -> CoreResult<()> {
        let topic = self.topics().stim_start();
        self.send(topic, cmd).await
    }

    pub async fn stim_stop(&self, cmd: &StopCommand) -> CoreResult<()> {
        let topic = self.topics().stim_stop();
        self.send(topic, cmd).await
    }

    pub async fn stim_change_level(&self, cmd: &ChangeLevelCommand) -> CoreResult<()> {
        let topic = self.topics().stim_change_level();
        self.send(topic, cmd).await
    }

    pub async fn weather_status(&self, push: &WeatherStatusPush) -> CoreResult<()> {
        let topic = self.topics().weather_status();
        self.send(topic, push).await
    }

    fn topics(&self) -> &TopicMap {
        match &self.inner {
            CommandSinkInner::Mqtt { topics, .. } => topics,
            CommandSinkInner::Memory { topics, .. } => topics,
        }
    }

    async fn send<T: Serialize>(&self, topic: String, payload: &T) -> CoreResult<()> {
        match &self.inner {
            CommandSinkInner::Mqtt { publisher, .. } => {
                publisher.publish_json(&topic, payload).await
            }
            CommandSinkInner::Memory { sent, .. } => {
                let value = serde_json::to_value(payload)?;
                debug!(topic = %topic, "recorded outbound command");
                sent.lock()
                    .map_err(|_| CoreError::Internal("command sink poisoned".to_string()))?
                    .push((topic, value));
                Ok(())
            }
        }
    }

    /// Commands recorded by a memory sink, oldest first
    pub fn recorded(&self) -> Vec<(String, serde_json::Value)> {
        match &self.inner {
            CommandSinkInner::Mqtt { .. } => Vec::new(),
            CommandSinkInner::Memory { sent, .. } => {
                sent.lock().map(|v| v.clone()).unwrap_or_default()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[tokio::test]
    async fn test_memory_sink_records_commands() {
        let sink = CommandSink::memory(TopicMap::new("/DT/eHG4"));
        let cmd = StopCommand {
            bid: "12345".to_string(),
            session_id: "STIM-20260830-ABC123".to_string(),
            stimulator_id: "NS-100".to_string(),
            timestamp: Utc::now().timestamp_millis(),
        };
        sink.stim_stop(&cmd).await.unwrap();

        let recorded = sink.recorded();
        assert_eq!(recorded.len(), 1);
        assert_eq!(recorded[0].0, "/DT/eHG4/NerveStim/Stop");
        assert_eq!(recorded[0].1["bid"], "12345");
    }
}
