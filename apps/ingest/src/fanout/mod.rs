//! Channel-scoped fanout to real-time subscribers
//!
//! Redis pub/sub carries events across instances; a broadcast-based in-memory
//! transport covers single-instance mode when Redis is unavailable. Publishing
//! is best-effort on top of the durable store.

mod messages;

pub use messages::{Channel, FanoutEvent};

use std::sync::Arc;

use tokio::sync::broadcast;

/// Redis channel namespace
const CHANNEL_PREFIX: &str = "fanout:";

/// Channel capacity for broadcast channels
const BROADCAST_CAPACITY: usize = 256;

/// Fanout system with Redis + in-memory fallback
#[derive(Clone)]
pub struct Fanout {
    inner: Arc<FanoutInner>,
}

enum FanoutInner {
    /// Redis-backed pub/sub for multi-instance deployments
    Redis(RedisFanout),
    /// In-memory pub/sub for single-instance mode
    InMemory(InMemoryFanout),
}

impl Fanout {
    /// Create a new fanout system with Redis
    pub fn new_with_redis(client: redis::Client) -> Self {
        Self {
            inner: Arc::new(FanoutInner::Redis(RedisFanout::new(client))),
        }
    }

    /// Create a new in-memory fanout system (single instance mode)
    pub fn new_in_memory() -> Self {
        Self {
            inner: Arc::new(FanoutInner::InMemory(InMemoryFanout::new())),
        }
    }

    /// Try to create with Redis, fall back to in-memory
    pub async fn try_with_redis(redis_url: &str) -> Self {
        match redis::Client::open(redis_url) {
            Ok(client) => match client.get_multiplexed_async_connection().await {
                Ok(mut conn) => {
                    let pong: Result<String, _> = redis::cmd("PING").query_async(&mut conn).await;
                    if pong.is_ok() {
                        tracing::info!("Redis connected for fanout");
                        return Self::new_with_redis(client);
                    }
                    tracing::warn!("Redis PING failed for fanout");
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Redis fanout connection failed");
                }
            },
            Err(e) => {
                tracing::warn!(error = %e, "Redis client creation failed for fanout");
            }
        }

        tracing::warn!("Using in-memory fanout (single instance mode only)");
        Self::new_in_memory()
    }

    /// Publish an event to a channel
    pub async fn publish(&self, channel: Channel, event: FanoutEvent) {
        match &*self.inner {
            FanoutInner::Redis(redis) => redis.publish(channel, event).await,
            FanoutInner::InMemory(memory) => memory.publish(channel, event),
        }
    }

    /// Subscribe to a channel
    pub async fn subscribe(&self, channel: Channel) -> broadcast::Receiver<FanoutEvent> {
        match &*self.inner {
            FanoutInner::Redis(redis) => redis.subscribe(channel).await,
            FanoutInner::InMemory(memory) => memory.subscribe(channel),
        }
    }

    /// Check if we're using Redis (multi-instance capable)
    pub fn is_redis_backed(&self) -> bool {
        matches!(&*self.inner, FanoutInner::Redis(_))
    }
}

/// Redis-backed fanout implementation
struct RedisFanout {
    client: redis::Client,
    /// Local broadcast for redistribution to local subscribers
    local_sender: broadcast::Sender<(Channel, FanoutEvent)>,
}

impl RedisFanout {
    fn new(client: redis::Client) -> Self {
        let (local_sender, _) = broadcast::channel(BROADCAST_CAPACITY);

        let fanout = Self {
            client,
            local_sender,
        };

        fanout.start_listener();

        fanout
    }

    fn start_listener(&self) {
        let client = self.client.clone();
        let sender = self.local_sender.clone();

        tokio::spawn(async move {
            const MAX_RECONNECT_DELAY_SECS: u64 = 60;
            const MAX_RECONNECT_ATTEMPTS: u32 = 100;

            let mut attempts = 0u32;
            let mut delay_secs = 1u64;

            loop {
                match Self::run_listener(&client, &sender).await {
                    Ok(()) => {
                        tracing::warn!("Redis fanout listener disconnected, reconnecting...");
                        attempts = 0;
                        delay_secs = 1;
                    }
                    Err(e) => {
                        attempts += 1;
                        if attempts >= MAX_RECONNECT_ATTEMPTS {
                            tracing::error!(
                                "Redis fanout max reconnect attempts ({}) exceeded, giving up",
                                MAX_RECONNECT_ATTEMPTS
                            );
                            break;
                        }
                        tracing::error!(
                            error = %e,
                            attempt = attempts,
                            delay_secs = delay_secs,
                            "Redis fanout listener error, reconnecting..."
                        );
                    }
                }

                tokio::time::sleep(tokio::time::Duration::from_secs(delay_secs)).await;
                delay_secs = (delay_secs * 2).min(MAX_RECONNECT_DELAY_SECS);
            }
        });
    }

    async fn run_listener(
        client: &redis::Client,
        sender: &broadcast::Sender<(Channel, FanoutEvent)>,
    ) -> Result<(), redis::RedisError> {
        use futures_util::StreamExt;

        let conn = client.get_async_connection().await?;
        let mut pubsub = conn.into_pubsub();

        pubsub.psubscribe(format!("{}*", CHANNEL_PREFIX)).await?;

        let mut stream = pubsub.on_message();

        while let Some(msg) = stream.next().await {
            let channel_name: String = msg.get_channel_name().to_string();
            let payload: Vec<u8> = msg.get_payload_bytes().to_vec();

            if let Some(name) = channel_name.strip_prefix(CHANNEL_PREFIX) {
                if let Some(channel) = Channel::parse(name) {
                    if let Ok(payload_str) = String::from_utf8(payload) {
                        if let Ok(event) = serde_json::from_str::<FanoutEvent>(&payload_str) {
                            let _ = sender.send((channel, event));
                        }
                    }
                }
            }
        }

        Ok(())
    }

    async fn publish(&self, channel: Channel, event: FanoutEvent) {
        let redis_channel = format!("{}{}", CHANNEL_PREFIX, channel.name());

        match serde_json::to_string(&event) {
            Ok(payload) => match self.client.get_multiplexed_async_connection().await {
                Ok(mut conn) => {
                    let result: Result<(), _> = redis::cmd("PUBLISH")
                        .arg(&redis_channel)
                        .arg(&payload)
                        .query_async(&mut conn)
                        .await;

                    if let Err(e) = result {
                        tracing::error!(error = %e, "Failed to publish to Redis");
                        let _ = self.local_sender.send((channel, event));
                    }
                }
                Err(e) => {
                    tracing::error!(error = %e, "Failed to get Redis connection for publish");
                    let _ = self.local_sender.send((channel, event));
                }
            },
            Err(e) => {
                tracing::error!(error = %e, "Failed to serialize fanout event");
            }
        }
    }

    async fn subscribe(&self, channel: Channel) -> broadcast::Receiver<FanoutEvent> {
        // Filtered receiver fed from the process-wide stream
        let (tx, rx) = broadcast::channel(BROADCAST_CAPACITY);
        let mut global_rx = self.local_sender.subscribe();

        tokio::spawn(async move {
            while let Ok((event_channel, event)) = global_rx.recv().await {
                if event_channel == channel && tx.send(event).is_err() {
                    break;
                }
            }
        });

        rx
    }
}

/// In-memory fanout implementation for single-instance mode
struct InMemoryFanout {
    /// Per-channel broadcast senders
    channels: dashmap::DashMap<Channel, broadcast::Sender<FanoutEvent>>,
}

impl InMemoryFanout {
    fn new() -> Self {
        Self {
            channels: dashmap::DashMap::new(),
        }
    }

    fn publish(&self, channel: Channel, event: FanoutEvent) {
        if let Some(sender) = self.channels.get(&channel) {
            // Ignore send errors (no receivers)
            let _ = sender.send(event);
        }
    }

    fn subscribe(&self, channel: Channel) -> broadcast::Receiver<FanoutEvent> {
        let sender = self
            .channels
            .entry(channel)
            .or_insert_with(|| broadcast::channel(BROADCAST_CAPACITY).0);
        sender.subscribe()
    }
}
