use std::sync::Arc;
use std::time::Duration;

use sqlx::postgres::PgPoolOptions;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use vitalink_sms_client::SmsClient;
use vitalink_weather_client::WeatherClient;

use vitalink_ingest::config::Config;
use vitalink_ingest::fanout::Fanout;
use vitalink_ingest::mqtt::{self, DedupCache, Router, TopicMap};
use vitalink_ingest::services::{
    AlertService, CommandSink, KeyedLocks, SessionEngine, Tracker, TrackerSettings,
};
use vitalink_ingest::store::Store;
use vitalink_ingest::sweeps::{self, Sweeper};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "vitalink_ingest=debug,rumqttc=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load environment variables
    dotenvy::dotenv().ok();

    let config = Config::from_env()?;
    tracing::info!(environment = %config.environment(), "Starting Vitalink ingest");

    // Database pool and migrations
    tracing::info!("Connecting to database...");
    let pool = PgPoolOptions::new()
        .max_connections(config.database().max_connections)
        .acquire_timeout(Duration::from_secs(config.database().connect_timeout_secs))
        .connect(config.database_url())
        .await?;
    sqlx::migrate!("./migrations").run(&pool).await?;
    tracing::info!("Database ready");

    let store = Store::postgres(pool);

    // Fanout falls back to in-process broadcast if Redis is unreachable
    let fanout = Fanout::try_with_redis(&config.redis_url()).await;
    if fanout.is_redis_backed() {
        tracing::info!("Fanout backed by Redis pub/sub");
    }

    // Optional collaborators; ingestion runs without them
    let weather = match WeatherClient::from_env() {
        Ok(client) => Some(client),
        Err(e) => {
            tracing::warn!(error = %e, "weather client disabled");
            None
        }
    };
    let sms = match SmsClient::from_env() {
        Ok(client) => Some(client),
        Err(e) => {
            tracing::warn!(error = %e, "sms client disabled");
            None
        }
    };

    // MQTT connection
    let topics = TopicMap::new(config.topic_root.clone());
    let (publisher, eventloop) = mqtt::connect(config.mqtt());
    let commands = CommandSink::mqtt(publisher.clone(), topics.clone());

    // Core services share the per-band lock map
    let band_locks = Arc::new(KeyedLocks::new());
    let tracker = Tracker::new(
        store.clone(),
        fanout.clone(),
        band_locks.clone(),
        TrackerSettings {
            hr_high_threshold: config.hr_high_threshold,
            hr_low_threshold: config.hr_low_threshold,
            spo2_low_threshold: config.spo2_low_threshold,
            battery_low_threshold: config.battery_low_threshold,
            battery_realert_secs: config.battery_realert_secs,
            gps_max_jump_km: config.gps_max_jump_km,
        },
    );
    let engine = SessionEngine::new(
        store.clone(),
        fanout.clone(),
        commands.clone(),
        band_locks,
        config.session_conflict_policy,
        config.session_grace_secs,
    );
    let alerts = AlertService::new(store.clone(), fanout.clone(), sms);

    let router = Arc::new(Router::new(
        topics.clone(),
        store.clone(),
        tracker.clone(),
        engine.clone(),
        alerts.clone(),
        commands,
        DedupCache::new(Duration::from_millis(config.dedup_window_ms)),
        weather,
    ));

    // Periodic sweeps
    let sweeper = Sweeper::new(store, tracker, engine, alerts, config.offline_threshold_secs);
    tokio::spawn(sweeps::run_offline_loop(
        sweeper.clone(),
        config.offline_sweep_interval_secs,
    ));
    tokio::spawn(sweeps::run_session_loop(
        sweeper,
        config.session_sweep_interval_secs,
    ));

    // Inbound message stream
    tokio::spawn(mqtt::run_event_loop(eventloop, publisher, topics, router));
    tracing::info!("Ingest running, waiting for fleet traffic");

    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutdown signal received");
    Ok(())
}
