//! Disconnect sweep: silent bands flip to offline exactly once.

mod common;

use chrono::{Duration, Utc};
use common::*;
use vitalink_ingest::models::{ConnectState, EventKind};

#[tokio::test]
async fn test_silent_band_flipped_offline_once() {
    let h = harness();
    let payload = sync_payload(21, 72, 98, 100, 1);
    h.router
        .dispatch(&topic("/naas/post/sync"), &payload)
        .await
        .unwrap();

    let mut band = h.store.get_band_by_bid("21").await.unwrap().unwrap();
    assert!(band.is_online());

    // Rewind the last-seen timestamp past the threshold
    band.last_data_at = Some(Utc::now() - Duration::seconds(600));
    h.store.update_band(&band).await.unwrap();

    let flipped = h.sweeper.sweep_offline(Utc::now()).await.unwrap();
    assert_eq!(flipped, 1);

    let band = h.store.get_band_by_bid("21").await.unwrap().unwrap();
    assert_eq!(band.connect_state, ConnectState::Offline);
    assert!(band.disconnect_time.is_some());

    let events = h.mem.events_for_band(band.id).await;
    let offline: Vec<_> = events
        .iter()
        .filter(|e| e.kind == EventKind::DeviceOffline)
        .collect();
    assert_eq!(offline.len(), 1);

    // An offline band is not swept again
    let flipped = h.sweeper.sweep_offline(Utc::now()).await.unwrap();
    assert_eq!(flipped, 0);
    let events = h.mem.events_for_band(band.id).await;
    assert_eq!(
        events
            .iter()
            .filter(|e| e.kind == EventKind::DeviceOffline)
            .count(),
        1
    );
}

#[tokio::test]
async fn test_recent_band_untouched_by_sweep() {
    let h = harness();
    let payload = sync_payload(22, 70, 97, 50, 1);
    h.router
        .dispatch(&topic("/naas/post/sync"), &payload)
        .await
        .unwrap();

    let flipped = h.sweeper.sweep_offline(Utc::now()).await.unwrap();
    assert_eq!(flipped, 0);
    let band = h.store.get_band_by_bid("22").await.unwrap().unwrap();
    assert!(band.is_online());
}

#[tokio::test]
async fn test_fresh_data_brings_band_back_online() {
    let h = harness();
    let payload = sync_payload(23, 70, 97, 10, 1);
    h.router
        .dispatch(&topic("/naas/post/sync"), &payload)
        .await
        .unwrap();

    let mut band = h.store.get_band_by_bid("23").await.unwrap().unwrap();
    band.last_data_at = Some(Utc::now() - Duration::seconds(600));
    h.store.update_band(&band).await.unwrap();
    h.sweeper.sweep_offline(Utc::now()).await.unwrap();

    let payload = sync_payload(23, 71, 97, 12, 1);
    h.router
        .dispatch(&topic("/naas/post/sync"), &payload)
        .await
        .unwrap();

    let band = h.store.get_band_by_bid("23").await.unwrap().unwrap();
    assert!(band.is_online());
    assert!(band.connect_time.is_some());
}
