//! Telemetry ingestion through the router: provisioning, counters,
//! connection flips, dedup and location handling.

mod common;

use common::*;
use vitalink_ingest::error::CoreError;
use vitalink_ingest::fanout::{Channel, FanoutEvent};
use vitalink_ingest::models::{ConnectState, EventKind};

#[tokio::test]
async fn test_unknown_band_auto_provisioned() {
    let h = harness();

    h.router
        .dispatch(&topic("/naas/post/sync"), &sync_payload(123, 72, 98, 100, 1))
        .await
        .unwrap();

    let band = h.store.get_band_by_bid("123").await.unwrap().unwrap();
    assert_eq!(band.connect_state, ConnectState::Online);
    assert_eq!(h.mem.sample_count(band.id).await, 1);
    assert!(band.last_data_at.is_some());
}

#[tokio::test]
async fn test_step_counters_reconcile_across_frames() {
    let h = harness();
    let sync_topic = topic("/naas/post/sync");

    // 100 then 150: cumulative reads, only the delta counts
    for raw in [100, 150] {
        h.router
            .dispatch(&sync_topic, &sync_payload(7, 72, 98, raw, 1))
            .await
            .unwrap();
    }
    // Re-delivery of the same reading must not double-count
    h.router
        .dispatch(&sync_topic, &sync_payload(7, 72, 98, 150, 1))
        .await
        .unwrap();
    // Counter reset: the raw value is progress since reboot
    h.router
        .dispatch(&sync_topic, &sync_payload(7, 72, 98, 20, 1))
        .await
        .unwrap();

    let band = h.store.get_band_by_bid("7").await.unwrap().unwrap();
    assert_eq!(band.walk_steps, 170);
    assert_eq!(band.raw_walk_steps, 20);
}

#[tokio::test]
async fn test_skin_contact_lost_forces_offline() {
    let h = harness();
    let sync_topic = topic("/naas/post/sync");

    h.router
        .dispatch(&sync_topic, &sync_payload(9, 72, 98, 0, 1))
        .await
        .unwrap();
    let band = h.store.get_band_by_bid("9").await.unwrap().unwrap();
    assert!(band.is_online());

    // scdState 0 flips offline immediately, no timeout involved
    h.router
        .dispatch(&sync_topic, &sync_payload(9, 72, 98, 0, 0))
        .await
        .unwrap();
    let band = h.store.get_band_by_bid("9").await.unwrap().unwrap();
    assert_eq!(band.connect_state, ConnectState::Offline);
    assert!(band.disconnect_time.is_some());
}

#[tokio::test]
async fn test_duplicate_async_event_suppressed() {
    let h = harness();
    let async_topic = topic("/naas/post/async");

    h.router
        .dispatch(&async_topic, &async_payload(5, 6, 1))
        .await
        .unwrap();
    h.router
        .dispatch(&async_topic, &async_payload(5, 6, 1))
        .await
        .unwrap();

    let band = h.store.get_band_by_bid("5").await.unwrap().unwrap();
    let events = h.mem.events_for_band(band.id).await;
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].kind, EventKind::Sos);
    assert_eq!(events[0].severity, 4);

    // A different fingerprint is a new event
    h.router
        .dispatch(&async_topic, &async_payload(5, 7, 1))
        .await
        .unwrap();
    assert_eq!(h.mem.events_for_band(band.id).await.len(), 2);
}

#[tokio::test]
async fn test_vital_thresholds_raise_events() {
    let h = harness();

    h.router
        .dispatch(&topic("/naas/post/sync"), &sync_payload(11, 130, 92, 0, 1))
        .await
        .unwrap();

    let band = h.store.get_band_by_bid("11").await.unwrap().unwrap();
    let events = h.mem.events_for_band(band.id).await;
    let kinds: Vec<EventKind> = events.iter().map(|e| e.kind).collect();
    assert!(kinds.contains(&EventKind::HrHigh));
    assert!(kinds.contains(&EventKind::Spo2Low));
}

#[tokio::test]
async fn test_location_for_unknown_band_never_provisions() {
    let h = harness();

    h.router
        .dispatch(
            &topic("/naas/GPS/Location"),
            &location_payload(314, "37.5665,126.9780,38.0"),
        )
        .await
        .unwrap();

    // Only telemetry frames create bands
    assert!(h.store.get_band_by_bid("314").await.unwrap().is_none());
}

#[tokio::test]
async fn test_location_jump_rejected_position_retained() {
    let h = harness();
    let gps_topic = topic("/naas/GPS/Location");

    // Bands come from telemetry; the fix alone must not create one
    h.router
        .dispatch(&topic("/naas/post/sync"), &sync_payload(3, 72, 98, 0, 1))
        .await
        .unwrap();

    // Seoul
    h.router
        .dispatch(&gps_topic, &location_payload(3, "37.5665,126.9780,38.0"))
        .await
        .unwrap();
    // New York, far beyond the jump limit
    h.router
        .dispatch(&gps_topic, &location_payload(3, "40.7128,-74.0060,10.0"))
        .await
        .unwrap();

    let band = h.store.get_band_by_bid("3").await.unwrap().unwrap();
    assert!((band.latitude.unwrap() - 37.5665).abs() < 1e-6);
    assert!((band.longitude.unwrap() - 126.9780).abs() < 1e-6);

    // A fix within range is accepted
    h.router
        .dispatch(&gps_topic, &location_payload(3, "37.4563,126.7052,20.0"))
        .await
        .unwrap();
    let band = h.store.get_band_by_bid("3").await.unwrap().unwrap();
    assert!((band.latitude.unwrap() - 37.4563).abs() < 1e-6);
}

#[tokio::test]
async fn test_malformed_location_dropped() {
    let h = harness();

    let result = h
        .router
        .dispatch(
            &topic("/naas/GPS/Location"),
            &location_payload(3, "not,numbers,here"),
        )
        .await;
    assert!(matches!(result, Err(CoreError::InvalidLocation(_))));
    // The band never gets a position from it
    assert!(h.store.get_band_by_bid("3").await.unwrap().is_none() || {
        let band = h.store.get_band_by_bid("3").await.unwrap().unwrap();
        band.latitude.is_none()
    });
}

#[tokio::test]
async fn test_garbage_payload_and_unknown_topic() {
    let h = harness();

    let result = h
        .router
        .dispatch(&topic("/naas/post/sync"), b"{not json")
        .await;
    assert!(matches!(result, Err(CoreError::InvalidPayload(_))));

    let result = h.router.dispatch("/DT/other/naas/post/sync", b"{}").await;
    assert!(matches!(result, Err(CoreError::UnknownTopic(_))));
}

#[tokio::test]
async fn test_telemetry_fanned_out_on_band_channel() {
    let h = harness();
    let mut rx = h.fanout.subscribe(Channel::band("21")).await;

    h.router
        .dispatch(&topic("/naas/post/sync"), &sync_payload(21, 72, 98, 50, 1))
        .await
        .unwrap();

    let event = tokio::time::timeout(std::time::Duration::from_secs(1), rx.recv())
        .await
        .expect("fanout event not delivered")
        .unwrap();
    match event {
        FanoutEvent::Telemetry {
            bid,
            heart_rate,
            walk_steps,
            ..
        } => {
            assert_eq!(bid, "21");
            assert_eq!(heart_rate, Some(72));
            assert_eq!(walk_steps, 50);
        }
        other => panic!("expected telemetry event, got {:?}", other),
    }
}
