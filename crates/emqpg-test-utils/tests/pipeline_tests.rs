// SPDX-FileCopyrightText: 2026 Emqpg Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! End-to-end pipeline tests: broker session -> dispatcher -> sink -> store.

use std::time::Duration;

use emqpg_core::{SessionEvent, SessionState};
use emqpg_test_utils::{MemoryStore, PipelineHarness, SAMPLE_PAYLOAD, payload_for, wait_for_event};

const WAIT: Duration = Duration::from_secs(5);

#[tokio::test(start_paused = true)]
async fn published_report_lands_as_a_row() {
    let harness = PipelineHarness::builder().build().await.unwrap();
    harness.start().await.unwrap();

    assert!(harness.broker.publish("devices/123/telemetry", SAMPLE_PAYLOAD));
    assert!(harness.store.wait_for_rows(1, WAIT).await);

    let rows = harness.store.rows();
    assert_eq!(rows[0].report().imei, "123");
    assert_eq!(rows[0].report().vbat, 380);

    harness.shutdown().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn messages_outside_the_subscription_are_not_delivered() {
    let harness = PipelineHarness::builder()
        .with_topic("devices/+/telemetry")
        .build()
        .await
        .unwrap();
    harness.start().await.unwrap();

    assert!(!harness.broker.publish("devices/123/status", SAMPLE_PAYLOAD));
    assert!(harness.broker.publish("devices/9/telemetry", payload_for("9", 1)));
    assert!(harness.store.wait_for_rows(1, WAIT).await);
    assert_eq!(harness.store.row_count(), 1);

    harness.shutdown().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn rows_keep_broker_delivery_order() {
    let harness = PipelineHarness::builder().build().await.unwrap();
    harness.start().await.unwrap();

    for ts in 0..20 {
        harness
            .broker
            .publish("devices/7/telemetry", payload_for("7", ts));
    }
    assert!(harness.store.wait_for_rows(20, WAIT).await);

    let order: Vec<i64> = harness
        .store
        .rows()
        .iter()
        .map(|r| r.report().gps_ts)
        .collect();
    assert_eq!(order, (0..20).collect::<Vec<_>>());

    harness.shutdown().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn delivery_resumes_after_broker_drop() {
    let harness = PipelineHarness::builder()
        .with_reconnect_interval(Duration::from_secs(2))
        .build()
        .await
        .unwrap();
    let mut events = harness.manager.events();
    harness.start().await.unwrap();

    harness.broker.drop_connection("broker restarted");
    wait_for_event(&mut events, WAIT, |e| {
        matches!(e, SessionEvent::ConnectionLost { .. })
    })
    .await
    .expect("loss observed");
    wait_for_event(&mut events, WAIT, |e| {
        matches!(e, SessionEvent::Subscribed { .. })
    })
    .await
    .expect("resubscribed");

    assert_eq!(harness.broker.connections(), 2);
    assert!(harness.broker.publish("devices/1/telemetry", payload_for("1", 42)));
    assert!(harness.store.wait_for_rows(1, WAIT).await);

    harness.shutdown().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn storage_outage_drops_messages_but_not_the_session() {
    let store = MemoryStore::new();
    let harness = PipelineHarness::builder()
        .with_store(store.clone())
        .build()
        .await
        .unwrap();
    harness.start().await.unwrap();

    store.fail_inserts(true);
    harness.broker.publish("devices/1/telemetry", payload_for("1", 1));
    harness.broker.publish("devices/1/telemetry", payload_for("1", 2));
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(store.row_count(), 0);
    assert_eq!(store.insert_attempts(), 2);
    assert_eq!(harness.manager.state(), SessionState::Connected);

    store.fail_inserts(false);
    harness.broker.publish("devices/1/telemetry", payload_for("1", 3));
    assert!(store.wait_for_rows(1, WAIT).await);
    assert_eq!(store.rows()[0].report().gps_ts, 3);

    harness.shutdown().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn malformed_payloads_are_skipped_between_good_ones() {
    let harness = PipelineHarness::builder().build().await.unwrap();
    harness.start().await.unwrap();

    harness.broker.publish("devices/1/telemetry", payload_for("1", 1));
    harness.broker.publish("devices/1/telemetry", b"not json".to_vec());
    harness.broker.publish("devices/1/telemetry", payload_for("1", 2));
    assert!(harness.store.wait_for_rows(2, WAIT).await);
    assert_eq!(harness.store.insert_attempts(), 2);

    harness.shutdown().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn shutdown_disconnects_then_closes_storage() {
    let harness = PipelineHarness::builder().build().await.unwrap();
    harness.start().await.unwrap();

    harness.shutdown().await.unwrap();

    assert!(harness.broker.disconnect_requested());
    assert_eq!(harness.manager.state(), SessionState::Disconnected);
    assert!(harness.store.is_closed());
    assert!(!harness.broker.publish("devices/1/telemetry", SAMPLE_PAYLOAD));
}
