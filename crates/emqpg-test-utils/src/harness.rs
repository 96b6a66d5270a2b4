// SPDX-FileCopyrightText: 2026 Emqpg Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! End-to-end pipeline harness.
//!
//! `PipelineHarness` wires a [`ConnectionManager`] over a [`MockBroker`]
//! to a [`TelemetrySink`] over a [`MemoryStore`]: the production pipeline
//! minus the network and the database.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;

use emqpg_config::{BrokerConfig, PostgresConfig};
use emqpg_core::{EmqpgError, MessageHandler, SessionEvent, StorageAdapter};
use emqpg_mqtt::ConnectionManager;
use emqpg_storage::{SinkOptions, TelemetrySink};

use crate::memory_store::MemoryStore;
use crate::mock_broker::MockBroker;

/// The sample device report used across pipeline tests.
pub const SAMPLE_PAYLOAD: &str = r#"{"imei":"123","lat":1.5,"lng":2.5,"gps_ts":1000,"uptime":50,"csq":20,"vbat":380,"up_vbat":390,"ip":"10.0.0.1"}"#;

/// Builds a valid payload for device `imei`.
pub fn payload_for(imei: &str, gps_ts: i64) -> Vec<u8> {
    serde_json::json!({
        "imei": imei,
        "lat": 52.52,
        "lng": 13.405,
        "gps_ts": gps_ts,
        "uptime": 3600,
        "csq": 18,
        "vbat": 371,
        "up_vbat": 402,
        "ip": "10.0.0.7",
    })
    .to_string()
    .into_bytes()
}

/// Broker settings pointing at nothing, for use with mock transports.
pub fn broker_config(topic: &str) -> BrokerConfig {
    BrokerConfig {
        address: "tcp://mock-broker:1883".into(),
        client_id: "emqpg-test".into(),
        topic: topic.into(),
        ..BrokerConfig::default()
    }
}

/// Builder for creating pipeline harnesses with configurable options.
pub struct PipelineHarnessBuilder {
    broker: BrokerConfig,
    sink: SinkOptions,
    store: MemoryStore,
    mock: MockBroker,
}

impl PipelineHarnessBuilder {
    fn new() -> Self {
        Self {
            broker: broker_config("devices/+/telemetry"),
            sink: SinkOptions::from(&PostgresConfig::default()),
            store: MemoryStore::new(),
            mock: MockBroker::new(),
        }
    }

    pub fn with_topic(mut self, topic: &str) -> Self {
        self.broker.topic = topic.to_string();
        self
    }

    pub fn with_reconnect_interval(mut self, interval: Duration) -> Self {
        self.broker.reconnect_interval_secs = interval.as_secs().max(1);
        self
    }

    pub fn with_insert_timeout(mut self, timeout: Duration) -> Self {
        self.sink.insert_timeout = timeout;
        self
    }

    /// Use a pre-configured store, e.g. one with latency injected.
    pub fn with_store(mut self, store: MemoryStore) -> Self {
        self.store = store;
        self
    }

    /// Use a pre-configured broker, e.g. one that refuses connections.
    pub fn with_broker(mut self, broker: MockBroker) -> Self {
        self.mock = broker;
        self
    }

    /// Opens the sink and builds the manager. Does not connect.
    pub async fn build(self) -> Result<PipelineHarness, EmqpgError> {
        let sink = Arc::new(TelemetrySink::open_with(self.store.clone(), self.sink).await?);
        let (client, transport) = self.mock.session();
        let handler: Arc<dyn MessageHandler> = sink.clone();
        let manager = ConnectionManager::with_transport(
            &self.broker,
            self.broker.client_id.clone(),
            handler,
            client,
            transport,
        )?;

        Ok(PipelineHarness {
            broker: self.mock,
            store: self.store,
            sink,
            manager,
        })
    }
}

/// A fully wired pipeline over test doubles.
pub struct PipelineHarness {
    pub broker: MockBroker,
    pub store: MemoryStore,
    pub sink: Arc<TelemetrySink<MemoryStore>>,
    pub manager: ConnectionManager,
}

impl PipelineHarness {
    pub fn builder() -> PipelineHarnessBuilder {
        PipelineHarnessBuilder::new()
    }

    /// Connects and waits for the subscription to be granted.
    pub async fn start(&self) -> Result<(), EmqpgError> {
        let mut events = self.manager.events();
        self.manager.connect().await?;
        wait_for_event(&mut events, Duration::from_secs(5), |e| {
            matches!(e, SessionEvent::Subscribed { .. })
        })
        .await
        .ok_or_else(|| EmqpgError::Internal("subscription was not granted".into()))?;
        Ok(())
    }

    /// Disconnects the session, then closes the sink.
    pub async fn shutdown(&self) -> Result<(), EmqpgError> {
        self.manager.disconnect().await?;
        self.sink.close().await
    }
}

/// Receives events until one satisfies `predicate`, or `within` elapses.
pub async fn wait_for_event(
    events: &mut broadcast::Receiver<SessionEvent>,
    within: Duration,
    predicate: impl Fn(&SessionEvent) -> bool,
) -> Option<SessionEvent> {
    tokio::time::timeout(within, async {
        loop {
            match events.recv().await {
                Ok(event) if predicate(&event) => return Some(event),
                Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    })
    .await
    .ok()
    .flatten()
}
