// SPDX-FileCopyrightText: 2026 Emqpg Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `emqpg serve` command implementation.
//!
//! Opens the storage sink, connects the broker session with the sink as its
//! handler, and runs until a shutdown signal arrives.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use emqpg_config::EmqpgConfig;
use emqpg_core::{EmqpgError, MessageHandler, StorageAdapter};
use emqpg_mqtt::ConnectionManager;
use emqpg_storage::TelemetrySink;

use crate::shutdown;

/// Runs the ingestion service until SIGINT or SIGTERM.
pub async fn run_serve(config: EmqpgConfig) -> Result<(), EmqpgError> {
    info!(version = env!("CARGO_PKG_VERSION"), "emqpg starting");
    info!(
        broker = %config.broker.address,
        topic = %config.broker.topic,
        qos = config.broker.qos,
        database = %config.postgres.database,
        table = %config.postgres.table,
        "configuration loaded"
    );

    let sink = Arc::new(TelemetrySink::open(&config.postgres).await?);
    let handler: Arc<dyn MessageHandler> = sink.clone();

    let manager = match ConnectionManager::new(&config.broker, handler) {
        Ok(manager) => manager,
        Err(e) => {
            release(sink.as_ref()).await;
            return Err(e);
        }
    };

    run_pipeline(&manager, sink.as_ref(), shutdown::install_signal_handler()).await
}

/// Connects the session, waits for `shutdown`, then stops the session before
/// releasing storage.
///
/// Storage is released on every exit path, including a failed connect.
pub async fn run_pipeline(
    manager: &ConnectionManager,
    storage: &dyn StorageAdapter,
    shutdown: CancellationToken,
) -> Result<(), EmqpgError> {
    if let Err(e) = manager.connect().await {
        release(storage).await;
        return Err(e);
    }
    info!(
        client_id = manager.client_id(),
        topic = manager.topic(),
        "pipeline ready"
    );

    shutdown.cancelled().await;
    info!("shutting down");

    let disconnected = manager.disconnect().await;
    release(storage).await;
    disconnected?;

    info!("shutdown complete");
    Ok(())
}

/// Closes storage, logging rather than returning a failure.
pub(crate) async fn release(storage: &dyn StorageAdapter) {
    if let Err(e) = storage.close().await {
        warn!(error = %e, "storage close failed");
    }
}

/// Initializes the global tracing subscriber.
///
/// `RUST_LOG` takes precedence over the configured level.
pub fn init_tracing(log_level: &str) {
    use tracing_subscriber::EnvFilter;

    // Directive targets match by prefix, so `emqpg` also covers `emqpg_*` crates.
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("emqpg={log_level},warn")));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_names(false)
        .init();
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use async_trait::async_trait;
    use emqpg_core::{HealthStatus, PluginAdapter, SessionEvent, SessionState};
    use emqpg_mqtt::TransportError;
    use emqpg_storage::SinkOptions;
    use emqpg_test_utils::{MemoryStore, MockBroker, SAMPLE_PAYLOAD, broker_config, wait_for_event};
    use tracing_test::traced_test;

    use super::*;

    const TOPIC: &str = "devices/+/telemetry";

    async fn pipeline(
        broker: &MockBroker,
        store: &MemoryStore,
    ) -> (Arc<ConnectionManager>, Arc<TelemetrySink<MemoryStore>>) {
        let sink = Arc::new(
            TelemetrySink::open_with(store.clone(), SinkOptions::default())
                .await
                .unwrap(),
        );
        let (client, transport) = broker.session();
        let manager = ConnectionManager::with_transport(
            &broker_config(TOPIC),
            "emqpg-test",
            sink.clone(),
            client,
            transport,
        )
        .unwrap();
        (Arc::new(manager), sink)
    }

    #[tokio::test(start_paused = true)]
    async fn pipeline_stores_rows_until_shutdown() {
        let broker = MockBroker::new();
        let store = MemoryStore::new();
        let (manager, sink) = pipeline(&broker, &store).await;
        let mut events = manager.events();
        let token = CancellationToken::new();

        let task = {
            let manager = manager.clone();
            let sink = sink.clone();
            let token = token.clone();
            tokio::spawn(async move { run_pipeline(&manager, sink.as_ref(), token).await })
        };

        wait_for_event(&mut events, Duration::from_secs(5), |e| {
            matches!(e, SessionEvent::Subscribed { .. })
        })
        .await
        .expect("subscribed");

        assert!(broker.publish("devices/123/telemetry", SAMPLE_PAYLOAD));
        assert!(store.wait_for_rows(1, Duration::from_secs(5)).await);

        token.cancel();
        task.await.unwrap().unwrap();

        assert_eq!(manager.state(), SessionState::Disconnected);
        assert!(broker.disconnect_requested());
        assert!(sink.is_closed());
        assert!(store.is_closed());
    }

    #[tokio::test(start_paused = true)]
    async fn failed_connect_releases_storage() {
        let broker = MockBroker::new();
        broker.refuse_connections(TransportError::Network("connection refused".into()));
        let store = MemoryStore::new();
        let (manager, sink) = pipeline(&broker, &store).await;

        let err = run_pipeline(&manager, sink.as_ref(), CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(err, EmqpgError::BrokerUnreachable { .. }));
        assert!(store.is_closed());
        assert_eq!(store.row_count(), 0);
    }

    struct StuckPool;

    #[async_trait]
    impl PluginAdapter for StuckPool {
        fn name(&self) -> &str {
            "stuck"
        }

        async fn health_check(&self) -> Result<HealthStatus, EmqpgError> {
            Ok(HealthStatus::Healthy)
        }
    }

    #[async_trait]
    impl StorageAdapter for StuckPool {
        async fn close(&self) -> Result<(), EmqpgError> {
            Err(EmqpgError::Internal("pool refused to close".into()))
        }
    }

    #[tokio::test]
    #[traced_test]
    async fn close_failure_is_logged_not_returned() {
        release(&StuckPool).await;

        assert!(logs_contain("storage close failed"));
        assert!(logs_contain("pool refused to close"));
    }
}
