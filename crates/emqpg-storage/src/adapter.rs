// SPDX-FileCopyrightText: 2026 Emqpg Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Storage sink: decodes inbound payloads and appends them as rows.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use emqpg_config::PostgresConfig;
use emqpg_core::{
    DeviceReport, EmqpgError, HealthStatus, MessageHandler, PluginAdapter, RecordStore,
    StorageAdapter, TelemetryRecord,
};

use crate::database::Database;

/// How long `close()` waits for the store before abandoning in-flight writes.
const CLOSE_GRACE: Duration = Duration::from_secs(1);

/// Timeouts applied by the sink around its store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SinkOptions {
    /// Ceiling on opening the store and on every liveness check.
    pub connect_timeout: Duration,
    /// Ceiling on each single-row insert.
    pub insert_timeout: Duration,
}

impl Default for SinkOptions {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            insert_timeout: Duration::from_secs(5),
        }
    }
}

impl From<&PostgresConfig> for SinkOptions {
    fn from(config: &PostgresConfig) -> Self {
        Self {
            connect_timeout: config.connect_timeout(),
            insert_timeout: config.insert_timeout(),
        }
    }
}

/// The pipeline's message handler, backed by a [`RecordStore`].
///
/// Malformed payloads are skipped with a warning and reported as success.
/// Insert failures surface as `StoragePersistFailed` and are never retried.
pub struct TelemetrySink<S: RecordStore = Database> {
    store: S,
    options: SinkOptions,
    closed: AtomicBool,
}

impl TelemetrySink<Database> {
    /// Connects to PostgreSQL and proves the pool is usable.
    ///
    /// Fails with `StorageUnavailable` if the database cannot be reached
    /// within `connect_timeout`.
    pub async fn open(config: &PostgresConfig) -> Result<Self, EmqpgError> {
        let options = SinkOptions::from(config);
        let database = timeout(options.connect_timeout, Database::connect(config))
            .await
            .map_err(|_| timed_out_unavailable(options.connect_timeout))??;

        let sink = Self::open_with(database, options).await?;
        info!(
            host = %config.host,
            port = config.port,
            database = %config.database,
            table = %config.table,
            "storage connected"
        );
        Ok(sink)
    }
}

impl<S: RecordStore> TelemetrySink<S> {
    /// Wraps an already-built store after a bounded liveness check.
    ///
    /// The store is closed again if the check fails.
    pub async fn open_with(store: S, options: SinkOptions) -> Result<Self, EmqpgError> {
        if let Err(e) = ping_within(&store, options.connect_timeout).await {
            store.close().await;
            return Err(e);
        }

        Ok(Self {
            store,
            options,
            closed: AtomicBool::new(false),
        })
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    async fn persist(&self, record: &TelemetryRecord) -> Result<(), EmqpgError> {
        match timeout(self.options.insert_timeout, self.store.insert(record)).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e @ EmqpgError::StoragePersistFailed { .. })) => Err(e),
            Ok(Err(other)) => Err(EmqpgError::StoragePersistFailed {
                source: Box::new(other),
            }),
            Err(_) => Err(EmqpgError::StoragePersistFailed {
                source: Box::new(EmqpgError::Timeout {
                    duration: self.options.insert_timeout,
                }),
            }),
        }
    }
}

async fn ping_within<S: RecordStore>(store: &S, limit: Duration) -> Result<(), EmqpgError> {
    match timeout(limit, store.ping()).await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e @ EmqpgError::StorageUnavailable { .. })) => Err(e),
        Ok(Err(other)) => Err(EmqpgError::StorageUnavailable {
            source: Box::new(other),
        }),
        Err(_) => Err(timed_out_unavailable(limit)),
    }
}

fn timed_out_unavailable(duration: Duration) -> EmqpgError {
    EmqpgError::StorageUnavailable {
        source: Box::new(EmqpgError::Timeout { duration }),
    }
}

#[async_trait]
impl<S: RecordStore> MessageHandler for TelemetrySink<S> {
    async fn handle(&self, topic: &str, payload: &[u8]) -> Result<(), EmqpgError> {
        if self.is_closed() {
            return Err(EmqpgError::StoragePersistFailed {
                source: "storage sink is closed".into(),
            });
        }

        let report = match DeviceReport::decode(payload) {
            Ok(report) => report,
            Err(source) => {
                let err = EmqpgError::PayloadMalformed {
                    topic: topic.to_string(),
                    source,
                };
                warn!(topic, bytes = payload.len(), error = %err, "skipping malformed payload");
                return Ok(());
            }
        };

        let record = TelemetryRecord::stamp(report, Utc::now());
        self.persist(&record).await?;

        let report = record.report();
        debug!(imei = %report.imei, lat = report.lat, lng = report.lng, "record stored");
        Ok(())
    }
}

#[async_trait]
impl<S: RecordStore> PluginAdapter for TelemetrySink<S> {
    fn name(&self) -> &str {
        "postgres"
    }

    async fn health_check(&self) -> Result<HealthStatus, EmqpgError> {
        if self.is_closed() {
            return Ok(HealthStatus::Unhealthy("sink is closed".into()));
        }

        Ok(match ping_within(&self.store, self.options.connect_timeout).await {
            Ok(()) => HealthStatus::Healthy,
            Err(e) => HealthStatus::Unhealthy(e.to_string()),
        })
    }
}

#[async_trait]
impl<S: RecordStore> StorageAdapter for TelemetrySink<S> {
    async fn close(&self) -> Result<(), EmqpgError> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }

        if timeout(CLOSE_GRACE, self.store.close()).await.is_err() {
            warn!(grace = ?CLOSE_GRACE, "storage close timed out, abandoning in-flight writes");
        }
        info!("storage closed");
        Ok(())
    }
}
