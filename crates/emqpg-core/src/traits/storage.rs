// SPDX-FileCopyrightText: 2026 Emqpg Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Storage adapter trait for persistence backends.

use async_trait::async_trait;

use crate::error::EmqpgError;
use crate::traits::adapter::PluginAdapter;
use crate::types::TelemetryRecord;

/// Adapter for the backing store that telemetry rows land in.
///
/// Opening is backend-specific and happens in the constructor; the trait
/// only covers what the process lifecycle needs afterwards.
#[async_trait]
pub trait StorageAdapter: PluginAdapter {
    /// Releases pooled connections. Idempotent; in-flight writes may be abandoned.
    async fn close(&self) -> Result<(), EmqpgError>;
}

/// Row-level persistence for telemetry records.
///
/// The sink owns decoding, stamping and timeouts; a store only writes rows.
/// Implementations must tolerate concurrent `insert` calls.
#[async_trait]
pub trait RecordStore: Send + Sync + 'static {
    /// Appends one row. Errors surface as `StoragePersistFailed`.
    async fn insert(&self, record: &TelemetryRecord) -> Result<(), EmqpgError>;

    /// Round-trips a trivial query to prove the store is reachable.
    async fn ping(&self) -> Result<(), EmqpgError>;

    /// Releases underlying connections.
    async fn close(&self);
}
