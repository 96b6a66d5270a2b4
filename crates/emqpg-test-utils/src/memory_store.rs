// SPDX-FileCopyrightText: 2026 Emqpg Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! In-memory record store with failure and latency injection.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Notify;

use emqpg_core::{EmqpgError, RecordStore, TelemetryRecord};

#[derive(Default)]
struct StoreInner {
    rows: Mutex<Vec<TelemetryRecord>>,
    latency: Mutex<Option<Duration>>,
    failing: AtomicBool,
    unreachable: AtomicBool,
    closed: AtomicBool,
    attempts: AtomicUsize,
    notify: Notify,
}

/// A [`RecordStore`] that keeps rows in a vector.
///
/// Clones share the same rows, so a test can keep one handle while the
/// sink owns another.
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<StoreInner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn rows_guard(&self) -> MutexGuard<'_, Vec<TelemetryRecord>> {
        self.inner
            .rows
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn latency(&self) -> Option<Duration> {
        *self
            .inner
            .latency
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn rows(&self) -> Vec<TelemetryRecord> {
        self.rows_guard().clone()
    }

    pub fn row_count(&self) -> usize {
        self.rows_guard().len()
    }

    /// Insert calls seen, failed ones included.
    pub fn insert_attempts(&self) -> usize {
        self.inner.attempts.load(Ordering::SeqCst)
    }

    /// Make every insert fail with `StoragePersistFailed`.
    pub fn fail_inserts(&self, failing: bool) {
        self.inner.failing.store(failing, Ordering::SeqCst);
    }

    /// Make every ping fail with `StorageUnavailable`.
    pub fn set_unreachable(&self, unreachable: bool) {
        self.inner.unreachable.store(unreachable, Ordering::SeqCst);
    }

    /// Delay every insert and ping.
    pub fn set_latency(&self, latency: Duration) {
        *self
            .inner
            .latency
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(latency);
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }

    /// Waits until at least `count` rows exist. Returns `false` on timeout.
    pub async fn wait_for_rows(&self, count: usize, within: Duration) -> bool {
        tokio::time::timeout(within, async {
            loop {
                let notified = self.inner.notify.notified();
                if self.row_count() >= count {
                    return;
                }
                notified.await;
            }
        })
        .await
        .is_ok()
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn insert(&self, record: &TelemetryRecord) -> Result<(), EmqpgError> {
        self.inner.attempts.fetch_add(1, Ordering::SeqCst);
        if let Some(latency) = self.latency() {
            tokio::time::sleep(latency).await;
        }
        if self.inner.failing.load(Ordering::SeqCst) {
            return Err(EmqpgError::StoragePersistFailed {
                source: "injected insert failure".into(),
            });
        }

        self.rows_guard().push(record.clone());
        self.inner.notify.notify_waiters();
        Ok(())
    }

    async fn ping(&self) -> Result<(), EmqpgError> {
        if let Some(latency) = self.latency() {
            tokio::time::sleep(latency).await;
        }
        if self.inner.unreachable.load(Ordering::SeqCst) {
            return Err(EmqpgError::StorageUnavailable {
                source: "injected: database unreachable".into(),
            });
        }
        Ok(())
    }

    async fn close(&self) {
        self.inner.closed.store(true, Ordering::SeqCst);
    }
}
