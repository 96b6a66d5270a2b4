// SPDX-FileCopyrightText: 2026 Emqpg Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Message handler that captures what it was given.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Notify;

use emqpg_core::{EmqpgError, MessageHandler};

/// Records every `(topic, payload)` pair, optionally failing or stalling each call.
#[derive(Default)]
pub struct RecordingHandler {
    received: Mutex<Vec<(String, Vec<u8>)>>,
    fail: bool,
    stall: Option<Duration>,
    notify: Notify,
}

impl RecordingHandler {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// A handler that records and then returns `StoragePersistFailed`.
    pub fn failing() -> Arc<Self> {
        Arc::new(Self {
            fail: true,
            ..Self::default()
        })
    }

    /// A handler that records and then sleeps for `stall`, like an insert
    /// against a database that stopped answering.
    pub fn stalling(stall: Duration) -> Arc<Self> {
        Arc::new(Self {
            stall: Some(stall),
            ..Self::default()
        })
    }

    fn guard(&self) -> MutexGuard<'_, Vec<(String, Vec<u8>)>> {
        self.received
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn received(&self) -> Vec<(String, Vec<u8>)> {
        self.guard().clone()
    }

    pub fn count(&self) -> usize {
        self.guard().len()
    }

    /// Waits until at least `count` messages arrived. Returns `false` on timeout.
    pub async fn wait_for(&self, count: usize, within: Duration) -> bool {
        tokio::time::timeout(within, async {
            loop {
                let notified = self.notify.notified();
                if self.count() >= count {
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
impl MessageHandler for RecordingHandler {
    async fn handle(&self, topic: &str, payload: &[u8]) -> Result<(), EmqpgError> {
        self.guard().push((topic.to_string(), payload.to_vec()));
        self.notify.notify_waiters();
        if let Some(stall) = self.stall {
            tokio::time::sleep(stall).await;
        }
        if self.fail {
            return Err(EmqpgError::StoragePersistFailed {
                source: "recording handler set to fail".into(),
            });
        }
        Ok(())
    }
}
