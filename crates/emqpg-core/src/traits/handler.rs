// SPDX-FileCopyrightText: 2026 Emqpg Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The per-message capability consumed by the dispatcher.

use async_trait::async_trait;

use crate::error::EmqpgError;

/// Handles one inbound broker message.
///
/// Implementations may be called concurrently and must not assume any
/// serialization between calls. A returned error is logged by the caller
/// and the message is dropped; it is never redelivered.
#[async_trait]
pub trait MessageHandler: Send + Sync + 'static {
    async fn handle(&self, topic: &str, payload: &[u8]) -> Result<(), EmqpgError>;
}
