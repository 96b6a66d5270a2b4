// SPDX-FileCopyrightText: 2026 Emqpg Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types for the emqpg ingestion pipeline.

use std::time::Duration;

use thiserror::Error;

/// The primary error type used across the pipeline crates.
///
/// Only the startup-time variants (`BrokerUnreachable`, `AuthenticationFailed`,
/// `StorageUnavailable`, `Config`) are ever allowed to abort the process.
/// Everything raised while messages are flowing is logged and absorbed.
#[derive(Debug, Error)]
pub enum EmqpgError {
    /// Configuration rejected before the pipeline starts.
    #[error("configuration error: {0}")]
    Config(String),

    /// The initial broker connection could not be established.
    #[error("broker {broker} unreachable: {message}")]
    BrokerUnreachable { broker: String, message: String },

    /// The broker refused the supplied credentials or client identity.
    #[error("authentication with broker {broker} failed: {reason}")]
    AuthenticationFailed { broker: String, reason: String },

    /// An established session dropped; background reconnection takes over.
    #[error("connection lost: {message}")]
    ConnectionLost { message: String },

    /// The topic subscription was not accepted.
    #[error("subscribe to `{topic}` failed: {message}")]
    SubscribeFailed { topic: String, message: String },

    /// A payload did not match the telemetry JSON shape.
    #[error("malformed payload on `{topic}`: {source}")]
    PayloadMalformed {
        topic: String,
        source: serde_json::Error,
    },

    /// A decoded record could not be written.
    #[error("failed to persist record: {source}")]
    StoragePersistFailed {
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// The database could not be reached or failed its liveness check.
    #[error("storage unavailable: {source}")]
    StorageUnavailable {
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Operation timed out.
    #[error("operation timed out after {duration:?}")]
    Timeout { duration: Duration },

    /// Internal or unexpected errors.
    #[error("internal error: {0}")]
    Internal(String),
}
