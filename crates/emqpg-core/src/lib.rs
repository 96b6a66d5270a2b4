// SPDX-FileCopyrightText: 2026 Emqpg Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core library for the emqpg ingestion pipeline.
//!
//! This crate provides the error taxonomy, the telemetry and session types,
//! and the capability traits that connect the broker session to the storage
//! sink. The broker and storage crates both build on it; neither depends on
//! the other.

pub mod error;
pub mod traits;
pub mod types;

// Re-export key items at crate root for ergonomic imports.
pub use error::EmqpgError;
pub use types::{DeviceReport, HealthStatus, SessionEvent, SessionState, TelemetryRecord};

pub use traits::{MessageHandler, PluginAdapter, RecordStore, StorageAdapter};
