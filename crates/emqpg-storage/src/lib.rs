// SPDX-FileCopyrightText: 2026 Emqpg Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! PostgreSQL persistence for the emqpg ingestion pipeline.
//!
//! [`TelemetrySink`] is the message handler handed to the broker session:
//! it decodes each payload, stamps the receive time and performs one
//! parameterized insert through a shared `sqlx` pool.

pub mod adapter;
pub mod database;
pub mod queries;

pub use adapter::{SinkOptions, TelemetrySink};
pub use database::Database;
