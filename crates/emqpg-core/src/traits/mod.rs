// SPDX-FileCopyrightText: 2026 Emqpg Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Capability traits connecting the broker session to the storage sink.
//!
//! All traits use `#[async_trait]` for dynamic dispatch compatibility.

pub mod adapter;
pub mod handler;
pub mod storage;

pub use adapter::PluginAdapter;
pub use handler::MessageHandler;
pub use storage::{RecordStore, StorageAdapter};
