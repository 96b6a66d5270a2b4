// SPDX-FileCopyrightText: 2026 Emqpg Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test utilities for emqpg integration tests.
//!
//! Provides broker and storage doubles plus a wired pipeline harness for
//! fast, deterministic tests without a broker or a database.
//!
//! # Components
//!
//! - [`MockBroker`] - Scripted broker with connection drops and subscription tracking
//! - [`MemoryStore`] - Record store with failure and latency injection
//! - [`RecordingHandler`] - Message handler that captures deliveries
//! - [`PipelineHarness`] - Session manager plus sink over the doubles above

pub mod harness;
pub mod memory_store;
pub mod mock_broker;
pub mod recording_handler;

pub use harness::{PipelineHarness, SAMPLE_PAYLOAD, broker_config, payload_for, wait_for_event};
pub use memory_store::MemoryStore;
pub use mock_broker::{MockBroker, MockClient, MockTransport};
pub use recording_handler::RecordingHandler;
