// SPDX-FileCopyrightText: 2026 Emqpg Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! MQTT side of the emqpg ingestion pipeline.
//!
//! [`ConnectionManager`] keeps one broker session alive and subscribed;
//! [`MessageDispatcher`] forwards each inbound message to a
//! [`MessageHandler`](emqpg_core::MessageHandler). The wire client sits
//! behind [`SessionClient`] and [`SessionTransport`] so the state machine
//! can be driven by a scripted broker in tests.

pub mod dispatcher;
pub mod manager;
pub mod rumqtt;
pub mod transport;

pub use dispatcher::MessageDispatcher;
pub use manager::ConnectionManager;
pub use transport::{QoS, SessionClient, SessionTransport, TransportError, TransportEvent};
