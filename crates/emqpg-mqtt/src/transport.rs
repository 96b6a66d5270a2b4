// SPDX-FileCopyrightText: 2026 Emqpg Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The seam between the session state machine and the MQTT wire client.
//!
//! A transport is split the way `rumqttc` splits it: a [`SessionClient`]
//! that queues requests and a [`SessionTransport`] that must be polled to
//! make progress. Polling again after an error reconnects.

use async_trait::async_trait;
use thiserror::Error;

pub use rumqttc::QoS;

/// What one poll of the transport produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// The broker acknowledged a (re)connection.
    Connected { session_present: bool },
    /// An application message arrived.
    Message { topic: String, payload: Vec<u8> },
    /// The broker answered a subscribe request.
    SubscribeAck { granted: bool },
    /// Our DISCONNECT was flushed.
    Closed,
    /// Protocol traffic with no pipeline meaning (pings, acks).
    Idle,
}

/// A failed poll. The next poll starts a fresh connection attempt.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    /// The broker answered CONNECT with a refusal code.
    #[error("connection refused by broker: {code}")]
    Refused {
        code: String,
        /// The refusal concerns credentials or client identity.
        auth: bool,
    },

    /// Socket, TLS or protocol failure.
    #[error("{0}")]
    Network(String),

    /// The request queue towards the event loop is closed or full.
    #[error("request not queued: {0}")]
    Request(String),
}

/// Drives the connection. Owned by exactly one task.
#[async_trait]
pub trait SessionTransport: Send + 'static {
    async fn poll(&mut self) -> Result<TransportEvent, TransportError>;
}

/// Queues requests for the transport without waiting on the network.
pub trait SessionClient: Send + Sync + 'static {
    fn subscribe(&self, topic: &str, qos: QoS) -> Result<(), TransportError>;

    fn disconnect(&self) -> Result<(), TransportError>;
}

/// Maps a configured QoS level onto the wire enum.
pub fn qos_from_level(level: u8) -> Option<QoS> {
    match level {
        0 => Some(QoS::AtMostOnce),
        1 => Some(QoS::AtLeastOnce),
        2 => Some(QoS::ExactlyOnce),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn qos_levels() {
        assert_eq!(qos_from_level(0), Some(QoS::AtMostOnce));
        assert_eq!(qos_from_level(1), Some(QoS::AtLeastOnce));
        assert_eq!(qos_from_level(2), Some(QoS::ExactlyOnce));
        assert_eq!(qos_from_level(3), None);
    }

    #[test]
    fn refused_error_names_code() {
        let err = TransportError::Refused {
            code: "BadUserNamePassword".into(),
            auth: true,
        };
        assert_eq!(
            err.to_string(),
            "connection refused by broker: BadUserNamePassword"
        );
    }
}
