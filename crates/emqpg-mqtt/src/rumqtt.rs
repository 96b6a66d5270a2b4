// SPDX-FileCopyrightText: 2026 Emqpg Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `rumqttc`-backed transport.

use async_trait::async_trait;
use rumqttc::{
    AsyncClient, ConnectReturnCode, ConnectionError, Event, EventLoop, MqttOptions, Outgoing,
    Packet, QoS, SubscribeReasonCode, Transport,
};
use secrecy::{ExposeSecret, SecretString};

use emqpg_config::BrokerConfig;
use emqpg_core::EmqpgError;

use crate::transport::{SessionClient, SessionTransport, TransportError, TransportEvent};

/// Capacity of the request channel between client and event loop.
const REQUEST_CAPACITY: usize = 64;

/// Returns the configured client id, or a fresh `emqpg-<uuid>`.
pub fn resolve_client_id(config: &BrokerConfig) -> String {
    let configured = config.client_id.trim();
    if configured.is_empty() {
        format!("emqpg-{}", uuid::Uuid::new_v4())
    } else {
        configured.to_string()
    }
}

/// Builds `rumqttc` options from the broker section.
///
/// Reads `broker.tls.ca_file` when TLS is in effect; without one the
/// platform root store is trusted.
pub fn mqtt_options(config: &BrokerConfig, client_id: &str) -> Result<MqttOptions, EmqpgError> {
    let endpoint = config.endpoint().map_err(EmqpgError::Config)?;

    let mut options = MqttOptions::new(client_id, endpoint.host, endpoint.port);
    options.set_keep_alive(config.keep_alive());
    options.set_clean_session(config.clean_session);

    if let Some(username) = &config.username {
        let password = SecretString::from(config.password.clone().unwrap_or_default());
        options.set_credentials(username.as_str(), password.expose_secret());
    }

    if endpoint.tls {
        let transport = match &config.tls.ca_file {
            Some(path) => {
                let ca = std::fs::read(path).map_err(|e| {
                    EmqpgError::Config(format!("cannot read broker.tls.ca_file `{path}`: {e}"))
                })?;
                Transport::tls(ca, None, None)
            }
            None => Transport::tls_with_default_config(),
        };
        options.set_transport(transport);
    }

    Ok(options)
}

/// Creates a connected client/transport pair. No I/O happens until polled.
pub fn session(options: MqttOptions) -> (RumqttClient, RumqttTransport) {
    let (client, eventloop) = AsyncClient::new(options, REQUEST_CAPACITY);
    (RumqttClient { client }, RumqttTransport { eventloop })
}

pub struct RumqttClient {
    client: AsyncClient,
}

impl SessionClient for RumqttClient {
    fn subscribe(&self, topic: &str, qos: QoS) -> Result<(), TransportError> {
        self.client
            .try_subscribe(topic, qos)
            .map_err(|e| TransportError::Request(e.to_string()))
    }

    fn disconnect(&self) -> Result<(), TransportError> {
        self.client
            .try_disconnect()
            .map_err(|e| TransportError::Request(e.to_string()))
    }
}

pub struct RumqttTransport {
    eventloop: EventLoop,
}

#[async_trait]
impl SessionTransport for RumqttTransport {
    async fn poll(&mut self) -> Result<TransportEvent, TransportError> {
        let event = self.eventloop.poll().await.map_err(map_connection_error)?;
        Ok(map_event(event))
    }
}

fn map_event(event: Event) -> TransportEvent {
    match event {
        Event::Incoming(Packet::ConnAck(ack)) => TransportEvent::Connected {
            session_present: ack.session_present,
        },
        Event::Incoming(Packet::Publish(publish)) => TransportEvent::Message {
            topic: publish.topic,
            payload: publish.payload.to_vec(),
        },
        Event::Incoming(Packet::SubAck(ack)) => TransportEvent::SubscribeAck {
            granted: ack
                .return_codes
                .iter()
                .all(|code| matches!(code, SubscribeReasonCode::Success(_))),
        },
        Event::Outgoing(Outgoing::Disconnect) => TransportEvent::Closed,
        _ => TransportEvent::Idle,
    }
}

fn map_connection_error(err: ConnectionError) -> TransportError {
    match err {
        ConnectionError::ConnectionRefused(code) => TransportError::Refused {
            auth: matches!(
                code,
                ConnectReturnCode::BadUserNamePassword
                    | ConnectReturnCode::NotAuthorized
                    | ConnectReturnCode::BadClientId
            ),
            code: format!("{code:?}"),
        },
        other => TransportError::Network(other.to_string()),
    }
}
