// SPDX-FileCopyrightText: 2026 Emqpg Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Broker session lifecycle: connect, reconnect, resubscribe, disconnect.
//!
//! One spawned driver task owns the transport and never waits on the
//! handler: inbound messages go through a bounded FIFO to a separate
//! delivery task, so keep-alives and the DISCONNECT keep flowing while an
//! insert is slow. On connection loss the driver retries at a fixed interval
//! until `disconnect()` is called.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::sync::{Mutex, broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use emqpg_config::BrokerConfig;
use emqpg_core::{EmqpgError, MessageHandler, SessionEvent, SessionState};

use crate::dispatcher::MessageDispatcher;
use crate::rumqtt;
use crate::transport::{
    QoS, SessionClient, SessionTransport, TransportError, TransportEvent, qos_from_level,
};

/// Upper bound on waiting for the DISCONNECT to flush.
const DISCONNECT_QUIESCE: Duration = Duration::from_secs(1);

const EVENT_CAPACITY: usize = 64;

/// Messages received but not yet handed to the handler. Overflow is dropped.
const DELIVERY_BACKLOG: usize = 1024;

/// Owns the broker session and keeps the topic subscription alive.
pub struct ConnectionManager {
    shared: Arc<Shared>,
    client_id: String,
    connect_timeout: Duration,
    pending: Mutex<Option<Box<dyn SessionTransport>>>,
    session: Mutex<Option<Driver>>,
}

struct Driver {
    handle: JoinHandle<()>,
    delivery: JoinHandle<()>,
    cancel: CancellationToken,
}

/// One inbound message queued for delivery.
struct Inbound {
    topic: String,
    payload: Vec<u8>,
}

/// State shared between the manager and its driver task.
struct Shared {
    broker: String,
    topic: String,
    qos: QoS,
    reconnect_interval: Duration,
    client: Box<dyn SessionClient>,
    dispatcher: MessageDispatcher,
    state: watch::Sender<SessionState>,
    events: broadcast::Sender<SessionEvent>,
    closing: AtomicBool,
}

impl ConnectionManager {
    /// Builds a manager over a `rumqttc` session. Nothing is sent until `connect()`.
    pub fn new(
        config: &BrokerConfig,
        handler: Arc<dyn MessageHandler>,
    ) -> Result<Self, EmqpgError> {
        let client_id = rumqtt::resolve_client_id(config);
        let options = rumqtt::mqtt_options(config, &client_id)?;
        let (client, transport) = rumqtt::session(options);
        Self::with_transport(config, client_id, handler, client, transport)
    }

    /// Builds a manager over any transport pair.
    pub fn with_transport(
        config: &BrokerConfig,
        client_id: impl Into<String>,
        handler: Arc<dyn MessageHandler>,
        client: impl SessionClient,
        transport: impl SessionTransport,
    ) -> Result<Self, EmqpgError> {
        let qos = qos_from_level(config.qos)
            .ok_or_else(|| EmqpgError::Config(format!("invalid qos level {}", config.qos)))?;
        let (state, _) = watch::channel(SessionState::Disconnected);
        let (events, _) = broadcast::channel(EVENT_CAPACITY);

        Ok(Self {
            shared: Arc::new(Shared {
                broker: config.address.trim().to_string(),
                topic: config.topic.clone(),
                qos,
                reconnect_interval: config.reconnect_interval(),
                client: Box::new(client),
                dispatcher: MessageDispatcher::new(handler),
                state,
                events,
                closing: AtomicBool::new(false),
            }),
            client_id: client_id.into(),
            connect_timeout: config.connect_timeout(),
            pending: Mutex::new(Some(Box::new(transport))),
            session: Mutex::new(None),
        })
    }

    /// Opens the session and subscribes.
    ///
    /// Waits for the first connection attempt only. A refusal or timeout is
    /// returned without retry; once connected, losses are handled in the
    /// background.
    pub async fn connect(&self) -> Result<(), EmqpgError> {
        let mut transport = self
            .pending
            .lock()
            .await
            .take()
            .ok_or_else(|| EmqpgError::Internal("session already started".into()))?;

        let shared = &self.shared;
        shared.transition(SessionState::Connecting);
        shared.emit(SessionEvent::Connecting {
            broker: shared.broker.clone(),
        });
        info!(broker = %shared.broker, client_id = %self.client_id, "connecting to broker");

        let connack = timeout(self.connect_timeout, await_connack(&mut transport)).await;
        let session_present = match connack {
            Ok(Ok(session_present)) => session_present,
            Ok(Err(e)) => {
                shared.transition(SessionState::Disconnected);
                error!(broker = %shared.broker, error = %e, "broker connection failed");
                return Err(shared.connect_error(e));
            }
            Err(_) => {
                shared.transition(SessionState::Disconnected);
                error!(
                    broker = %shared.broker,
                    timeout = ?self.connect_timeout,
                    "broker connection timed out"
                );
                return Err(EmqpgError::BrokerUnreachable {
                    broker: shared.broker.clone(),
                    message: EmqpgError::Timeout {
                        duration: self.connect_timeout,
                    }
                    .to_string(),
                });
            }
        };

        shared.on_connected(session_present);

        let cancel = CancellationToken::new();
        let (inbox, outbox) = mpsc::channel(DELIVERY_BACKLOG);
        let delivery = tokio::spawn(deliver(
            shared.dispatcher.clone(),
            outbox,
            cancel.clone(),
        ));
        let handle = tokio::spawn(drive(shared.clone(), transport, inbox, cancel.clone()));
        *self.session.lock().await = Some(Driver {
            handle,
            delivery,
            cancel,
        });
        Ok(())
    }

    /// Leaves the broker and stops reconnecting. Terminal; later calls are no-ops.
    pub async fn disconnect(&self) -> Result<(), EmqpgError> {
        let shared = &self.shared;
        if shared.closing.swap(true, Ordering::AcqRel) {
            return Ok(());
        }

        self.pending.lock().await.take();
        let driver = self.session.lock().await.take();

        if let Some(Driver {
            mut handle,
            mut delivery,
            cancel,
        }) = driver
        {
            let connected = self.is_connected();
            if connected {
                if let Err(e) = shared.client.disconnect() {
                    warn!(error = %e, "could not queue DISCONNECT");
                }
            } else {
                cancel.cancel();
            }

            if timeout(DISCONNECT_QUIESCE, &mut handle).await.is_err() {
                debug!("session driver did not stop in time, aborting");
                handle.abort();
            }

            // Queued messages are abandoned; the one being handled gets the grace period.
            cancel.cancel();
            if timeout(DISCONNECT_QUIESCE, &mut delivery).await.is_err() {
                debug!("message delivery did not stop in time, aborting");
                delivery.abort();
            }
        }

        shared.transition(SessionState::Disconnected);
        shared.emit(SessionEvent::Disconnected);
        info!(broker = %shared.broker, "disconnected from broker");
        Ok(())
    }

    pub fn is_connected(&self) -> bool {
        self.state() == SessionState::Connected
    }

    pub fn state(&self) -> SessionState {
        *self.shared.state.borrow()
    }

    /// Receiver for every session transition from now on.
    pub fn events(&self) -> broadcast::Receiver<SessionEvent> {
        self.shared.events.subscribe()
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    pub fn topic(&self) -> &str {
        &self.shared.topic
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        if let Some(driver) = self.session.get_mut().take() {
            driver.cancel.cancel();
            driver.handle.abort();
            driver.delivery.abort();
        }
    }
}

impl Shared {
    fn transition(&self, next: SessionState) {
        self.state.send_if_modified(|current| {
            if current.can_transition_to(next) {
                debug!(from = %current, to = %next, "session state");
                *current = next;
                true
            } else {
                warn!(from = %current, to = %next, "ignoring illegal session transition");
                false
            }
        });
    }

    fn emit(&self, event: SessionEvent) {
        // No receivers is fine.
        let _ = self.events.send(event);
    }

    fn on_connected(&self, session_present: bool) {
        self.transition(SessionState::Connected);
        self.emit(SessionEvent::Connected { session_present });
        info!(broker = %self.broker, session_present, "connected to broker");
        self.subscribe();
    }

    /// Requests the subscription. Called after every (re)connect.
    fn subscribe(&self) {
        match self.client.subscribe(&self.topic, self.qos) {
            Ok(()) => debug!(topic = %self.topic, qos = ?self.qos, "subscribe requested"),
            Err(e) => self.subscribe_failed(e.to_string()),
        }
    }

    fn subscribe_failed(&self, reason: String) {
        let err = EmqpgError::SubscribeFailed {
            topic: self.topic.clone(),
            message: reason.clone(),
        };
        error!(error = %err, "no messages will arrive");
        self.emit(SessionEvent::SubscribeFailed {
            topic: self.topic.clone(),
            reason,
        });
    }

    fn connect_error(&self, err: TransportError) -> EmqpgError {
        match err {
            TransportError::Refused { code, auth: true } => EmqpgError::AuthenticationFailed {
                broker: self.broker.clone(),
                reason: code,
            },
            other => EmqpgError::BrokerUnreachable {
                broker: self.broker.clone(),
                message: other.to_string(),
            },
        }
    }

    fn is_closing(&self) -> bool {
        self.closing.load(Ordering::Acquire)
    }
}

/// Polls until the first CONNACK or the first failure.
async fn await_connack(
    transport: &mut Box<dyn SessionTransport>,
) -> Result<bool, TransportError> {
    loop {
        match transport.poll().await? {
            TransportEvent::Connected { session_present } => return Ok(session_present),
            TransportEvent::Closed => {
                return Err(TransportError::Network("closed before CONNACK".into()));
            }
            _ => continue,
        }
    }
}

/// Hands queued messages to the dispatcher one at a time, in receipt order.
async fn deliver(
    dispatcher: MessageDispatcher,
    mut outbox: mpsc::Receiver<Inbound>,
    cancel: CancellationToken,
) {
    loop {
        let next = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            next = outbox.recv() => next,
        };
        let Some(Inbound { topic, payload }) = next else {
            break;
        };
        dispatcher.dispatch(&topic, &payload).await;
    }

    debug!("message delivery stopped");
}

async fn drive(
    shared: Arc<Shared>,
    mut transport: Box<dyn SessionTransport>,
    inbox: mpsc::Sender<Inbound>,
    cancel: CancellationToken,
) {
    let mut attempt: u64 = 0;

    loop {
        let polled = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            polled = transport.poll() => polled,
        };

        match polled {
            Ok(TransportEvent::Message { topic, payload }) => {
                if let Err(mpsc::error::TrySendError::Full(dropped)) =
                    inbox.try_send(Inbound { topic, payload })
                {
                    error!(
                        topic = %dropped.topic,
                        bytes = dropped.payload.len(),
                        backlog = DELIVERY_BACKLOG,
                        "delivery backlog full, message dropped"
                    );
                }
            }
            Ok(TransportEvent::Connected { session_present }) => {
                attempt = 0;
                shared.on_connected(session_present);
            }
            Ok(TransportEvent::SubscribeAck { granted: true }) => {
                info!(topic = %shared.topic, "subscribed");
                shared.emit(SessionEvent::Subscribed {
                    topic: shared.topic.clone(),
                });
            }
            Ok(TransportEvent::SubscribeAck { granted: false }) => {
                shared.subscribe_failed("broker rejected the subscription".into());
            }
            Ok(TransportEvent::Closed) if shared.is_closing() => break,
            Ok(TransportEvent::Closed | TransportEvent::Idle) => {}
            Err(_) if shared.is_closing() => break,
            Err(e) => {
                if *shared.state.borrow() == SessionState::Connected {
                    let lost = EmqpgError::ConnectionLost {
                        message: e.to_string(),
                    };
                    warn!(broker = %shared.broker, error = %lost, "reconnecting in background");
                    shared.transition(SessionState::Disconnected);
                    shared.emit(SessionEvent::ConnectionLost {
                        reason: e.to_string(),
                    });
                } else {
                    warn!(
                        broker = %shared.broker,
                        attempt,
                        error = %e,
                        "reconnect attempt failed"
                    );
                }

                attempt += 1;
                let delay = shared.reconnect_interval;
                shared.transition(SessionState::Reconnecting);
                shared.emit(SessionEvent::Reconnecting { attempt, delay });
                info!(attempt, delay = ?delay, "reconnecting");

                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => break,
                    _ = tokio::time::sleep(delay) => {}
                }
            }
        }
    }

    debug!("session driver stopped");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_qos_is_rejected() {
        struct NoClient;
        impl SessionClient for NoClient {
            fn subscribe(&self, _: &str, _: QoS) -> Result<(), TransportError> {
                Ok(())
            }
            fn disconnect(&self) -> Result<(), TransportError> {
                Ok(())
            }
        }

        struct NoTransport;
        #[async_trait::async_trait]
        impl SessionTransport for NoTransport {
            async fn poll(&mut self) -> Result<TransportEvent, TransportError> {
                std::future::pending().await
            }
        }

        struct NoHandler;
        #[async_trait::async_trait]
        impl MessageHandler for NoHandler {
            async fn handle(&self, _: &str, _: &[u8]) -> Result<(), EmqpgError> {
                Ok(())
            }
        }

        let config = BrokerConfig {
            address: "tcp://localhost".into(),
            topic: "t".into(),
            qos: 7,
            ..BrokerConfig::default()
        };
        let result = ConnectionManager::with_transport(
            &config,
            "id",
            Arc::new(NoHandler),
            NoClient,
            NoTransport,
        );
        assert!(matches!(result, Err(EmqpgError::Config(_))));
    }
}
