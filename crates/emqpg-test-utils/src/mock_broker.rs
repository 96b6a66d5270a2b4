// SPDX-FileCopyrightText: 2026 Emqpg Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Scripted MQTT broker for deterministic session tests.
//!
//! `MockBroker` hands out a client/transport pair that behaves like a
//! `rumqttc` session: polling after a failure reconnects, subscriptions are
//! forgotten when the connection drops, and published messages reach the
//! transport only while a matching subscription is active.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use tokio::sync::Notify;

use emqpg_mqtt::{QoS, SessionClient, SessionTransport, TransportError, TransportEvent};

/// How the broker answers the next connection attempt.
#[derive(Debug, Clone)]
enum Admission {
    Accept,
    Refuse(TransportError),
    /// Never answers; the attempt hangs.
    Silent,
}

struct BrokerState {
    queue: VecDeque<Result<TransportEvent, TransportError>>,
    admission: Admission,
    connected: bool,
    connections: usize,
    subscriptions: Vec<String>,
    subscribe_calls: Vec<(String, QoS)>,
    reject_subscriptions: bool,
    disconnect_requested: bool,
}

struct BrokerInner {
    state: Mutex<BrokerState>,
    notify: Notify,
}

impl BrokerInner {
    fn lock(&self) -> MutexGuard<'_, BrokerState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn push(&self, item: Result<TransportEvent, TransportError>) {
        self.lock().queue.push_back(item);
        self.notify.notify_one();
    }
}

/// A broker double shared between a test and the session under test.
#[derive(Clone)]
pub struct MockBroker {
    inner: Arc<BrokerInner>,
}

impl MockBroker {
    /// A broker that accepts every connection attempt.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(BrokerInner {
                state: Mutex::new(BrokerState {
                    queue: VecDeque::new(),
                    admission: Admission::Accept,
                    connected: false,
                    connections: 0,
                    subscriptions: Vec::new(),
                    subscribe_calls: Vec::new(),
                    reject_subscriptions: false,
                    disconnect_requested: false,
                }),
                notify: Notify::new(),
            }),
        }
    }

    /// Returns the client/transport pair for one session.
    pub fn session(&self) -> (MockClient, MockTransport) {
        (
            MockClient {
                inner: self.inner.clone(),
            },
            MockTransport {
                inner: self.inner.clone(),
            },
        )
    }

    /// Refuse connection attempts with `error` until
    /// [`accept_connections`](Self::accept_connections).
    pub fn refuse_connections(&self, error: TransportError) {
        self.inner.lock().admission = Admission::Refuse(error);
        self.inner.notify.notify_one();
    }

    /// Ignore connection attempts without answering.
    pub fn stay_silent(&self) {
        self.inner.lock().admission = Admission::Silent;
    }

    pub fn accept_connections(&self) {
        self.inner.lock().admission = Admission::Accept;
        self.inner.notify.notify_one();
    }

    /// Deny every subscribe request with a failure SUBACK.
    pub fn reject_subscriptions(&self, reject: bool) {
        self.inner.lock().reject_subscriptions = reject;
    }

    /// Drops the live connection, forgetting its subscriptions.
    pub fn drop_connection(&self, reason: &str) {
        {
            let mut state = self.inner.lock();
            state.connected = false;
            state.subscriptions.clear();
        }
        self.inner
            .push(Err(TransportError::Network(reason.to_string())));
    }

    /// Publishes to the session. Returns whether a subscription matched.
    pub fn publish(&self, topic: &str, payload: impl Into<Vec<u8>>) -> bool {
        let delivered = {
            let mut state = self.inner.lock();
            let matched = state.connected
                && state
                    .subscriptions
                    .iter()
                    .any(|filter| topic_matches(filter, topic));
            if matched {
                state.queue.push_back(Ok(TransportEvent::Message {
                    topic: topic.to_string(),
                    payload: payload.into(),
                }));
            }
            matched
        };
        if delivered {
            self.inner.notify.notify_one();
        }
        delivered
    }

    pub fn is_connected(&self) -> bool {
        self.inner.lock().connected
    }

    /// Number of accepted connections, the initial one included.
    pub fn connections(&self) -> usize {
        self.inner.lock().connections
    }

    /// Currently active topic filters.
    pub fn subscriptions(&self) -> Vec<String> {
        self.inner.lock().subscriptions.clone()
    }

    /// Every subscribe request seen, in order.
    pub fn subscribe_calls(&self) -> Vec<(String, QoS)> {
        self.inner.lock().subscribe_calls.clone()
    }

    /// Events produced by the broker that the session has not polled yet.
    pub fn queued_events(&self) -> usize {
        self.inner.lock().queue.len()
    }

    pub fn disconnect_requested(&self) -> bool {
        self.inner.lock().disconnect_requested
    }
}

impl Default for MockBroker {
    fn default() -> Self {
        Self::new()
    }
}

/// Request side of a mock session.
pub struct MockClient {
    inner: Arc<BrokerInner>,
}

impl SessionClient for MockClient {
    fn subscribe(&self, topic: &str, qos: QoS) -> Result<(), TransportError> {
        let ack = {
            let mut state = self.inner.lock();
            state.subscribe_calls.push((topic.to_string(), qos));
            let granted = !state.reject_subscriptions;
            if granted && !state.subscriptions.iter().any(|t| t == topic) {
                state.subscriptions.push(topic.to_string());
            }
            TransportEvent::SubscribeAck { granted }
        };
        self.inner.push(Ok(ack));
        Ok(())
    }

    fn disconnect(&self) -> Result<(), TransportError> {
        {
            let mut state = self.inner.lock();
            state.disconnect_requested = true;
            state.connected = false;
            state.subscriptions.clear();
        }
        self.inner.push(Ok(TransportEvent::Closed));
        Ok(())
    }
}

/// Event side of a mock session.
pub struct MockTransport {
    inner: Arc<BrokerInner>,
}

#[async_trait]
impl SessionTransport for MockTransport {
    async fn poll(&mut self) -> Result<TransportEvent, TransportError> {
        loop {
            let notified = self.inner.notify.notified();
            {
                let mut state = self.inner.lock();
                if let Some(next) = state.queue.pop_front() {
                    return next;
                }
                if !state.connected && !state.disconnect_requested {
                    match state.admission.clone() {
                        Admission::Accept => {
                            state.connected = true;
                            state.connections += 1;
                            return Ok(TransportEvent::Connected {
                                session_present: false,
                            });
                        }
                        Admission::Refuse(error) => return Err(error),
                        Admission::Silent => {}
                    }
                }
            }
            notified.await;
        }
    }
}

/// MQTT topic filter matching with `+` and `#` wildcards.
pub fn topic_matches(filter: &str, topic: &str) -> bool {
    let mut filter_levels = filter.split('/');
    let mut topic_levels = topic.split('/');

    loop {
        match (filter_levels.next(), topic_levels.next()) {
            (Some("#"), _) => return true,
            (Some("+"), Some(_)) => {}
            (Some(f), Some(t)) if f == t => {}
            (None, None) => return true,
            _ => return false,
        }
    }
}
