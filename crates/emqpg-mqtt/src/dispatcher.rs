// SPDX-FileCopyrightText: 2026 Emqpg Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Hands each inbound message to the configured handler.

use std::sync::Arc;

use tracing::error;

use emqpg_core::MessageHandler;

/// Stateless pass-through from the session to a [`MessageHandler`].
///
/// Handler errors are logged and the message is dropped. Nothing is
/// retried or requeued.
#[derive(Clone)]
pub struct MessageDispatcher {
    handler: Arc<dyn MessageHandler>,
}

impl MessageDispatcher {
    pub fn new(handler: Arc<dyn MessageHandler>) -> Self {
        Self { handler }
    }

    pub async fn dispatch(&self, topic: &str, payload: &[u8]) {
        if let Err(e) = self.handler.handle(topic, payload).await {
            error!(topic, bytes = payload.len(), error = %e, "message dropped");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use emqpg_core::EmqpgError;
    use tracing_test::traced_test;

    use super::*;

    struct Failing {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl MessageHandler for Failing {
        async fn handle(&self, _topic: &str, _payload: &[u8]) -> Result<(), EmqpgError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(EmqpgError::StoragePersistFailed {
                source: "connection reset".into(),
            })
        }
    }

    #[tokio::test]
    #[traced_test]
    async fn handler_errors_are_logged_and_absorbed() {
        let handler = Arc::new(Failing {
            calls: AtomicUsize::new(0),
        });
        let dispatcher = MessageDispatcher::new(handler.clone());

        dispatcher.dispatch("devices/1", b"{}").await;
        dispatcher.dispatch("devices/1", b"{}").await;

        assert_eq!(handler.calls.load(Ordering::SeqCst), 2);
        assert!(logs_contain("message dropped"));
        assert!(logs_contain("connection reset"));
    }
}
