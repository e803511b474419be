//! Fan-out dispatcher: rebroadcasts each inbound message to every other
//! active session.
//!
//! Stateless per message; only the registry carries state. Delivery is
//! best-effort: a failed send is logged and skipped, and one slow or closed
//! recipient never stalls the rest of the broadcast.

use crate::relay::registry::SessionRegistry;
use relay_core::{RelayEnvelope, RelayError};
use std::sync::Arc;
use tracing::{debug, warn};

/// Routes one sender's message to all other registered sessions.
pub struct RelayDispatcher {
    registry: Arc<SessionRegistry>,
}

impl RelayDispatcher {
    /// Create a new dispatcher backed by a session registry.
    pub fn new(registry: Arc<SessionRegistry>) -> Self {
        Self { registry }
    }

    /// Relay one inbound message to all other active sessions.
    ///
    /// Builds one envelope per recipient from a point-in-time snapshot and
    /// queues it with a non-blocking send. Returns the number of delivery
    /// attempts made.
    pub async fn on_message(&self, sender_id: &str, payload: &str) -> usize {
        if !self.registry.contains(sender_id).await {
            // The sender can disconnect between message receipt and
            // dispatch. The message is still broadcast to every current
            // session; nothing ends up excluded.
            warn!(session_id = %sender_id, "message from unregistered sender");
        }

        let recipients = self.registry.snapshot_others(sender_id).await;
        let mut attempts = 0;
        for (recipient, tx) in recipients {
            let envelope = RelayEnvelope::new(sender_id, &recipient, payload);
            attempts += 1;
            if let Err(e) = tx.try_send(envelope) {
                let err = RelayError::Delivery {
                    recipient: recipient.clone(),
                    reason: e.to_string(),
                };
                warn!(sender = %sender_id, error = %err, "skipping recipient");
            }
        }

        debug!(sender = %sender_id, attempts, "message relayed");
        attempts
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::SocketAddr;
    use tokio::sync::mpsc;

    fn addr() -> SocketAddr {
        "127.0.0.1:1".parse().unwrap()
    }

    async fn register(
        registry: &SessionRegistry,
        id: &str,
    ) -> mpsc::Receiver<RelayEnvelope> {
        let (tx, rx) = mpsc::channel(8);
        registry.register(id.into(), addr(), tx).await.unwrap();
        rx
    }

    #[tokio::test]
    async fn fans_out_to_all_but_sender() {
        let registry = Arc::new(SessionRegistry::new());
        let dispatcher = RelayDispatcher::new(registry.clone());

        let mut rx_a = register(&registry, "A").await;
        let mut rx_b = register(&registry, "B").await;
        let mut rx_c = register(&registry, "C").await;

        let attempts = dispatcher.on_message("A", "hi").await;
        assert_eq!(attempts, 2);

        assert_eq!(rx_b.recv().await.unwrap().render(), "[A=>B]: hi");
        assert_eq!(rx_c.recv().await.unwrap().render(), "[A=>C]: hi");
        assert!(rx_a.try_recv().is_err());
    }

    #[tokio::test]
    async fn lone_session_produces_no_deliveries() {
        let registry = Arc::new(SessionRegistry::new());
        let dispatcher = RelayDispatcher::new(registry.clone());

        let mut rx_a = register(&registry, "A").await;

        let attempts = dispatcher.on_message("A", "hi").await;
        assert_eq!(attempts, 0);
        assert!(rx_a.try_recv().is_err());
    }

    #[tokio::test]
    async fn unknown_sender_still_broadcasts_to_everyone() {
        let registry = Arc::new(SessionRegistry::new());
        let dispatcher = RelayDispatcher::new(registry.clone());

        let mut rx_b = register(&registry, "B").await;
        let mut rx_c = register(&registry, "C").await;

        // "A" disconnected before dispatch; no session is excluded.
        let attempts = dispatcher.on_message("A", "hi").await;
        assert_eq!(attempts, 2);
        assert_eq!(rx_b.recv().await.unwrap().render(), "[A=>B]: hi");
        assert_eq!(rx_c.recv().await.unwrap().render(), "[A=>C]: hi");
    }

    #[tokio::test]
    async fn closed_recipient_does_not_abort_the_broadcast() {
        let registry = Arc::new(SessionRegistry::new());
        let dispatcher = RelayDispatcher::new(registry.clone());

        let _rx_a = register(&registry, "A").await;
        let rx_b = register(&registry, "B").await;
        let mut rx_c = register(&registry, "C").await;
        drop(rx_b); // B's writer task is gone; its handle is stale

        let attempts = dispatcher.on_message("A", "hi").await;
        assert_eq!(attempts, 2);
        assert_eq!(rx_c.recv().await.unwrap().render(), "[A=>C]: hi");
    }

    #[tokio::test]
    async fn full_queue_is_skipped_not_awaited() {
        let registry = Arc::new(SessionRegistry::new());
        let dispatcher = RelayDispatcher::new(registry.clone());

        let _rx_a = register(&registry, "A").await;
        let (tx_b, mut rx_b) = mpsc::channel(1);
        registry.register("B".into(), addr(), tx_b).await.unwrap();

        // Fill B's queue; the second message must be dropped, not block.
        assert_eq!(dispatcher.on_message("A", "one").await, 1);
        assert_eq!(dispatcher.on_message("A", "two").await, 1);

        assert_eq!(rx_b.recv().await.unwrap().render(), "[A=>B]: one");
        assert!(rx_b.try_recv().is_err());
    }

    #[tokio::test]
    async fn concurrent_unregister_does_not_panic_dispatch() {
        let registry = Arc::new(SessionRegistry::new());
        let dispatcher = Arc::new(RelayDispatcher::new(registry.clone()));

        let _rx_a = register(&registry, "A").await;
        let mut rx_b = register(&registry, "B").await;

        let reg = registry.clone();
        let remover = tokio::spawn(async move {
            reg.unregister("B").await;
        });

        let disp = dispatcher.clone();
        let sender = tokio::spawn(async move {
            for _ in 0..100 {
                disp.on_message("A", "hi").await;
            }
        });

        remover.await.unwrap();
        sender.await.unwrap();

        // Whatever was queued before removal is well-formed; nothing panics.
        while let Ok(envelope) = rx_b.try_recv() {
            assert_eq!(envelope.render(), "[A=>B]: hi");
        }
        assert_eq!(registry.count().await, 1);
    }
}
