//! Session registry: the authoritative set of currently connected clients.
//!
//! Entries are keyed by opaque session id, assigned at accept time. Each
//! entry carries the delivery handle feeding that connection's writer task.
//! An id is present here iff the connection is open and writable.

use relay_core::{RelayEnvelope, RelayError, RelayResult};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, info};

/// A registered session and its delivery handle.
#[derive(Debug, Clone)]
pub struct SessionEntry {
    /// Opaque unique session identifier.
    pub id: String,
    /// Remote peer address.
    pub remote_addr: SocketAddr,
    /// When the connection was accepted.
    pub opened_at: Instant,
    /// Handle that queues envelopes for this session's writer task.
    pub tx: mpsc::Sender<RelayEnvelope>,
}

/// Registry of active sessions.
///
/// All operations go through one coarse lock; register/unregister are O(1),
/// snapshots are O(n). No I/O happens under the lock.
pub struct SessionRegistry {
    sessions: Arc<RwLock<HashMap<String, SessionEntry>>>,
}

impl SessionRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Register a session.
    ///
    /// Fails with [`RelayError::DuplicateSession`] if the id is already
    /// present; ids are collision-free by construction, so a hit here is a
    /// caller-side bug rather than something to paper over.
    pub async fn register(
        &self,
        id: String,
        remote_addr: SocketAddr,
        tx: mpsc::Sender<RelayEnvelope>,
    ) -> RelayResult<()> {
        let mut sessions = self.sessions.write().await;
        if sessions.contains_key(&id) {
            return Err(RelayError::DuplicateSession(id));
        }
        let entry = SessionEntry {
            id: id.clone(),
            remote_addr,
            opened_at: Instant::now(),
            tx,
        };
        sessions.insert(id.clone(), entry);
        info!(session_id = %id, remote = %remote_addr, "session registered");
        Ok(())
    }

    /// Unregister a session by id. No-op if absent, since disconnect events
    /// may race with cleanup.
    pub async fn unregister(&self, id: &str) {
        let mut sessions = self.sessions.write().await;
        if let Some(entry) = sessions.remove(id) {
            debug!(
                session_id = %id,
                remote = %entry.remote_addr,
                age_secs = entry.opened_at.elapsed().as_secs(),
                "session unregistered"
            );
        }
    }

    /// Whether a session id is currently registered.
    pub async fn contains(&self, id: &str) -> bool {
        self.sessions.read().await.contains_key(id)
    }

    /// Point-in-time copy of all entries except `exclude`.
    ///
    /// Never a live view; callers iterate the copy while the registry keeps
    /// mutating underneath.
    pub async fn snapshot_others(&self, exclude: &str) -> Vec<(String, mpsc::Sender<RelayEnvelope>)> {
        let sessions = self.sessions.read().await;
        sessions
            .values()
            .filter(|entry| entry.id != exclude)
            .map(|entry| (entry.id.clone(), entry.tx.clone()))
            .collect()
    }

    /// Number of active sessions.
    pub async fn count(&self) -> usize {
        self.sessions.read().await.len()
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr() -> SocketAddr {
        "127.0.0.1:1".parse().unwrap()
    }

    fn handle() -> mpsc::Sender<RelayEnvelope> {
        mpsc::channel(8).0
    }

    #[tokio::test]
    async fn count_tracks_register_and_unregister() {
        let registry = SessionRegistry::new();
        assert_eq!(registry.count().await, 0);

        registry.register("a".into(), addr(), handle()).await.unwrap();
        registry.register("b".into(), addr(), handle()).await.unwrap();
        assert_eq!(registry.count().await, 2);

        registry.unregister("a").await;
        assert_eq!(registry.count().await, 1);
        registry.unregister("b").await;
        assert_eq!(registry.count().await, 0);
    }

    #[tokio::test]
    async fn duplicate_register_is_rejected() {
        let registry = SessionRegistry::new();
        registry.register("a".into(), addr(), handle()).await.unwrap();

        let err = registry
            .register("a".into(), addr(), handle())
            .await
            .unwrap_err();
        assert!(matches!(err, RelayError::DuplicateSession(id) if id == "a"));
        assert_eq!(registry.count().await, 1);
    }

    #[tokio::test]
    async fn unregister_absent_is_noop() {
        let registry = SessionRegistry::new();
        registry.unregister("ghost").await;
        assert_eq!(registry.count().await, 0);
    }

    #[tokio::test]
    async fn snapshot_never_contains_excluded_id() {
        let registry = SessionRegistry::new();
        registry.register("a".into(), addr(), handle()).await.unwrap();
        registry.register("b".into(), addr(), handle()).await.unwrap();
        registry.register("c".into(), addr(), handle()).await.unwrap();

        let others = registry.snapshot_others("a").await;
        assert_eq!(others.len(), 2);
        assert!(others.iter().all(|(id, _)| id != "a"));

        // Excluding an id that was never registered returns everything.
        let all = registry.snapshot_others("ghost").await;
        assert_eq!(all.len(), 3);
    }

    #[tokio::test]
    async fn reregister_after_unregister_uses_new_handle() {
        let registry = SessionRegistry::new();
        let (old_tx, mut old_rx) = mpsc::channel(8);
        let (new_tx, mut new_rx) = mpsc::channel(8);

        registry.register("a".into(), addr(), old_tx).await.unwrap();
        registry.unregister("a").await;
        registry.register("a".into(), addr(), new_tx).await.unwrap();

        let others = registry.snapshot_others("someone-else").await;
        assert_eq!(others.len(), 1);
        let envelope = RelayEnvelope::new("x", "a", "ping");
        others[0].1.try_send(envelope.clone()).unwrap();

        assert_eq!(new_rx.try_recv().unwrap(), envelope);
        assert!(old_rx.try_recv().is_err());
    }
}
