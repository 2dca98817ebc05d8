//! Process-wide registry of live chat connections.
//!
//! Maps a knowledge-base key to the set of live connections, each keyed by
//! a locally generated connection id. Connection handlers insert on
//! handshake and remove on cleanup; the heartbeat sweeper reads snapshots
//! and removes connections that fail a probe. Removal is idempotent so the
//! two cleanup paths can race safely.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::HashMap;
use tokio::sync::mpsc;
use uuid::Uuid;

use super::protocol::ServerEvent;

pub type ConnectionId = Uuid;

/// What the registry holds per connection: a clone of the outbound event
/// sender. The socket itself stays exclusively owned by the connection's
/// writer task; probing the sender is how liveness is checked.
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    pub sender: mpsc::UnboundedSender<ServerEvent>,
    pub connected_at: DateTime<Utc>,
}

impl ConnectionHandle {
    pub fn new(sender: mpsc::UnboundedSender<ServerEvent>) -> Self {
        Self {
            sender,
            connected_at: Utc::now(),
        }
    }
}

/// All mutations and reads go through one mutex, so the sweeper can never
/// observe a partially inserted entry.
#[derive(Default)]
pub struct ConnectionRegistry {
    inner: Mutex<HashMap<String, HashMap<ConnectionId, ConnectionHandle>>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, kb_key: &str, connection_id: ConnectionId, handle: ConnectionHandle) {
        let mut inner = self.inner.lock();
        inner
            .entry(kb_key.to_string())
            .or_default()
            .insert(connection_id, handle);
    }

    /// Remove a connection. A no-op when already absent; drops the outer
    /// key once its bucket empties so no empty buckets linger.
    pub fn unregister(&self, kb_key: &str, connection_id: ConnectionId) {
        let mut inner = self.inner.lock();
        if let Some(bucket) = inner.get_mut(kb_key) {
            bucket.remove(&connection_id);
            if bucket.is_empty() {
                inner.remove(kb_key);
            }
        }
    }

    /// Stable snapshot of connection ids for a knowledge-base key.
    pub fn snapshot_ids(&self, kb_key: &str) -> Vec<ConnectionId> {
        let inner = self.inner.lock();
        let mut ids: Vec<ConnectionId> = inner
            .get(kb_key)
            .map(|bucket| bucket.keys().copied().collect())
            .unwrap_or_default();
        ids.sort_unstable();
        ids
    }

    pub fn get(&self, kb_key: &str, connection_id: ConnectionId) -> Option<ConnectionHandle> {
        let inner = self.inner.lock();
        inner
            .get(kb_key)
            .and_then(|bucket| bucket.get(&connection_id))
            .cloned()
    }

    /// Live connection count for a knowledge-base key.
    pub fn count(&self, kb_key: &str) -> usize {
        let inner = self.inner.lock();
        inner.get(kb_key).map_or(0, HashMap::len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    const KB: &str = "unified_kb";

    fn handle() -> (ConnectionHandle, mpsc::UnboundedReceiver<ServerEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (ConnectionHandle::new(tx), rx)
    }

    #[test]
    fn register_then_get() {
        let registry = ConnectionRegistry::new();
        let id = Uuid::new_v4();
        let (h, _rx) = handle();

        registry.register(KB, id, h);
        assert!(registry.get(KB, id).is_some());
        assert_eq!(registry.count(KB), 1);
    }

    #[test]
    fn unregister_is_idempotent() {
        let registry = ConnectionRegistry::new();
        let id = Uuid::new_v4();
        let (h, _rx) = handle();

        registry.register(KB, id, h);
        registry.unregister(KB, id);
        registry.unregister(KB, id); // second removal is a no-op
        assert_eq!(registry.count(KB), 0);
        assert!(registry.get(KB, id).is_none());
    }

    #[test]
    fn empty_bucket_is_removed() {
        let registry = ConnectionRegistry::new();
        let id = Uuid::new_v4();
        let (h, _rx) = handle();

        registry.register(KB, id, h);
        registry.unregister(KB, id);

        // The outer key is gone entirely, not an empty map.
        assert!(registry.inner.lock().get(KB).is_none());
    }

    #[test]
    fn snapshot_reflects_live_set() {
        let registry = ConnectionRegistry::new();
        let ids: Vec<Uuid> = (0..5).map(|_| Uuid::new_v4()).collect();
        let mut rxs = Vec::new();
        for id in &ids {
            let (h, rx) = handle();
            registry.register(KB, *id, h);
            rxs.push(rx);
        }

        registry.unregister(KB, ids[0]);
        registry.unregister(KB, ids[3]);

        let snapshot = registry.snapshot_ids(KB);
        assert_eq!(snapshot.len(), 3);
        assert!(!snapshot.contains(&ids[0]));
        assert!(!snapshot.contains(&ids[3]));
    }

    #[test]
    fn snapshot_of_unknown_key_is_empty() {
        let registry = ConnectionRegistry::new();
        assert!(registry.snapshot_ids("nothing").is_empty());
    }

    #[test]
    fn concurrent_register_unregister_balances() {
        let registry = Arc::new(ConnectionRegistry::new());
        let mut threads = Vec::new();

        // Half the connections stay, half are removed, under concurrent snapshots.
        for i in 0..8 {
            let registry = Arc::clone(&registry);
            threads.push(std::thread::spawn(move || {
                for _ in 0..50 {
                    let id = Uuid::new_v4();
                    let (tx, _rx) = mpsc::unbounded_channel();
                    registry.register(KB, id, ConnectionHandle::new(tx));
                    if i % 2 == 0 {
                        registry.unregister(KB, id);
                    }
                    let _ = registry.snapshot_ids(KB);
                }
            }));
        }
        for t in threads {
            t.join().unwrap();
        }

        // 4 threads kept all 50 of their registrations.
        assert_eq!(registry.count(KB), 4 * 50);
    }
}
