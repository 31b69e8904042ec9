use std::collections::HashMap;
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::{debug, info};

use crate::connection::{Connection, Identity, Outbound};
use crate::error::{Result, ServerError};

/// Live connections by identity.
///
/// The only state shared between connection threads. Lookups hand out
/// `Arc<Connection>` clones and fan-out works from snapshots, so no caller
/// ever writes to a socket while holding the registry lock.
pub struct Registry {
    connections: Mutex<HashMap<Identity, Arc<Connection>>>,
    next_id: AtomicI32,
}

impl Registry {
    /// Empty registry; the first identity issued is 1.
    pub fn new() -> Self {
        Self {
            connections: Mutex::new(HashMap::new()),
            next_id: AtomicI32::new(1),
        }
    }

    /// Assign the next identity to `outbound` and register it.
    ///
    /// Identities are never reused. They run from 1 to `i32::MAX - 1`; after
    /// that every registration fails with [`ServerError::IdentitiesExhausted`].
    pub fn register(&self, outbound: Outbound) -> Result<Arc<Connection>> {
        let id = self
            .next_id
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_add(1))
            .map_err(|_| ServerError::IdentitiesExhausted)?;

        let connection = Arc::new(Connection::new(id, outbound));
        let total = {
            let mut connections = self.lock();
            connections.insert(id, Arc::clone(&connection));
            connections.len()
        };

        info!(id, peer = ?connection.peer_addr(), total, "client connected");
        Ok(connection)
    }

    /// Remove `id`. No-op if it is already gone.
    pub fn unregister(&self, id: Identity) -> Option<Arc<Connection>> {
        let (removed, total) = {
            let mut connections = self.lock();
            let removed = connections.remove(&id);
            (removed, connections.len())
        };

        match &removed {
            Some(_) => info!(id, total, "client disconnected"),
            None => debug!(id, "unregister of unknown identity ignored"),
        }
        removed
    }

    /// The connection registered as `id`, if any.
    pub fn lookup(&self, id: Identity) -> Option<Arc<Connection>> {
        self.lock().get(&id).cloned()
    }

    /// Snapshot of every connection except `id`.
    pub fn all_except(&self, id: Identity) -> Vec<Arc<Connection>> {
        self.lock()
            .iter()
            .filter(|(other, _)| **other != id)
            .map(|(_, conn)| Arc::clone(conn))
            .collect()
    }

    /// Snapshot of every connection.
    pub fn all(&self) -> Vec<Arc<Connection>> {
        self.lock().values().cloned().collect()
    }

    /// Registered identities in ascending order.
    pub fn identities(&self) -> Vec<Identity> {
        let mut ids: Vec<Identity> = self.lock().keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// Number of registered connections.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// True when nobody is connected.
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Shut down every registered socket.
    ///
    /// Entries stay registered until their reader threads observe the
    /// closed socket and unregister themselves.
    pub fn close_all(&self) {
        for connection in self.all() {
            connection.shutdown();
        }
    }

    // The map is never left half-updated, so a poisoned lock is safe to reuse.
    fn lock(&self) -> MutexGuard<'_, HashMap<Identity, Arc<Connection>>> {
        self.connections
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    #[cfg(test)]
    fn with_next_id(next_id: Identity) -> Self {
        Self {
            connections: Mutex::new(HashMap::new()),
            next_id: AtomicI32::new(next_id),
        }
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;
    use crate::test_support::SharedBuffer;

    fn outbound() -> Outbound {
        Outbound::from_writer(SharedBuffer::default())
    }

    #[test]
    fn identities_start_at_one_and_increase() {
        let registry = Registry::new();
        let a = registry.register(outbound()).unwrap();
        let b = registry.register(outbound()).unwrap();

        assert_eq!((a.id(), b.id()), (1, 2));
        assert_eq!(registry.identities(), vec![1, 2]);
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn identities_not_reused_after_disconnect() {
        let registry = Registry::new();
        let a = registry.register(outbound()).unwrap();
        registry.unregister(a.id());

        let b = registry.register(outbound()).unwrap();
        assert_eq!(b.id(), 2);
        assert_eq!(registry.identities(), vec![2]);
    }

    #[test]
    fn unregister_is_idempotent() {
        let registry = Registry::new();
        let a = registry.register(outbound()).unwrap();

        assert!(registry.unregister(a.id()).is_some());
        assert!(registry.unregister(a.id()).is_none());
        assert!(registry.unregister(42).is_none());
        assert!(registry.is_empty());
    }

    #[test]
    fn lookup_and_all_except() {
        let registry = Registry::new();
        let a = registry.register(outbound()).unwrap();
        let b = registry.register(outbound()).unwrap();
        let c = registry.register(outbound()).unwrap();

        assert_eq!(registry.lookup(b.id()).map(|conn| conn.id()), Some(2));
        assert!(registry.lookup(99).is_none());

        let mut others: Vec<Identity> = registry
            .all_except(a.id())
            .iter()
            .map(|conn| conn.id())
            .collect();
        others.sort_unstable();
        assert_eq!(others, vec![b.id(), c.id()]);
        assert_eq!(registry.all().len(), 3);
    }

    #[test]
    fn snapshot_survives_concurrent_removal() {
        let registry = Registry::new();
        let a = registry.register(outbound()).unwrap();
        let b = registry.register(outbound()).unwrap();

        let snapshot = registry.all_except(a.id());
        registry.unregister(b.id());

        assert_eq!(snapshot.len(), 1);
        assert!(snapshot[0].send(&relaychat_frame::Frame::text(1, "late")));
    }

    #[test]
    fn exhausted_counter_fails_instead_of_wrapping() {
        let registry = Registry::with_next_id(i32::MAX - 1);
        let last = registry.register(outbound()).unwrap();
        assert_eq!(last.id(), i32::MAX - 1);

        let err = registry.register(outbound()).unwrap_err();
        assert!(matches!(err, ServerError::IdentitiesExhausted));
        let err = registry.register(outbound()).unwrap_err();
        assert!(matches!(err, ServerError::IdentitiesExhausted));
    }

    #[test]
    fn concurrent_registration_yields_unique_ids() {
        let registry = Arc::new(Registry::new());

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let registry = Arc::clone(&registry);
                std::thread::spawn(move || {
                    let mut ids = Vec::new();
                    for _ in 0..100 {
                        let conn = registry.register(outbound()).unwrap();
                        ids.push(conn.id());
                        if conn.id() % 2 == 0 {
                            registry.unregister(conn.id());
                        }
                    }
                    ids
                })
            })
            .collect();

        let mut seen = HashSet::new();
        for handle in handles {
            for id in handle.join().unwrap() {
                assert!(seen.insert(id), "identity {id} issued twice");
            }
        }
        assert_eq!(seen.len(), 800);
        assert_eq!(seen.iter().max(), Some(&800));
        assert_eq!(registry.len(), 400);
    }
}
