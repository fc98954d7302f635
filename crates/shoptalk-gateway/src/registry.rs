use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use tokio::sync::mpsc;
use tracing::debug;
use uuid::Uuid;

use shoptalk_types::models::UserId;

/// Outbound frames buffered per connection before deliveries start bouncing.
pub const OUTBOUND_BUFFER: usize = 64;

const SHARD_COUNT: usize = 16;

struct Entry {
    conn_id: Uuid,
    tx: mpsc::Sender<String>,
}

#[derive(Default)]
struct Shard {
    entries: RwLock<HashMap<UserId, Entry>>,
}

/// Live-connection table: user id -> the send half of that user's socket
/// task. Sharded so concurrent registrations for different users do not
/// serialize on one lock.
///
/// The registry is a routing cache, never the source of truth. It is rebuilt
/// entry by entry as clients reconnect.
#[derive(Clone)]
pub struct ConnectionRegistry {
    shards: Arc<Vec<Shard>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        let shards = (0..SHARD_COUNT).map(|_| Shard::default()).collect();
        Self {
            shards: Arc::new(shards),
        }
    }

    fn shard(&self, user_id: UserId) -> &Shard {
        &self.shards[user_id.rem_euclid(SHARD_COUNT as i64) as usize]
    }

    /// Register a user's live channel. Returns (conn_id, receiver). Any
    /// previous registration for the same user is replaced; dropping the old
    /// sender is what tells the older connection's pump loop to shut down.
    pub fn register(&self, user_id: UserId) -> (Uuid, mpsc::Receiver<String>) {
        let conn_id = Uuid::new_v4();
        let (tx, rx) = mpsc::channel(OUTBOUND_BUFFER);

        let evicted = {
            let mut entries = self
                .shard(user_id)
                .entries
                .write()
                .expect("registry lock poisoned");
            entries.insert(user_id, Entry { conn_id, tx }).is_some()
        };

        if evicted {
            debug!("User {} re-registered, evicting older connection", user_id);
        }

        (conn_id, rx)
    }

    /// Remove a registration, but only if `conn_id` still owns it. A slow
    /// teardown of an evicted connection must never remove the entry a newer
    /// connection just installed.
    pub fn unregister(&self, user_id: UserId, conn_id: Uuid) {
        let mut entries = self
            .shard(user_id)
            .entries
            .write()
            .expect("registry lock poisoned");

        if entries.get(&user_id).is_some_and(|e| e.conn_id == conn_id) {
            entries.remove(&user_id);
        }
    }

    /// Best-effort push of an already-encoded frame. Returns false when the
    /// user has no live channel or their buffer is full. Never blocks; the
    /// caller has already persisted the message, so a miss only means the
    /// recipient will read it from the log later.
    pub fn deliver(&self, user_id: UserId, frame: String) -> bool {
        let entries = self
            .shard(user_id)
            .entries
            .read()
            .expect("registry lock poisoned");

        match entries.get(&user_id) {
            Some(entry) => entry.tx.try_send(frame).is_ok(),
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc::error::TryRecvError;

    #[test]
    fn delivers_to_registered_user() {
        let registry = ConnectionRegistry::new();
        let (_conn, mut rx) = registry.register(7);

        assert!(registry.deliver(7, "hello".into()));
        assert_eq!(rx.try_recv().unwrap(), "hello");
    }

    #[test]
    fn deliver_without_registration_returns_false() {
        let registry = ConnectionRegistry::new();
        assert!(!registry.deliver(7, "nobody home".into()));
    }

    #[test]
    fn second_registration_evicts_first() {
        let registry = ConnectionRegistry::new();
        let (_old_conn, mut old_rx) = registry.register(7);
        let (_new_conn, mut new_rx) = registry.register(7);

        assert!(registry.deliver(7, "frame".into()));
        assert_eq!(new_rx.try_recv().unwrap(), "frame");

        // The old sender was dropped on eviction, which is the signal the
        // old connection's pump loop watches for.
        assert_eq!(old_rx.try_recv(), Err(TryRecvError::Disconnected));
    }

    #[test]
    fn stale_unregister_keeps_newer_entry() {
        let registry = ConnectionRegistry::new();
        let (old_conn, _old_rx) = registry.register(7);
        let (_new_conn, mut new_rx) = registry.register(7);

        // The evicted connection tears down late, with its stale conn_id.
        registry.unregister(7, old_conn);

        assert!(registry.deliver(7, "still here".into()));
        assert_eq!(new_rx.try_recv().unwrap(), "still here");
    }

    #[test]
    fn unregister_removes_own_entry() {
        let registry = ConnectionRegistry::new();
        let (conn, _rx) = registry.register(7);

        registry.unregister(7, conn);
        assert!(!registry.deliver(7, "gone".into()));
    }

    #[test]
    fn full_buffer_rejects_without_blocking() {
        let registry = ConnectionRegistry::new();
        let (_conn, mut rx) = registry.register(7);

        for i in 0..OUTBOUND_BUFFER {
            assert!(registry.deliver(7, format!("frame {i}")));
        }
        assert!(!registry.deliver(7, "overflow".into()));

        // Draining one slot makes room again.
        rx.try_recv().unwrap();
        assert!(registry.deliver(7, "after drain".into()));
    }

    #[test]
    fn users_do_not_share_channels() {
        let registry = ConnectionRegistry::new();
        // 7 and 23 land in the same shard.
        let (_a_conn, mut a_rx) = registry.register(7);
        let (_b_conn, mut b_rx) = registry.register(23);

        assert!(registry.deliver(23, "for b".into()));
        assert_eq!(b_rx.try_recv().unwrap(), "for b");
        assert_eq!(a_rx.try_recv(), Err(TryRecvError::Empty));
    }
}
