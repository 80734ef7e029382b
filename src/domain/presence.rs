//! In-process registry of connection-to-identity bindings.
//!
//! Authoritative for "is this connection currently bound". Never persisted;
//! lost on restart, after which stale durable statuses age out via the
//! reconciliation sweep. Callers are responsible for keeping the durable
//! presence status in agreement.

use std::collections::{HashMap, HashSet};
use std::sync::RwLock;

use super::{ConnectionId, UserId};

/// Bidirectional connection ↔ identity table.
///
/// All operations are atomic with respect to each other and never suspend.
/// Constructed once at process start and injected; tests get fresh instances.
#[derive(Debug, Default)]
pub struct PresenceRegistry {
    inner: RwLock<Bindings>,
}

#[derive(Debug, Default)]
struct Bindings {
    by_connection: HashMap<ConnectionId, UserId>,
    by_user: HashMap<UserId, ConnectionId>,
}

impl PresenceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind a connection to an identity.
    ///
    /// Supersedes both any previous identity bound to this connection and any
    /// previous connection bound to this identity (at most one live
    /// connection per identity at any instant). The superseded connection is
    /// unbound, not closed.
    pub fn bind(&self, connection: ConnectionId, user_id: UserId) {
        let mut inner = self.inner.write().expect("presence registry poisoned");
        if let Some(previous_user) = inner.by_connection.insert(connection, user_id) {
            if previous_user != user_id {
                inner.by_user.remove(&previous_user);
            }
        }
        if let Some(previous_conn) = inner.by_user.insert(user_id, connection) {
            if previous_conn != connection {
                inner.by_connection.remove(&previous_conn);
            }
        }
    }

    /// Drop the binding for a connection, if any. Returns the identity that
    /// was bound.
    pub fn unbind(&self, connection: &ConnectionId) -> Option<UserId> {
        let mut inner = self.inner.write().expect("presence registry poisoned");
        let user_id = inner.by_connection.remove(connection)?;
        // Only clear the reverse edge if it still points at this connection;
        // a rebind may already have superseded it.
        if inner.by_user.get(&user_id) == Some(connection) {
            inner.by_user.remove(&user_id);
        }
        Some(user_id)
    }

    pub fn identity_for(&self, connection: &ConnectionId) -> Option<UserId> {
        let inner = self.inner.read().expect("presence registry poisoned");
        inner.by_connection.get(connection).copied()
    }

    pub fn connection_for(&self, user_id: &UserId) -> Option<ConnectionId> {
        let inner = self.inner.read().expect("presence registry poisoned");
        inner.by_user.get(user_id).copied()
    }

    pub fn live_connections(&self) -> HashSet<ConnectionId> {
        let inner = self.inner.read().expect("presence registry poisoned");
        inner.by_connection.keys().copied().collect()
    }
}
