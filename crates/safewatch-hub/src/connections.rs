//! Live user <-> connection bindings.
//!
//! This is the only source of "is this user online". A user has at most one
//! bound connection; binding again supersedes the old handle without tearing
//! it down. Removal is compare-then-clear so a late disconnect from a
//! superseded connection cannot evict the newer one.

use std::collections::HashMap;

use safewatch_shared::{ConnectionId, UserId};

/// Side effects of a [`ConnectionRegistry::bind`].
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct BindOutcome {
    /// The user's previous handle, now detached but not torn down.
    pub superseded_conn: Option<ConnectionId>,
    /// The user this connection was bound to before, now offline.
    pub evicted_user: Option<UserId>,
}

#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    by_user: HashMap<UserId, ConnectionId>,
    by_conn: HashMap<ConnectionId, UserId>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `user` to `conn`.
    ///
    /// The caller checks that `user` is registered.
    pub fn bind(&mut self, user: UserId, conn: ConnectionId) -> BindOutcome {
        let mut outcome = BindOutcome::default();

        // a connection re-authenticating as someone else takes the old user offline
        if let Some(prev_user) = self.by_conn.get(&conn).cloned() {
            if prev_user != user && self.unbind(&prev_user, conn) {
                outcome.evicted_user = Some(prev_user);
            }
        }

        if let Some(old) = self.by_user.insert(user.clone(), conn) {
            if old != conn {
                self.by_conn.remove(&old);
                outcome.superseded_conn = Some(old);
            }
        }
        self.by_conn.insert(conn, user);
        outcome
    }

    /// Remove the binding for `user` only if it is still `conn`.
    pub fn unbind(&mut self, user: &UserId, conn: ConnectionId) -> bool {
        match self.by_user.get(user) {
            Some(current) if *current == conn => {
                self.by_user.remove(user);
                self.by_conn.remove(&conn);
                true
            }
            _ => false,
        }
    }

    /// Disconnect path: unbind whichever user `conn` is currently bound to.
    ///
    /// Returns the user that went offline, or `None` if `conn` was never
    /// bound or has been superseded.
    pub fn release(&mut self, conn: ConnectionId) -> Option<UserId> {
        let user = self.by_conn.get(&conn)?.clone();
        self.unbind(&user, conn).then_some(user)
    }

    pub fn is_online(&self, user: &UserId) -> bool {
        self.by_user.contains_key(user)
    }

    pub fn lookup(&self, user: &UserId) -> Option<ConnectionId> {
        self.by_user.get(user).copied()
    }

    pub fn online_count(&self) -> usize {
        self.by_user.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bind_and_release() {
        let mut registry = ConnectionRegistry::new();
        let alice = UserId::from("alice");
        let conn = ConnectionId::new();

        assert_eq!(registry.bind(alice.clone(), conn), BindOutcome::default());
        assert!(registry.is_online(&alice));
        assert_eq!(registry.lookup(&alice), Some(conn));

        assert_eq!(registry.release(conn), Some(alice.clone()));
        assert!(!registry.is_online(&alice));
        assert_eq!(registry.release(conn), None);
    }

    #[test]
    fn test_supersede_then_stale_release_is_noop() {
        let mut registry = ConnectionRegistry::new();
        let alice = UserId::from("alice");
        let (conn1, conn2) = (ConnectionId::new(), ConnectionId::new());

        registry.bind(alice.clone(), conn1);
        let outcome = registry.bind(alice.clone(), conn2);
        assert_eq!(outcome.superseded_conn, Some(conn1));
        assert_eq!(outcome.evicted_user, None);

        assert_eq!(registry.release(conn1), None);
        assert!(!registry.unbind(&alice, conn1));
        assert_eq!(registry.lookup(&alice), Some(conn2));

        assert_eq!(registry.release(conn2), Some(alice.clone()));
        assert_eq!(registry.online_count(), 0);
    }

    #[test]
    fn test_rebind_same_connection() {
        let mut registry = ConnectionRegistry::new();
        let alice = UserId::from("alice");
        let conn = ConnectionId::new();

        registry.bind(alice.clone(), conn);
        assert_eq!(registry.bind(alice.clone(), conn), BindOutcome::default());
        assert_eq!(registry.online_count(), 1);
    }

    #[test]
    fn test_connection_switches_user() {
        let mut registry = ConnectionRegistry::new();
        let (alice, bob) = (UserId::from("alice"), UserId::from("bob"));
        let conn = ConnectionId::new();

        registry.bind(alice.clone(), conn);
        let outcome = registry.bind(bob.clone(), conn);
        assert_eq!(outcome.evicted_user, Some(alice.clone()));
        assert_eq!(outcome.superseded_conn, None);

        assert!(!registry.is_online(&alice));
        assert_eq!(registry.lookup(&bob), Some(conn));
        assert_eq!(registry.release(conn), Some(bob));
        assert_eq!(registry.online_count(), 0);
    }
}
