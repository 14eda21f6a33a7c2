//! Connection registry: which room and user a connection belongs to

use dashmap::DashMap;
use std::collections::HashSet;

/// Room/user assignment of one connection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub room_id: String,
    pub user_id: String,
}

impl Session {
    pub fn new(room_id: impl Into<String>, user_id: impl Into<String>) -> Self {
        Self {
            room_id: room_id.into(),
            user_id: user_id.into(),
        }
    }
}

/// Registry of live connections, keyed by connection id
pub struct ConnectionRegistry {
    sessions: DashMap<String, Session>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self {
            sessions: DashMap::new(),
        }
    }

    /// Record a connection's assignment. A reconnect under the same id replaces
    /// the previous assignment, which is returned.
    pub fn register(
        &self,
        connection_id: &str,
        room_id: impl Into<String>,
        user_id: impl Into<String>,
    ) -> Option<Session> {
        self.sessions
            .insert(connection_id.to_string(), Session::new(room_id, user_id))
    }

    /// Room the connection belongs to
    pub fn lookup(&self, connection_id: &str) -> Option<String> {
        self.sessions
            .get(connection_id)
            .map(|s| s.value().room_id.clone())
    }

    pub fn user_id(&self, connection_id: &str) -> Option<String> {
        self.sessions
            .get(connection_id)
            .map(|s| s.value().user_id.clone())
    }

    pub fn session(&self, connection_id: &str) -> Option<Session> {
        self.sessions.get(connection_id).map(|s| s.value().clone())
    }

    pub fn unregister(&self, connection_id: &str) -> Option<Session> {
        self.sessions.remove(connection_id).map(|(_, s)| s)
    }

    /// Connection ids currently assigned to a room
    pub fn members(&self, room_id: &str) -> Vec<String> {
        self.sessions
            .iter()
            .filter(|entry| entry.value().room_id == room_id)
            .map(|entry| entry.key().clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Number of distinct rooms with at least one connection
    pub fn room_count(&self) -> usize {
        self.sessions
            .iter()
            .map(|entry| entry.value().room_id.clone())
            .collect::<HashSet<_>>()
            .len()
    }
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}
