//! Connect/disconnect hooks
//!
//! Room and user assignment is decided outside the core. The intake loop asks
//! the hooks on every connect and stores whatever they return.

use tracing::debug;

use crate::protocol::DisconnectReason;

use super::Session;

pub trait SessionHooks: Send + Sync + 'static {
    /// Decide the room/user for a new connection. `None` leaves it unregistered,
    /// so its messages are dropped.
    fn on_connect(&self, connection_id: &str, payload: &[u8]) -> Option<Session>;

    /// Called after the registry entry (if any) has been removed
    fn on_disconnect(
        &self,
        _connection_id: &str,
        _session: Option<&Session>,
        _reason: DisconnectReason,
    ) {
    }
}

/// Hooks that never assign a room
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopHooks;

impl SessionHooks for NoopHooks {
    fn on_connect(&self, connection_id: &str, _payload: &[u8]) -> Option<Session> {
        debug!(
            connection_id = %connection_id,
            "No session hook configured, connection left unassigned"
        );
        None
    }
}

/// Puts every connection into one room; the connection id doubles as user id
#[derive(Debug, Clone)]
pub struct FixedRoomHooks {
    room_id: String,
}

impl FixedRoomHooks {
    pub fn new(room_id: impl Into<String>) -> Self {
        Self {
            room_id: room_id.into(),
        }
    }
}

impl SessionHooks for FixedRoomHooks {
    fn on_connect(&self, connection_id: &str, _payload: &[u8]) -> Option<Session> {
        Some(Session::new(self.room_id.clone(), connection_id))
    }
}
