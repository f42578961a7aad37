//! Connection registry — who is online and which rooms they joined.
//!
//! DESIGN
//! ======
//! The registry is the single source of truth for live connections. Each
//! entry holds the connection's identity (set once, after the handshake),
//! its room set, and the sender half of its outbound frame channel.
//!
//! Membership is pure in-memory state: nothing here touches Postgres, and
//! a connection's rooms disappear with its entry on `unregister`.
//!
//! Every method takes the lock for the duration of one synchronous step and
//! never holds it across an await, so `members_of` always reflects the state
//! at call time.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tokio::sync::{RwLock, mpsc};
use uuid::Uuid;

use crate::frame::ServerFrame;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("connection not registered: {0}")]
    UnknownConnection(Uuid),
    #[error("connection already authenticated: {0}")]
    AlreadyAuthenticated(Uuid),
    #[error("connection not authenticated: {0}")]
    NotAuthenticated(Uuid),
}

/// One live transport-level connection.
#[derive(Debug)]
pub struct Connection {
    /// `None` until the authentication frame succeeds.
    pub user_id: Option<String>,
    pub rooms: HashSet<String>,
    pub tx: mpsc::Sender<ServerFrame>,
}

/// A room member as seen by fan-out.
#[derive(Debug, Clone)]
pub struct RoomMember {
    pub connection_id: Uuid,
    pub user_id: String,
    pub tx: mpsc::Sender<ServerFrame>,
}

#[derive(Clone, Default)]
pub struct ConnectionRegistry {
    connections: Arc<RwLock<HashMap<Uuid, Connection>>>,
}

impl ConnectionRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an unauthenticated connection.
    pub async fn register(&self, connection_id: Uuid, tx: mpsc::Sender<ServerFrame>) {
        let mut connections = self.connections.write().await;
        connections.insert(connection_id, Connection { user_id: None, rooms: HashSet::new(), tx });
    }

    /// Bind an identity to a connection. Identity is set exactly once.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::AlreadyAuthenticated`] on a second call and
    /// [`RegistryError::UnknownConnection`] if the connection is gone.
    pub async fn authenticate(&self, connection_id: Uuid, user_id: &str) -> Result<(), RegistryError> {
        let mut connections = self.connections.write().await;
        let conn = connections
            .get_mut(&connection_id)
            .ok_or(RegistryError::UnknownConnection(connection_id))?;
        if conn.user_id.is_some() {
            return Err(RegistryError::AlreadyAuthenticated(connection_id));
        }
        conn.user_id = Some(user_id.to_owned());
        Ok(())
    }

    /// Add a room to the connection's set. Returns `false` if already joined.
    ///
    /// # Errors
    ///
    /// Unauthenticated connections may not join rooms.
    pub async fn join_room(&self, connection_id: Uuid, room_id: &str) -> Result<bool, RegistryError> {
        let mut connections = self.connections.write().await;
        let conn = connections
            .get_mut(&connection_id)
            .ok_or(RegistryError::UnknownConnection(connection_id))?;
        if conn.user_id.is_none() {
            return Err(RegistryError::NotAuthenticated(connection_id));
        }
        if conn.rooms.contains(room_id) {
            return Ok(false);
        }
        conn.rooms.insert(room_id.to_owned());
        Ok(true)
    }

    /// Remove a room from the connection's set. Returns `false` if it was not joined.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::UnknownConnection`] if the connection is gone.
    pub async fn leave_room(&self, connection_id: Uuid, room_id: &str) -> Result<bool, RegistryError> {
        let mut connections = self.connections.write().await;
        let conn = connections
            .get_mut(&connection_id)
            .ok_or(RegistryError::UnknownConnection(connection_id))?;
        Ok(conn.rooms.remove(room_id))
    }

    /// Drop the connection and every membership it held. Safe for
    /// connections that never authenticated or were already removed.
    pub async fn unregister(&self, connection_id: Uuid) -> Option<Connection> {
        let mut connections = self.connections.write().await;
        connections.remove(&connection_id)
    }

    pub async fn is_member(&self, connection_id: Uuid, room_id: &str) -> bool {
        let connections = self.connections.read().await;
        connections
            .get(&connection_id)
            .is_some_and(|conn| conn.rooms.contains(room_id))
    }

    /// Authenticated connections currently in `room_id`.
    pub async fn members_of(&self, room_id: &str) -> Vec<RoomMember> {
        let connections = self.connections.read().await;
        connections
            .iter()
            .filter(|(_, conn)| conn.rooms.contains(room_id))
            .filter_map(|(connection_id, conn)| {
                let user_id = conn.user_id.clone()?;
                Some(RoomMember { connection_id: *connection_id, user_id, tx: conn.tx.clone() })
            })
            .collect()
    }

    /// Live connections, authenticated or not.
    pub async fn connection_count(&self) -> usize {
        self.connections.read().await.len()
    }
}

#[cfg(test)]
#[path = "registry_test.rs"]
mod tests;
