//! Connection registry: every open connection, and the user → connection
//! index used for directed delivery.
//!
//! Uses `DashMap` for shard-level concurrency. The two maps are independent;
//! nothing here ever holds a guard on one while locking the other.

use std::sync::Arc;

use dashmap::DashMap;
use roomcast_common::{ConnectionId, UserIdentity};

use super::events::ServerEvent;
use super::session::{ConnectionSender, Delivery};
use crate::error::GatewayError;

struct ConnectionEntry {
    sender: ConnectionSender,
    /// Set once by a successful authentication, never changed afterwards.
    identity: Option<UserIdentity>,
}

#[derive(Default)]
pub struct ConnectionRegistry {
    connections: DashMap<ConnectionId, ConnectionEntry>,
    /// user id -> the connection currently reachable for that user
    users: DashMap<String, ConnectionId>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Track a freshly opened, unauthenticated connection.
    pub fn open(&self, sender: ConnectionSender) {
        let id = sender.id().clone();
        self.connections.insert(
            id,
            ConnectionEntry {
                sender,
                identity: None,
            },
        );
    }

    /// Attach an identity to a connection and make it the user's reachable
    /// connection.
    ///
    /// Returns the connection that was previously registered for the user, if
    /// any. That connection stays open but can no longer be reached by user id.
    pub fn authenticate(
        &self,
        id: &ConnectionId,
        identity: UserIdentity,
    ) -> Result<Option<ConnectionId>, GatewayError> {
        {
            let mut entry = self
                .connections
                .get_mut(id)
                .ok_or(GatewayError::UnknownConnection)?;
            if entry.identity.is_some() {
                return Err(GatewayError::AlreadyAuthenticated);
            }
            entry.identity = Some(identity.clone());
        }

        let previous = self.users.insert(identity.user_id, id.clone());
        Ok(previous.filter(|prev| prev != id))
    }

    /// Forget a connection. The user index entry is removed only if it still
    /// points at this connection, so a newer connection for the same user
    /// stays reachable.
    pub fn close(&self, id: &ConnectionId) -> Option<UserIdentity> {
        let (_, entry) = self.connections.remove(id)?;
        let identity = entry.identity?;
        self.users.remove_if(&identity.user_id, |_, current| current == id);
        Some(identity)
    }

    pub fn identity(&self, id: &ConnectionId) -> Option<UserIdentity> {
        self.connections.get(id)?.identity.clone()
    }

    pub fn is_open(&self, id: &ConnectionId) -> bool {
        self.connections.contains_key(id)
    }

    /// The connection currently registered for a user.
    pub fn connection_for(&self, user_id: &str) -> Option<ConnectionId> {
        self.users.get(user_id).map(|c| c.value().clone())
    }

    /// Best-effort delivery to one connection. Never blocks.
    pub fn deliver(&self, id: &ConnectionId, event: Arc<ServerEvent>) -> Delivery {
        match self.connections.get(id) {
            Some(entry) => entry.sender.deliver(event),
            None => Delivery::Missed,
        }
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    pub fn user_count(&self) -> usize {
        self.users.len()
    }
}
