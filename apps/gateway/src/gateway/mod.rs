//! The real-time gateway: connection lifecycle, room membership and relay.
//!
//! [`Gateway`] owns all shared state and is the only way to reach it. The
//! WebSocket transport in [`server`] drives one connection per task and calls
//! into it; everything here is transport-agnostic and never blocks on a peer.

pub mod events;
pub mod handler;
pub mod registry;
pub mod relay;
pub mod rooms;
pub mod server;
pub mod session;
pub mod stream_control;

use std::sync::Arc;

use roomcast_common::{ConnectionId, UserIdentity};
use tokio::sync::mpsc;

use crate::auth::AuthValidator;
use crate::error::GatewayError;
use crate::streams::StreamDirectory;

use self::events::ServerEvent;
use self::registry::ConnectionRegistry;
use self::rooms::RoomTable;
use self::session::{ConnectionSender, Delivery, Outbound};

pub struct Gateway {
    registry: ConnectionRegistry,
    rooms: RoomTable,
    auth: Arc<dyn AuthValidator>,
    streams: Arc<dyn StreamDirectory>,
}

impl Gateway {
    pub fn new(auth: Arc<dyn AuthValidator>, streams: Arc<dyn StreamDirectory>) -> Self {
        Self {
            registry: ConnectionRegistry::new(),
            rooms: RoomTable::new(),
            auth,
            streams,
        }
    }

    pub fn registry(&self) -> &ConnectionRegistry {
        &self.registry
    }

    pub fn rooms(&self) -> &RoomTable {
        &self.rooms
    }

    /// Register a new, unauthenticated connection and greet it with
    /// `connected`.
    ///
    /// The caller owns the receiver and must drain it into the socket.
    pub fn open(&self, outbound_capacity: usize) -> (ConnectionSender, mpsc::Receiver<Outbound>) {
        let (sender, rx) = ConnectionSender::channel(outbound_capacity);
        self.registry.open(sender.clone());
        sender.deliver(Arc::new(ServerEvent::Connected {
            connection_id: sender.id().clone(),
        }));
        (sender, rx)
    }

    /// Authentication gate. On success the connection is registered for its
    /// user and receives `authenticated`.
    ///
    /// An `Err(GatewayError::Auth(_))` means the caller must close the
    /// connection; any other error is reported on it.
    pub async fn authenticate(
        &self,
        conn: &ConnectionId,
        credential: &str,
    ) -> Result<UserIdentity, GatewayError> {
        if !self.registry.is_open(conn) {
            return Err(GatewayError::UnknownConnection);
        }
        if self.registry.identity(conn).is_some() {
            return Err(GatewayError::AlreadyAuthenticated);
        }

        let identity = self.auth.validate(credential).await?;

        if let Some(previous) = self.registry.authenticate(conn, identity.clone())? {
            // The old connection stays open but is no longer reachable by user
            // id. It will be cleaned up when its own socket closes.
            tracing::warn!(
                user_id = %identity.user_id,
                connection_id = %conn,
                previous_connection_id = %previous,
                "user authenticated again; previous connection no longer receives directed events"
            );
        }

        self.reply(
            conn,
            ServerEvent::Authenticated {
                user: identity.clone(),
            },
        );
        tracing::info!(
            connection_id = %conn,
            user_id = %identity.user_id,
            username = %identity.username,
            "connection authenticated"
        );
        Ok(identity)
    }

    /// Join a room. Returns the member snapshot sent back in `room-joined`.
    pub fn join_room(
        &self,
        conn: &ConnectionId,
        room_id: &str,
    ) -> Result<Vec<UserIdentity>, GatewayError> {
        let identity = self.require_identity(conn)?;
        if room_id.trim().is_empty() {
            return Err(GatewayError::bad_request("roomId must not be empty"));
        }

        let members = self.rooms.join(conn, &identity, room_id, &self.registry);
        tracing::debug!(
            connection_id = %conn,
            user_id = %identity.user_id,
            %room_id,
            members = members.len(),
            "joined room"
        );
        Ok(members)
    }

    /// Leave a room. Leaving a room the connection is not in is a no-op.
    pub fn leave_room(&self, conn: &ConnectionId, room_id: &str) -> Result<bool, GatewayError> {
        let identity = self.require_identity(conn)?;
        let left = self
            .rooms
            .leave(conn, Some(&identity), room_id, &self.registry);
        if left {
            tracing::debug!(connection_id = %conn, user_id = %identity.user_id, %room_id, "left room");
        }
        Ok(left)
    }

    /// Tear down everything the gateway holds for a closed connection.
    ///
    /// Leaves every room (notifying the remaining members), then drops the
    /// registry entry. The user mapping is removed only if it still points at
    /// this connection.
    pub fn disconnect(&self, conn: &ConnectionId) -> Option<UserIdentity> {
        let identity = self.registry.identity(conn);
        let rooms = self
            .rooms
            .leave_all(conn, identity.as_ref(), &self.registry);
        self.registry.close(conn);

        tracing::info!(
            connection_id = %conn,
            user_id = identity.as_ref().map(|i| i.user_id.as_str()).unwrap_or("-"),
            rooms_left = rooms.len(),
            "connection cleaned up"
        );
        identity
    }

    /// Send an event to one connection (best-effort).
    pub fn reply(&self, conn: &ConnectionId, event: ServerEvent) -> Delivery {
        self.registry.deliver(conn, Arc::new(event))
    }

    fn require_identity(&self, conn: &ConnectionId) -> Result<UserIdentity, GatewayError> {
        self.registry
            .identity(conn)
            .ok_or(GatewayError::NotAuthenticated)
    }
}
