//! Signaling relay between peers.

use std::sync::Arc;

use roomcast_common::ConnectionId;
use serde_json::{Map, Value};

use super::events::ServerEvent;
use super::session::Delivery;
use super::Gateway;
use crate::error::GatewayError;

impl Gateway {
    /// Forward an opaque signaling payload, tagged with the sender.
    ///
    /// With a target the payload goes to that user's current connection only,
    /// regardless of `room_id`; an unknown or offline target is a silent miss.
    /// Without one it goes to every member of `room_id` except the sender.
    ///
    /// Returns how many connections accepted the event.
    pub fn relay_signal(
        &self,
        conn: &ConnectionId,
        room_id: &str,
        target_user_id: Option<&str>,
        payload: Map<String, Value>,
    ) -> Result<usize, GatewayError> {
        let sender = self.require_identity(conn)?;
        let event = Arc::new(ServerEvent::signal(payload, &sender));

        let Some(target) = target_user_id else {
            return Ok(self
                .rooms
                .broadcast(room_id, event, Some(conn), &self.registry));
        };

        let Some(target_conn) = self.registry.connection_for(target) else {
            tracing::debug!(
                connection_id = %conn,
                target_user_id = %target,
                "signal target not connected, dropping"
            );
            return Ok(0);
        };

        match self.registry.deliver(&target_conn, event) {
            Delivery::Sent => Ok(1),
            outcome => {
                tracing::debug!(
                    connection_id = %conn,
                    target_user_id = %target,
                    ?outcome,
                    "signal not delivered"
                );
                Ok(0)
            }
        }
    }
}
