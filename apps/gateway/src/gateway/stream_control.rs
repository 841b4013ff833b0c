//! Stream start/stop: delegate to the stream directory, then tell the room.

use std::sync::Arc;

use roomcast_common::{ConnectionId, UserIdentity};
use serde_json::Value;

use super::events::ServerEvent;
use super::Gateway;
use crate::error::GatewayError;
use crate::streams::StreamRecord;

impl Gateway {
    /// Start a stream in a room. Directory errors come back unchanged and
    /// nothing is broadcast.
    pub async fn start_stream(
        &self,
        conn: &ConnectionId,
        room_id: &str,
        stream_data: &Value,
    ) -> Result<StreamRecord, GatewayError> {
        let identity = self.require_identity(conn)?;

        let record = self
            .streams
            .start_stream(&identity.user_id, room_id, stream_data)
            .await?;

        self.notify_stream_started(room_id, &record.id, &identity);
        self.reply(
            conn,
            ServerEvent::StreamStartSuccess {
                stream_id: record.id.clone(),
            },
        );
        tracing::info!(
            connection_id = %conn,
            user_id = %identity.user_id,
            %room_id,
            stream_id = %record.id,
            "stream started"
        );
        Ok(record)
    }

    pub async fn stop_stream(
        &self,
        conn: &ConnectionId,
        stream_id: &str,
        room_id: &str,
    ) -> Result<(), GatewayError> {
        let identity = self.require_identity(conn)?;

        self.streams
            .stop_stream(stream_id, &identity.user_id)
            .await?;

        self.notify_stream_stopped(room_id, stream_id);
        self.reply(
            conn,
            ServerEvent::StreamStopSuccess {
                stream_id: stream_id.to_string(),
            },
        );
        tracing::info!(
            connection_id = %conn,
            user_id = %identity.user_id,
            %room_id,
            %stream_id,
            "stream stopped"
        );
        Ok(())
    }

    /// Broadcast `stream-started` to every member of the room, streamer
    /// included.
    pub fn notify_stream_started(
        &self,
        room_id: &str,
        stream_id: &str,
        streamer: &UserIdentity,
    ) -> usize {
        let event = ServerEvent::StreamStarted {
            stream_id: stream_id.to_string(),
            streamer_id: streamer.user_id.clone(),
            streamer_name: streamer.username.clone(),
        };
        self.rooms
            .broadcast(room_id, Arc::new(event), None, &self.registry)
    }

    pub fn notify_stream_stopped(&self, room_id: &str, stream_id: &str) -> usize {
        let event = ServerEvent::StreamStopped {
            stream_id: stream_id.to_string(),
        };
        self.rooms
            .broadcast(room_id, Arc::new(event), None, &self.registry)
    }
}
