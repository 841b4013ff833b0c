use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use roomcast_common::id::{prefix, prefixed_ulid};
use serde_json::Value;

use super::{StreamDirectory, StreamKind, StreamRecord, StreamStatus};
use crate::error::GatewayError;

const DEFAULT_TITLE: &str = "Live Stream";

#[derive(Default)]
struct DirectoryState {
    /// room id -> owner user id
    rooms: HashMap<String, String>,
    /// stream id -> record
    streams: HashMap<String, StreamRecord>,
}

/// Process-local stream directory.
///
/// Rooms must be registered with their owner before streams can start in them.
pub struct MemoryStreamDirectory {
    state: Mutex<DirectoryState>,
}

impl MemoryStreamDirectory {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(DirectoryState::default()),
        }
    }

    pub fn with_rooms<I, R, O>(rooms: I) -> Self
    where
        I: IntoIterator<Item = (R, O)>,
        R: Into<String>,
        O: Into<String>,
    {
        let directory = Self::new();
        for (room_id, owner_id) in rooms {
            directory.register_room(room_id, owner_id);
        }
        directory
    }

    /// Register (or re-assign) a room and its owner.
    pub fn register_room(&self, room_id: impl Into<String>, owner_id: impl Into<String>) {
        self.state.lock().rooms.insert(room_id.into(), owner_id.into());
    }

    pub fn stream(&self, stream_id: &str) -> Option<StreamRecord> {
        self.state.lock().streams.get(stream_id).cloned()
    }

    pub fn active_stream(&self, room_id: &str) -> Option<StreamRecord> {
        self.state
            .lock()
            .streams
            .values()
            .find(|s| s.room_id == room_id && s.status == StreamStatus::Active)
            .cloned()
    }
}

impl Default for MemoryStreamDirectory {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StreamDirectory for MemoryStreamDirectory {
    async fn start_stream(
        &self,
        user_id: &str,
        room_id: &str,
        data: &Value,
    ) -> Result<StreamRecord, GatewayError> {
        let mut state = self.state.lock();

        let owner = state
            .rooms
            .get(room_id)
            .ok_or_else(|| GatewayError::not_found("Room not found"))?;
        if owner != user_id {
            return Err(GatewayError::forbidden("Only room owner can start streams"));
        }

        let already_live = state
            .streams
            .values()
            .any(|s| s.room_id == room_id && s.status == StreamStatus::Active);
        if already_live {
            return Err(GatewayError::forbidden("Room already has an active stream"));
        }

        let title = data
            .get("title")
            .and_then(Value::as_str)
            .filter(|t| !t.is_empty())
            .unwrap_or(DEFAULT_TITLE)
            .to_string();

        let record = StreamRecord {
            id: prefixed_ulid(prefix::STREAM),
            room_id: room_id.to_string(),
            streamer_id: user_id.to_string(),
            title,
            kind: StreamKind::from_hint(data.get("type").and_then(Value::as_str)),
            status: StreamStatus::Active,
            metadata: data.clone(),
            started_at: Utc::now(),
            ended_at: None,
        };
        state.streams.insert(record.id.clone(), record.clone());

        Ok(record)
    }

    async fn stop_stream(&self, stream_id: &str, user_id: &str) -> Result<(), GatewayError> {
        let mut state = self.state.lock();

        let stream = state
            .streams
            .get_mut(stream_id)
            .ok_or_else(|| GatewayError::not_found("Stream not found"))?;
        if stream.streamer_id != user_id {
            return Err(GatewayError::forbidden("Only stream owner can stop the stream"));
        }

        stream.status = StreamStatus::Ended;
        stream.ended_at = Some(Utc::now());
        Ok(())
    }
}
