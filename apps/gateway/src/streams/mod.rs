//! The stream directory: the collaborator that durably records stream state.

pub mod memory;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::GatewayError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamKind {
    Webrtc,
    Rtmp,
    Hls,
}

impl StreamKind {
    /// Parse the client-supplied `type` field; unknown values fall back to WebRTC.
    pub fn from_hint(hint: Option<&str>) -> Self {
        match hint {
            Some("rtmp") => Self::Rtmp,
            Some("hls") => Self::Hls,
            _ => Self::Webrtc,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamStatus {
    Active,
    Ended,
}

/// A stream as recorded by the directory.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamRecord {
    pub id: String,
    pub room_id: String,
    pub streamer_id: String,
    pub title: String,
    pub kind: StreamKind,
    pub status: StreamStatus,
    /// The raw `streamData` the streamer sent.
    pub metadata: Value,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
}

/// Records stream start/stop. The gateway only broadcasts after these succeed,
/// and surfaces their errors verbatim without retrying.
#[async_trait]
pub trait StreamDirectory: Send + Sync {
    async fn start_stream(
        &self,
        user_id: &str,
        room_id: &str,
        data: &Value,
    ) -> Result<StreamRecord, GatewayError>;

    async fn stop_stream(&self, stream_id: &str, user_id: &str) -> Result<(), GatewayError>;
}
