//! Gateway event types and wire-format messages.
//!
//! Every frame in either direction is a JSON text frame of the shape
//! `{"event": "<name>", "data": {...}}`.

use roomcast_common::{ConnectionId, UserIdentity};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

// ---------------------------------------------------------------------------
// Close codes (4000-range for application-level)
// ---------------------------------------------------------------------------

pub const CLOSE_AUTH_TIMEOUT: u16 = 4003;
pub const CLOSE_AUTH_FAILED: u16 = 4004;
pub const CLOSE_PING_TIMEOUT: u16 = 4009;

// ---------------------------------------------------------------------------
// Client → Server
// ---------------------------------------------------------------------------

/// A message received from the client.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum ClientMessage {
    Authenticate(AuthenticatePayload),
    JoinRoom(RoomPayload),
    LeaveRoom(RoomPayload),
    WebrtcSignal(SignalPayload),
    StartStream(StartStreamPayload),
    StopStream(StopStreamPayload),
}

impl ClientMessage {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Authenticate(_) => "authenticate",
            Self::JoinRoom(_) => "join-room",
            Self::LeaveRoom(_) => "leave-room",
            Self::WebrtcSignal(_) => "webrtc-signal",
            Self::StartStream(_) => "start-stream",
            Self::StopStream(_) => "stop-stream",
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AuthenticatePayload {
    #[serde(alias = "token")]
    pub credential: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomPayload {
    pub room_id: String,
}

/// A signaling message. Everything except the routing fields is opaque and
/// forwarded untouched.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignalPayload {
    pub room_id: String,
    #[serde(default)]
    pub target_user_id: Option<String>,
    #[serde(flatten)]
    pub payload: Map<String, Value>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartStreamPayload {
    pub room_id: String,
    #[serde(default)]
    pub stream_data: Value,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StopStreamPayload {
    pub stream_id: String,
    pub room_id: String,
}

// ---------------------------------------------------------------------------
// Server → Client
// ---------------------------------------------------------------------------

/// An event sent from the server to one client.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum ServerEvent {
    #[serde(rename_all = "camelCase")]
    Connected { connection_id: ConnectionId },
    Disconnected { reason: String },
    Authenticated { user: UserIdentity },
    AuthenticationFailed { reason: String },
    #[serde(rename_all = "camelCase")]
    RoomJoined {
        room_id: String,
        members: Vec<UserIdentity>,
    },
    UserJoined(UserIdentity),
    UserLeft(UserIdentity),
    /// The sender's opaque payload plus `fromUserId` / `fromUsername`.
    WebrtcSignal(Map<String, Value>),
    #[serde(rename_all = "camelCase")]
    StreamStarted {
        stream_id: String,
        streamer_id: String,
        streamer_name: String,
    },
    #[serde(rename_all = "camelCase")]
    StreamStopped { stream_id: String },
    #[serde(rename_all = "camelCase")]
    StreamStartSuccess { stream_id: String },
    #[serde(rename_all = "camelCase")]
    StreamStopSuccess { stream_id: String },
    Error { message: String },
}

impl ServerEvent {
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }

    /// Tag an opaque signal payload with its sender.
    pub fn signal(mut payload: Map<String, Value>, from: &UserIdentity) -> Self {
        payload.insert("fromUserId".to_string(), Value::String(from.user_id.clone()));
        payload.insert("fromUsername".to_string(), Value::String(from.username.clone()));
        Self::WebrtcSignal(payload)
    }
}
