//! Inbound frame dispatch.
//!
//! Parses one text frame, routes it to the matching [`Gateway`] operation and
//! turns failures into events for the caller. Only an authentication failure
//! ends the connection.

use roomcast_common::ConnectionId;

use super::events::{ClientMessage, ServerEvent, CLOSE_AUTH_FAILED};
use super::Gateway;
use crate::error::GatewayError;

/// What the connection loop should do after a frame has been handled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Control {
    Continue,
    /// The connection just authenticated; the auth deadline no longer applies.
    Authenticated,
    /// Send a close frame and stop reading.
    Close { code: u16, reason: String },
}

/// Handle one text frame from `conn`.
pub async fn handle_text(gateway: &Gateway, conn: &ConnectionId, text: &str) -> Control {
    let message: ClientMessage = match serde_json::from_str(text) {
        Ok(message) => message,
        Err(e) => {
            tracing::debug!(connection_id = %conn, error = %e, "unparseable frame");
            gateway.reply(conn, ServerEvent::error(GatewayError::invalid(e.to_string()).to_string()));
            return Control::Continue;
        }
    };

    let name = message.name();
    match dispatch(gateway, conn, message).await {
        Ok(control) => control,
        Err(e) if e.is_terminal() => {
            let reason = e.to_string();
            tracing::info!(connection_id = %conn, %reason, "authentication failed");
            gateway.reply(
                conn,
                ServerEvent::AuthenticationFailed {
                    reason: reason.clone(),
                },
            );
            gateway.reply(
                conn,
                ServerEvent::Disconnected {
                    reason: reason.clone(),
                },
            );
            Control::Close {
                code: CLOSE_AUTH_FAILED,
                reason,
            }
        }
        Err(e) => {
            tracing::debug!(connection_id = %conn, event = name, error = %e, "request failed");
            gateway.reply(conn, ServerEvent::error(e.to_string()));
            Control::Continue
        }
    }
}

async fn dispatch(
    gateway: &Gateway,
    conn: &ConnectionId,
    message: ClientMessage,
) -> Result<Control, GatewayError> {
    match message {
        ClientMessage::Authenticate(p) => {
            gateway.authenticate(conn, &p.credential).await?;
            return Ok(Control::Authenticated);
        }
        ClientMessage::JoinRoom(p) => {
            gateway.join_room(conn, &p.room_id)?;
        }
        ClientMessage::LeaveRoom(p) => {
            gateway.leave_room(conn, &p.room_id)?;
        }
        ClientMessage::WebrtcSignal(p) => {
            gateway.relay_signal(conn, &p.room_id, p.target_user_id.as_deref(), p.payload)?;
        }
        ClientMessage::StartStream(p) => {
            gateway.start_stream(conn, &p.room_id, &p.stream_data).await?;
        }
        ClientMessage::StopStream(p) => {
            gateway.stop_stream(conn, &p.stream_id, &p.room_id).await?;
        }
    }
    Ok(Control::Continue)
}
