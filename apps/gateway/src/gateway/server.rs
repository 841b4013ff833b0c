//! WebSocket upgrade handler and per-connection event loop.

use std::fmt::Debug;
use std::time::Duration;

use axum::extract::ws::{CloseFrame, Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use futures_util::{Sink, SinkExt, StreamExt};
use roomcast_common::ConnectionId;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{self, Instant};

use crate::AppState;

use super::events::{ServerEvent, CLOSE_AUTH_TIMEOUT, CLOSE_PING_TIMEOUT};
use super::handler::{handle_text, Control};
use super::session::Outbound;

/// How long the writer gets to flush queued frames after the reader stops.
const WRITER_DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

/// Close code and reason handed to the writer. Travels outside the bounded
/// event queue so a full queue cannot swallow it.
type CloseRequest = (u16, String);

pub fn router() -> Router<AppState> {
    Router::new().route("/gateway", get(ws_upgrade))
}

async fn ws_upgrade(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_connection(socket, state))
}

async fn handle_connection(socket: WebSocket, state: AppState) {
    let (ws_tx, mut ws_rx) = socket.split();
    let gateway = state.gateway.clone();
    let config = state.config.clone();

    let (sender, outbound_rx) = gateway.open(config.outbound_buffer);
    let conn = sender.id().clone();
    tracing::info!(connection_id = %conn, "gateway connection opened");

    let (close_tx, close_rx) = oneshot::channel::<CloseRequest>();
    let mut writer = tokio::spawn(write_loop(conn.clone(), ws_tx, outbound_rx, close_rx));

    let auth_deadline = time::sleep(Duration::from_secs(config.auth_timeout_secs));
    tokio::pin!(auth_deadline);
    let mut authenticated = false;

    let ping_every = Duration::from_secs(config.ping_interval_secs);
    let mut ping_timer = time::interval_at(Instant::now() + ping_every, ping_every);
    let mut heard_from_peer = false;

    let mut close: Option<CloseRequest> = None;

    loop {
        tokio::select! {
            msg = ws_rx.next() => {
                if let Some(Ok(_)) = &msg {
                    heard_from_peer = true;
                }
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        match handle_text(&gateway, &conn, text.as_str()).await {
                            Control::Continue => {}
                            Control::Authenticated => authenticated = true,
                            Control::Close { code, reason } => {
                                close = Some((code, reason));
                                break;
                            }
                        }
                    }
                    Some(Ok(Message::Binary(_))) => {
                        gateway.reply(&conn, ServerEvent::error("Binary frames are not supported"));
                    }
                    Some(Ok(Message::Ping(_))) | Some(Ok(Message::Pong(_))) => {}
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(e)) => {
                        tracing::debug!(?e, connection_id = %conn, "ws read error");
                        break;
                    }
                }
            }

            _ = &mut auth_deadline, if !authenticated => {
                tracing::info!(connection_id = %conn, "authentication timeout, closing connection");
                let reason = "Authentication timeout";
                gateway.reply(&conn, ServerEvent::Disconnected { reason: reason.into() });
                close = Some((CLOSE_AUTH_TIMEOUT, reason.into()));
                break;
            }

            _ = ping_timer.tick() => {
                if !heard_from_peer {
                    tracing::info!(connection_id = %conn, "ping timeout, closing connection");
                    let reason = "Ping timeout";
                    gateway.reply(&conn, ServerEvent::Disconnected { reason: reason.into() });
                    close = Some((CLOSE_PING_TIMEOUT, reason.into()));
                    break;
                }
                heard_from_peer = false;
                sender.ping();
            }
        }
    }

    match close {
        Some(request) => {
            let _ = close_tx.send(request);
        }
        None => drop(close_tx),
    }

    let identity = gateway.disconnect(&conn);

    // With the registry entry gone this is the last sender, so the writer
    // stops once the queue is drained.
    drop(sender);
    if time::timeout(WRITER_DRAIN_TIMEOUT, &mut writer).await.is_err() {
        writer.abort();
    }

    tracing::info!(
        connection_id = %conn,
        user_id = identity.as_ref().map(|i| i.user_id.as_str()).unwrap_or("-"),
        "gateway connection closed"
    );
}

/// Drain a connection's outbound queue into its socket.
///
/// A close request flushes whatever is already queued, then sends the close
/// frame. Returns the sink once writing stops.
async fn write_loop<S>(
    conn: ConnectionId,
    mut ws_tx: S,
    mut outbound_rx: mpsc::Receiver<Outbound>,
    mut close_rx: oneshot::Receiver<CloseRequest>,
) -> S
where
    S: Sink<Message> + Unpin,
    S::Error: Debug,
{
    loop {
        tokio::select! {
            item = outbound_rx.recv() => {
                let Some(item) = item else {
                    break;
                };
                if write_item(&conn, &mut ws_tx, item).await.is_err() {
                    return ws_tx;
                }
            }

            request = &mut close_rx => {
                while let Ok(item) = outbound_rx.try_recv() {
                    if write_item(&conn, &mut ws_tx, item).await.is_err() {
                        return ws_tx;
                    }
                }
                match request {
                    Ok((code, reason)) => {
                        let _ = send_close(&mut ws_tx, code, &reason).await;
                    }
                    Err(_) => {
                        let _ = ws_tx.close().await;
                    }
                }
                return ws_tx;
            }
        }
    }

    // Queue closed first; a close request may still be waiting.
    match close_rx.await {
        Ok((code, reason)) => {
            let _ = send_close(&mut ws_tx, code, &reason).await;
        }
        Err(_) => {
            let _ = ws_tx.close().await;
        }
    }
    ws_tx
}

async fn write_item<S>(conn: &ConnectionId, ws_tx: &mut S, item: Outbound) -> Result<(), S::Error>
where
    S: Sink<Message> + Unpin,
    S::Error: Debug,
{
    let frame = match item {
        Outbound::Event(event) => match serde_json::to_string(&*event) {
            Ok(json) => Message::Text(json.into()),
            Err(e) => {
                tracing::warn!(connection_id = %conn, error = %e, "failed to encode event");
                return Ok(());
            }
        },
        Outbound::Ping => Message::Ping(Default::default()),
    };

    ws_tx.send(frame).await.inspect_err(|e| {
        tracing::debug!(?e, connection_id = %conn, "ws write error");
    })
}

/// Send a WebSocket close frame with a code and reason.
async fn send_close<S>(ws_tx: &mut S, code: u16, reason: &str) -> Result<(), S::Error>
where
    S: Sink<Message> + Unpin,
{
    let close_msg = Message::Close(Some(CloseFrame {
        code,
        reason: reason.to_string().into(),
    }));
    ws_tx.send(close_msg).await
}
