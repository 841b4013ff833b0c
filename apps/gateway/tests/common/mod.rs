#![allow(dead_code)]

use std::net::SocketAddr;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use serde_json::Value;
use tokio::net::TcpStream;
use tokio::time;
use tokio_tungstenite::tungstenite::{self, protocol::frame::coding::CloseCode};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use roomcast_gateway::auth::jwt::AccessClaims;
use roomcast_gateway::config::Config;
use roomcast_gateway::AppState;

pub const TEST_SECRET: &str = "integration-test-secret";

pub type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Config with the test secret and room `r1` owned by `u1`.
pub fn test_config() -> Config {
    let mut config = Config::with_secret(TEST_SECRET);
    config.room_owners = vec![("r1".to_string(), "u1".to_string())];
    config
}

/// Start an actual TCP server for WebSocket testing. The server runs in the
/// background for the rest of the test.
pub async fn start_server(config: Config) -> (SocketAddr, AppState) {
    let state = AppState::from_config(config);
    let app = roomcast_gateway::app(state.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind");
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (addr, state)
}

/// Mint an HS256 access token the way the auth service does.
pub fn mint_token(user_id: &str, username: &str) -> String {
    mint_token_with(TEST_SECRET, user_id, username, 300)
}

pub fn mint_token_with(secret: &str, user_id: &str, username: &str, ttl_secs: i64) -> String {
    let now = chrono::Utc::now().timestamp();
    let claims = AccessClaims {
        sub: user_id.to_string(),
        username: username.to_string(),
        iat: now,
        exp: now + ttl_secs,
    };
    jsonwebtoken::encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .expect("mint test token")
}

/// Open a WebSocket and consume the `connected` greeting.
/// Returns the stream and the server-assigned connection id.
pub async fn connect(addr: SocketAddr) -> (WsStream, String) {
    let url = format!("ws://{addr}/gateway");
    let (mut ws, _) = tokio_tungstenite::connect_async(&url)
        .await
        .expect("ws connect");

    let greeting = recv_event(&mut ws).await;
    assert_eq!(greeting["event"], "connected");
    let connection_id = greeting["data"]["connectionId"]
        .as_str()
        .expect("connectionId present")
        .to_string();

    (ws, connection_id)
}

/// Connect and authenticate as `user_id`, consuming the `authenticated` reply.
pub async fn login(addr: SocketAddr, user_id: &str, username: &str) -> WsStream {
    let (mut ws, _) = connect(addr).await;
    send_event(
        &mut ws,
        "authenticate",
        serde_json::json!({ "token": mint_token(user_id, username) }),
    )
    .await;

    let reply = recv_event(&mut ws).await;
    assert_eq!(reply["event"], "authenticated", "{reply}");
    assert_eq!(reply["data"]["user"]["userId"], user_id);
    ws
}

pub async fn send_event(ws: &mut WsStream, event: &str, data: Value) {
    let frame = serde_json::json!({ "event": event, "data": data });
    ws.send(tungstenite::Message::Text(frame.to_string().into()))
        .await
        .expect("send frame");
}

/// Read the next JSON event, skipping control frames.
pub async fn recv_event(ws: &mut WsStream) -> Value {
    loop {
        let msg = time::timeout(Duration::from_secs(5), ws.next())
            .await
            .expect("timeout waiting for event")
            .expect("stream ended")
            .expect("ws read error");

        match msg {
            tungstenite::Message::Text(text) => {
                return serde_json::from_str(&text).expect("parse event");
            }
            tungstenite::Message::Ping(_) | tungstenite::Message::Pong(_) => continue,
            other => panic!("expected text frame, got {other:?}"),
        }
    }
}

/// Assert that nothing but control frames arrives within `window`.
pub async fn expect_silence(ws: &mut WsStream, window: Duration) {
    let deadline = time::Instant::now() + window;
    loop {
        match time::timeout_at(deadline, ws.next()).await {
            Err(_) => return,
            Ok(Some(Ok(tungstenite::Message::Ping(_) | tungstenite::Message::Pong(_)))) => continue,
            Ok(other) => panic!("expected no event, got {other:?}"),
        }
    }
}

/// Read until the close frame and return its code.
pub async fn recv_close_code(ws: &mut WsStream) -> u16 {
    loop {
        let msg = time::timeout(Duration::from_secs(5), ws.next())
            .await
            .expect("timeout waiting for close")
            .expect("stream ended before close frame")
            .expect("ws read error");

        match msg {
            tungstenite::Message::Close(Some(frame)) => return u16::from(frame.code),
            tungstenite::Message::Close(None) => return u16::from(CloseCode::Status),
            _ => continue,
        }
    }
}
