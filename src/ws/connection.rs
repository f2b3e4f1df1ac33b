//! WebSocket connection lifecycle management.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;

use crate::http::routes::AppState;
use crate::ws::gateway::{Connection, ConnectionGateway};
use crate::ws::protocol::{ClientMsg, ServerMsg};

#[derive(Deserialize)]
pub struct WsParams {
    #[serde(default)]
    pub token: String,
}

/// Upgrades only after the session token checks out; the username inside it
/// is bound to the connection for its whole life.
pub async fn ws_handler(
    State(state): State<AppState>,
    Query(WsParams { token }): Query<WsParams>,
    ws: WebSocketUpgrade,
) -> Response {
    match state.signer.verify(&token) {
        Ok(username) => {
            let gateway = state.gateway.clone();
            ws.on_upgrade(move |socket| handle_socket(socket, gateway, username))
        }
        Err(err) => {
            tracing::warn!(%err, "ws auth failed");
            (StatusCode::UNAUTHORIZED, "invalid session token").into_response()
        }
    }
}

async fn handle_socket(socket: WebSocket, gateway: Arc<ConnectionGateway>, username: String) {
    let (mut ws_tx, mut ws_rx) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<ServerMsg>();
    let conn = Connection::new(username, tx);
    tracing::info!(conn_id = %conn.id(), username = %conn.username(), "ws connected");

    // Forward outbound messages to the socket.
    let writer = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            let text = match serde_json::to_string(&msg) {
                Ok(text) => text,
                Err(err) => {
                    tracing::error!(%err, "failed to encode server message");
                    continue;
                }
            };
            if ws_tx.send(Message::Text(text)).await.is_err() {
                break;
            }
        }
    });

    while let Some(Ok(msg)) = ws_rx.next().await {
        match msg {
            Message::Text(txt) => match serde_json::from_str::<ClientMsg>(&txt) {
                Ok(msg) => gateway.dispatch(&conn, msg),
                Err(err) => {
                    tracing::warn!(conn_id = %conn.id(), %err, "bad client message");
                    conn.send(ServerMsg::error(format!("Bad message: {}", err)));
                }
            },
            Message::Close(_) => break,
            Message::Binary(_) | Message::Ping(_) | Message::Pong(_) => {}
        }
    }

    gateway.on_disconnect(&conn);
    writer.abort();
    tracing::info!(conn_id = %conn.id(), username = %conn.username(), "ws closed");
}
