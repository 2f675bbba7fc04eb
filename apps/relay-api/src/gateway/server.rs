//! WebSocket upgrade handler and per-connection event loop.

use std::convert::Infallible;
use std::net::SocketAddr;

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{ConnectInfo, FromRequestParts, State, WebSocketUpgrade};
use axum::http::request::Parts;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use relay_common::PrefixedId;

use crate::AppState;

use super::events::{ClientEvent, ServerEvent};

/// Id type for transport connections: `conn_<ULID>`.
pub struct Connection;

impl PrefixedId for Connection {
    const PREFIX: &'static str = relay_common::id::prefix::CONNECTION;
}

/// Client address as seen by the edge: the first `X-Forwarded-For` hop, or the TCP peer.
#[derive(Debug, Clone, Default)]
pub struct SourceAddr(pub Option<String>);

impl<S: Send + Sync> FromRequestParts<S> for SourceAddr {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let forwarded = parts
            .headers
            .get("x-forwarded-for")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(',').next())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_owned);

        let peer = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.ip().to_string());

        Ok(Self(forwarded.or(peer)))
    }
}

pub fn router() -> Router<AppState> {
    Router::new().route("/socket", get(ws_upgrade))
}

async fn ws_upgrade(
    ws: WebSocketUpgrade,
    SourceAddr(source_address): SourceAddr,
    State(state): State<AppState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_connection(socket, state, source_address))
}

async fn handle_connection(socket: WebSocket, state: AppState, source_address: Option<String>) {
    let connection_id = Connection::generate();
    let mut outbound = state.hub.register(&connection_id, source_address);
    let (mut ws_tx, mut ws_rx) = socket.split();

    tracing::debug!(conn_id = %connection_id, "socket connected");

    loop {
        tokio::select! {
            msg = ws_rx.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        match serde_json::from_str::<ClientEvent>(&text) {
                            Ok(event) => state.coordinator.handle(&connection_id, event).await,
                            Err(err) => {
                                tracing::debug!(conn_id = %connection_id, error = %err, "invalid client frame");
                                if send_event(&mut ws_tx, &ServerEvent::error("Invalid event")).await.is_err() {
                                    break;
                                }
                            }
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(e)) => {
                        tracing::debug!(?e, conn_id = %connection_id, "ws read error");
                        break;
                    }
                    Some(Ok(_)) => continue,
                }
            }

            Some(event) = outbound.recv() => {
                if send_event(&mut ws_tx, &event).await.is_err() {
                    break;
                }
            }
        }
    }

    state.coordinator.disconnect(&connection_id);
    state.hub.unregister(&connection_id);

    tracing::debug!(conn_id = %connection_id, "socket closed");
}

async fn send_event(
    ws_tx: &mut SplitSink<WebSocket, Message>,
    event: &ServerEvent,
) -> Result<(), axum::Error> {
    let json = match serde_json::to_string(event) {
        Ok(json) => json,
        Err(err) => {
            tracing::error!(error = %err, "failed to encode server event");
            return Ok(());
        }
    };
    ws_tx.send(Message::Text(json.into())).await
}
