//! WebSocket server implementation.
//!
//! Accepts connections at `/ws?user=<id>&name=<display name>`. Each socket
//! becomes one matchmaker client: text frames are parsed as
//! [`ClientCommand`]s and forwarded to the actor, and every
//! [`ServerEvent`] the actor addresses to the client is written back as a
//! JSON text frame. Closing the socket disconnects the client, which
//! cancels its queue entry or declines its pending match.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use dareduel_matchmaking::{ClientCommand, ClientLink, MatchmakerHandle, ServerEvent};
use dareduel_types::{UserContext, UserId};

use crate::WsError;

type Sink = Arc<Mutex<SplitSink<WebSocket, Message>>>;

pub struct WsState {
    pub matchmaker: MatchmakerHandle,
}

#[derive(Debug, Deserialize)]
pub struct ConnectParams {
    pub user: String,
    #[serde(default)]
    pub name: Option<String>,
}

pub fn router(state: Arc<WsState>) -> Router {
    Router::new()
        .route("/ws", get(ws_handler))
        .with_state(state)
}

pub struct WebSocketServer {
    pub port: u16,
    pub state: Arc<WsState>,
}

impl WebSocketServer {
    pub fn new(port: u16, matchmaker: MatchmakerHandle) -> Self {
        Self {
            port,
            state: Arc::new(WsState { matchmaker }),
        }
    }

    /// Start listening for WebSocket connections. Runs until the task is
    /// dropped.
    pub async fn start(&self) -> Result<(), WsError> {
        let addr = SocketAddr::from(([0, 0, 0, 0], self.port));
        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .map_err(|source| WsError::Bind { addr, source })?;
        info!(%addr, "WebSocket server listening");
        axum::serve(listener, router(self.state.clone())).await?;
        Ok(())
    }
}

async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(params): Query<ConnectParams>,
    State(state): State<Arc<WsState>>,
) -> Response {
    let user = match UserId::parse(params.user) {
        Ok(user) => user,
        Err(e) => return (StatusCode::BAD_REQUEST, e.to_string()).into_response(),
    };
    let ctx = UserContext::new(user, params.name.unwrap_or_default());
    ws.on_upgrade(move |socket| handle_socket(socket, state, ctx))
}

async fn handle_socket(socket: WebSocket, state: Arc<WsState>, ctx: UserContext) {
    let ClientLink { conn, mut events } = match state.matchmaker.connect(ctx.clone()).await {
        Ok(link) => link,
        Err(e) => {
            warn!(user = %ctx.user_id, error = %e, "matchmaker unavailable, dropping socket");
            return;
        }
    };
    debug!(user = %ctx.user_id, conn = conn.raw(), "client connected");

    let (sink, mut stream) = socket.split();
    let sink: Sink = Arc::new(Mutex::new(sink));

    let forwarder = {
        let sink = sink.clone();
        tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                if !send_event(&sink, &event).await {
                    break;
                }
            }
        })
    };

    while let Some(frame) = stream.next().await {
        let frame = match frame {
            Ok(frame) => frame,
            Err(e) => {
                debug!(user = %ctx.user_id, error = %e, "socket receive error");
                break;
            }
        };
        match frame {
            Message::Text(text) => match serde_json::from_str::<ClientCommand>(&text) {
                Ok(command) => {
                    if state.matchmaker.send(conn, command).await.is_err() {
                        break;
                    }
                }
                Err(e) => {
                    let event = ServerEvent::error("invalid_request", format!("invalid message: {e}"));
                    send_event(&sink, &event).await;
                }
            },
            Message::Ping(data) => {
                let _ = sink.lock().await.send(Message::Pong(data)).await;
            }
            Message::Close(_) => break,
            _ => {}
        }
    }

    let _ = state.matchmaker.disconnect(conn).await;
    forwarder.abort();
    debug!(user = %ctx.user_id, conn = conn.raw(), "client disconnected");
}

/// Write one event as a JSON text frame. Returns false once the socket is
/// gone.
async fn send_event(sink: &Sink, event: &ServerEvent) -> bool {
    let text = match serde_json::to_string(event) {
        Ok(text) => text,
        Err(e) => {
            warn!(error = %e, "failed to encode server event");
            return true;
        }
    };
    sink.lock().await.send(Message::Text(text)).await.is_ok()
}
