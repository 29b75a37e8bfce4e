//! WebSocket relay for per-task progress streams.
//!
//! # Responsibilities
//! - Complete the upgrade handshake with the browser
//! - Open one credentialed upstream WebSocket per browser socket
//! - Bidirectional frame forwarding
//! - Tear down both legs as soon as either one ends
//!
//! # Data Flow
//! ```text
//! Browser ←──── WebSocket frames ────→ Relay ←──── WebSocket frames ────→ Upstream
//!              /api/task/watch?taskId=…          /openapi/task/watch/<id>
//! ```
//!
//! # Design Decisions
//! - Frames are forwarded opaquely; nothing is parsed or buffered
//! - The credential travels as a header, never in the upstream URL
//! - No reconnect: a dropped leg ends the pair
//! - Server shutdown closes every open pair with 1001 (going away)

use std::sync::Arc;
use std::time::Instant;

use axum::{
    extract::{
        ws::{
            close_code, rejection::WebSocketUpgradeRejection, CloseFrame, Message, Utf8Bytes,
            WebSocket, WebSocketUpgrade,
        },
        rejection::QueryRejection,
        Query, State,
    },
    http::{header::AUTHORIZATION, HeaderValue, Method},
    response::Response,
};
use futures_util::{Sink, SinkExt, Stream, StreamExt};
use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use tokio_tungstenite::{
    connect_async,
    tungstenite::{self, client::IntoClientRequest, Message as UpstreamMessage},
};
use uuid::Uuid;

use crate::http::response;
use crate::http::server::AppState;
use crate::observability::metrics;
use crate::upstream::{ProxyError, UpstreamGateway};

/// Query parameters of the watch endpoint.
#[derive(Debug, Deserialize)]
pub struct WatchQuery {
    #[serde(rename = "taskId")]
    pub task_id: Option<String>,
}

/// Lifecycle of one browser/upstream pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayState {
    Connecting,
    Open,
    Closing,
    Closed,
}

/// How one direction of the pair stopped.
#[derive(Debug)]
enum LegEnd {
    /// The source sent a close frame or its stream ended.
    Closed,
    /// The source errored.
    Errored(String),
    /// The destination refused a frame.
    PeerGone,
}

struct RelaySession {
    id: Uuid,
    task_id: String,
    state: RelayState,
    opened_at: Instant,
}

impl RelaySession {
    fn new(task_id: String) -> Self {
        Self {
            id: Uuid::new_v4(),
            task_id,
            state: RelayState::Connecting,
            opened_at: Instant::now(),
        }
    }

    fn transition(&mut self, next: RelayState) {
        tracing::debug!(
            relay_id = %self.id,
            task_id = %self.task_id,
            from = ?self.state,
            to = ?next,
            "Relay state change"
        );
        self.state = next;
    }
}

/// `GET /api/task/watch?taskId=<id>` (upgrade).
pub async fn watch_handler(
    State(state): State<AppState>,
    method: Method,
    query: Result<Query<WatchQuery>, QueryRejection>,
    upgrade: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Response {
    if method == Method::OPTIONS {
        return state.cors.preflight();
    }

    let ws = match upgrade {
        Ok(ws) => ws,
        Err(rejection) => {
            let err = ProxyError::BadRequest(format!("WebSocket upgrade required: {}", rejection));
            return response::error(&err, &state.gateway, &state.cors);
        }
    };

    // An unparseable query is treated like a missing task id.
    let task_id = query
        .ok()
        .and_then(|Query(query)| query.task_id)
        .filter(|id| !id.trim().is_empty());
    let gateway = state.gateway.clone();
    let shutdown = state.relays.clone();

    ws.on_upgrade(move |socket| async move {
        match task_id {
            Some(task_id) => relay(socket, gateway, task_id, shutdown).await,
            None => reject_missing_task_id(socket).await,
        }
    })
}

/// Close the browser socket with a policy-violation code; no upstream attempt.
async fn reject_missing_task_id(mut socket: WebSocket) {
    tracing::warn!("WebSocket connection without taskId rejected");
    let frame = CloseFrame {
        code: close_code::POLICY,
        reason: Utf8Bytes::from_static("Missing taskId query parameter"),
    };
    let _ = socket.send(Message::Close(Some(frame))).await;
}

/// Run one relay pair to completion.
async fn relay(
    mut client: WebSocket,
    gateway: Arc<UpstreamGateway>,
    task_id: String,
    shutdown: CancellationToken,
) {
    let mut session = RelaySession::new(task_id);

    let upstream = match connect_upstream(&gateway, &session.task_id).await {
        Ok(stream) => stream,
        Err(e) => {
            tracing::error!(relay_id = %session.id, task_id = %session.task_id, error = %e, "Upstream WebSocket connect failed");
            let _ = client.send(internal_error_close()).await;
            session.transition(RelayState::Closed);
            return;
        }
    };

    session.transition(RelayState::Open);
    metrics::relay_opened();
    tracing::info!(relay_id = %session.id, task_id = %session.task_id, "Relay open");

    let (mut client_tx, mut client_rx) = client.split();
    let (mut upstream_tx, mut upstream_rx) = upstream.split();

    let (outcome, client_close) = tokio::select! {
        end = pump_upstream(&mut upstream_rx, &mut client_tx) => match end {
            LegEnd::Closed => ("upstream_closed", Some(Message::Close(None))),
            LegEnd::Errored(e) => {
                tracing::warn!(relay_id = %session.id, error = %e, "Upstream leg errored");
                ("upstream_error", Some(internal_error_close()))
            }
            LegEnd::PeerGone => ("client_gone", None),
        },
        end = pump_client(&mut client_rx, &mut upstream_tx) => match end {
            LegEnd::Closed => ("client_closed", None),
            LegEnd::Errored(e) => {
                tracing::debug!(relay_id = %session.id, error = %e, "Client leg errored");
                ("client_error", None)
            }
            LegEnd::PeerGone => ("upstream_gone", Some(internal_error_close())),
        },
        _ = shutdown.cancelled() => ("shutdown", Some(going_away_close())),
    };

    session.transition(RelayState::Closing);

    if let Some(message) = client_close {
        let _ = client_tx.send(message).await;
    }
    let _ = client_tx.close().await;
    let _ = upstream_tx.close().await;

    session.transition(RelayState::Closed);
    metrics::relay_closed(outcome);
    tracing::info!(
        relay_id = %session.id,
        task_id = %session.task_id,
        outcome,
        duration_ms = session.opened_at.elapsed().as_millis() as u64,
        "Relay closed"
    );
}

async fn connect_upstream(
    gateway: &UpstreamGateway,
    task_id: &str,
) -> Result<
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>,
    ProxyError,
> {
    let credential = gateway.credential()?;
    let url = gateway.watch_url(task_id)?;

    let mut request = url
        .as_str()
        .into_client_request()
        .map_err(|e| ProxyError::Upstream(format!("invalid upstream WebSocket URL: {}", e)))?;
    let bearer =
        HeaderValue::from_str(&credential.bearer()).map_err(|_| ProxyError::MissingCredential)?;
    request.headers_mut().insert(AUTHORIZATION, bearer);

    let (stream, _) = connect_async(request)
        .await
        .map_err(|e| ProxyError::Upstream(format!("upstream WebSocket handshake failed: {}", e)))?;
    Ok(stream)
}

/// Upstream → browser.
async fn pump_upstream<R, W>(upstream_rx: &mut R, client_tx: &mut W) -> LegEnd
where
    R: Stream<Item = Result<UpstreamMessage, tungstenite::Error>> + Unpin,
    W: Sink<Message> + Unpin,
{
    while let Some(frame) = upstream_rx.next().await {
        let message = match frame {
            Ok(UpstreamMessage::Close(_)) => return LegEnd::Closed,
            Ok(message) => message,
            Err(e) => return LegEnd::Errored(e.to_string()),
        };
        if let Some(forward) = to_client_message(message) {
            if client_tx.send(forward).await.is_err() {
                return LegEnd::PeerGone;
            }
        }
    }
    LegEnd::Closed
}

/// Browser → upstream.
async fn pump_client<R, W>(client_rx: &mut R, upstream_tx: &mut W) -> LegEnd
where
    R: Stream<Item = Result<Message, axum::Error>> + Unpin,
    W: Sink<UpstreamMessage> + Unpin,
{
    while let Some(frame) = client_rx.next().await {
        let message = match frame {
            Ok(Message::Close(_)) => return LegEnd::Closed,
            Ok(message) => message,
            Err(e) => return LegEnd::Errored(e.to_string()),
        };
        if let Some(forward) = to_upstream_message(message) {
            if upstream_tx.send(forward).await.is_err() {
                return LegEnd::PeerGone;
            }
        }
    }
    LegEnd::Closed
}

fn to_client_message(message: UpstreamMessage) -> Option<Message> {
    match message {
        UpstreamMessage::Text(text) => Some(Message::Text(text.to_string().into())),
        UpstreamMessage::Binary(data) => Some(Message::Binary(data)),
        UpstreamMessage::Ping(data) => Some(Message::Ping(data)),
        UpstreamMessage::Pong(data) => Some(Message::Pong(data)),
        UpstreamMessage::Close(_) | UpstreamMessage::Frame(_) => None,
    }
}

fn to_upstream_message(message: Message) -> Option<UpstreamMessage> {
    match message {
        Message::Text(text) => Some(UpstreamMessage::Text(text.to_string().into())),
        Message::Binary(data) => Some(UpstreamMessage::Binary(data)),
        Message::Ping(data) => Some(UpstreamMessage::Ping(data)),
        Message::Pong(data) => Some(UpstreamMessage::Pong(data)),
        Message::Close(_) => None,
    }
}

fn internal_error_close() -> Message {
    Message::Close(Some(CloseFrame {
        code: close_code::ERROR,
        reason: Utf8Bytes::from_static("Upstream connection error"),
    }))
}

fn going_away_close() -> Message {
    Message::Close(Some(CloseFrame {
        code: close_code::AWAY,
        reason: Utf8Bytes::from_static("Server shutting down"),
    }))
}
