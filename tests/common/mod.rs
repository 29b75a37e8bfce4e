//! Shared utilities for integration testing.
//!
//! Starts a mock upstream (REST + WebSocket + artifact storage) and a proxy
//! in front of it, both on ephemeral ports.

#![allow(dead_code)]

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use axum::{
    body::{Body, Bytes},
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Path, State,
    },
    http::{header::AUTHORIZATION, HeaderMap, Request, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde_json::{json, Value};
use tokio::net::TcpListener;

use forge_proxy::config::{Credential, ProxyConfig};
use forge_proxy::http::HttpServer;
use forge_proxy::lifecycle::Shutdown;

pub const API_KEY: &str = "tsk_integration_secret";

/// Bytes served by the mock storage at `/files/model.glb`.
pub const MODEL_BYTES: &[u8] = b"glTF\x02\x00\x00\x00\x00\xff\xfe\x01binary-model-payload";

/// One request as seen by the mock upstream.
#[derive(Debug, Clone)]
pub struct SeenRequest {
    pub method: String,
    pub path: String,
    pub query: Option<String>,
    pub authorization: Option<String>,
    pub body: Bytes,
}

/// Spy counters shared with the mock upstream.
#[derive(Default)]
pub struct UpstreamSpy {
    pub api_hits: AtomicUsize,
    pub ws_connects: AtomicUsize,
    pub ws_sessions_ended: AtomicUsize,
    pub file_hits: AtomicUsize,
    pub requests: Mutex<Vec<SeenRequest>>,
    pub ws_authorization: Mutex<Option<String>>,
    pub file_authorization: Mutex<Option<String>>,
    polls: Mutex<HashMap<String, usize>>,
}

impl UpstreamSpy {
    pub fn api_hits(&self) -> usize {
        self.api_hits.load(Ordering::SeqCst)
    }

    pub fn ws_connects(&self) -> usize {
        self.ws_connects.load(Ordering::SeqCst)
    }

    pub fn ws_sessions_ended(&self) -> usize {
        self.ws_sessions_ended.load(Ordering::SeqCst)
    }

    pub fn last_request(&self) -> Option<SeenRequest> {
        self.requests.lock().unwrap().last().cloned()
    }

    pub fn polls(&self, task_id: &str) -> usize {
        self.polls.lock().unwrap().get(task_id).copied().unwrap_or(0)
    }
}

/// Start the mock upstream API on an ephemeral port.
pub async fn start_upstream() -> (SocketAddr, Arc<UpstreamSpy>) {
    let spy = Arc::new(UpstreamSpy::default());

    let app = Router::new()
        .route("/openapi/task/watch/{task_id}", get(mock_watch))
        .route("/files/{name}", get(mock_file))
        .fallback(mock_api)
        .with_state(spy.clone());

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    (addr, spy)
}

/// Proxy config aimed at `upstream`.
pub fn proxy_config(upstream: SocketAddr, api_key: Option<&str>) -> ProxyConfig {
    let mut config = ProxyConfig::default();
    config.listener.bind_address = "127.0.0.1:0".into();
    config.upstream.base_url = format!("http://{}", upstream);
    config.upstream.api_key = api_key.and_then(Credential::new);
    config.observability.metrics_enabled = false;
    config
}

/// An address nothing listens on.
pub async fn closed_port() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap()
}

/// Start the proxy in front of `upstream`; it runs until `trigger()`.
pub async fn start_proxy(upstream: SocketAddr, api_key: Option<&str>) -> (SocketAddr, Shutdown) {
    let server = HttpServer::new(proxy_config(upstream, api_key)).unwrap();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let shutdown = Shutdown::new();
    let rx = shutdown.subscribe();
    tokio::spawn(async move {
        let _ = server.run(listener, rx).await;
    });
    (addr, shutdown)
}

/// A running upstream + proxy pair. Stops the proxy on drop.
pub struct Stack {
    pub proxy: SocketAddr,
    pub upstream: SocketAddr,
    pub spy: Arc<UpstreamSpy>,
    shutdown: Shutdown,
}

impl Stack {
    pub fn api(&self, path: &str) -> String {
        format!("http://{}/api{}", self.proxy, path)
    }

    pub fn file_url(&self, name: &str) -> String {
        format!("http://{}/files/{}", self.upstream, name)
    }

    /// Begin graceful shutdown of the proxy.
    pub fn stop(&self) {
        self.shutdown.trigger();
    }
}

impl Drop for Stack {
    fn drop(&mut self) {
        self.shutdown.trigger();
    }
}

/// Upstream + proxy, with or without the test credential.
pub async fn start_stack_with(api_key: Option<&str>) -> Stack {
    let (upstream, spy) = start_upstream().await;
    let (proxy, shutdown) = start_proxy(upstream, api_key).await;
    Stack {
        proxy,
        upstream,
        spy,
        shutdown,
    }
}

pub async fn start_stack() -> Stack {
    start_stack_with(Some(API_KEY)).await
}

pub fn http_client() -> reqwest::Client {
    reqwest::Client::builder().no_proxy().build().unwrap()
}

// ---- mock upstream handlers ----

async fn mock_api(State(spy): State<Arc<UpstreamSpy>>, request: Request<Body>) -> Response {
    spy.api_hits.fetch_add(1, Ordering::SeqCst);

    let (parts, body) = request.into_parts();
    let body = axum::body::to_bytes(body, usize::MAX).await.unwrap_or_default();
    let path = parts.uri.path().to_string();
    spy.requests.lock().unwrap().push(SeenRequest {
        method: parts.method.to_string(),
        path: path.clone(),
        query: parts.uri.query().map(str::to_string),
        authorization: header(&parts.headers, AUTHORIZATION.as_str()),
        body: body.clone(),
    });

    let method = parts.method.as_str();
    match (method, path.as_str()) {
        ("POST", "/openapi/upload") => Json(json!({"code": 0, "data": {"image_token": "ft_1"}})).into_response(),
        ("POST", "/openapi/task") => {
            let request: Value = serde_json::from_slice(&body).unwrap_or(Value::Null);
            let task_id = match request["type"].as_str() {
                Some("image_to_model") if request["file"]["file_token"] == "ft_1" => "t_1",
                Some("convert_model") if request["original_model_task_id"] == "t_1" => "t_2",
                _ => return (StatusCode::BAD_REQUEST, Json(json!({"code": 1004, "message": "bad task"}))).into_response(),
            };
            Json(json!({"code": 0, "data": {"task_id": task_id}})).into_response()
        }
        ("GET", p) if p.starts_with("/openapi/task/") => {
            let task_id = p.trim_start_matches("/openapi/task/").to_string();
            let poll = {
                let mut polls = spy.polls.lock().unwrap();
                let count = polls.entry(task_id.clone()).or_insert(0);
                *count += 1;
                *count
            };
            Json(task_payload(&task_id, poll)).into_response()
        }
        ("GET", "/openapi/teapot") => {
            (StatusCode::IM_A_TEAPOT, [("x-upstream", "teapot")], "short and stout").into_response()
        }
        _ => Json(json!({
            "code": 0,
            "data": {"method": method, "path": path, "query": parts.uri.query()}
        }))
        .into_response(),
    }
}

/// Scripted task lifecycle: `t_1` runs once then succeeds, `t_2` succeeds
/// immediately, `t_fail` fails.
fn task_payload(task_id: &str, poll: usize) -> Value {
    match task_id {
        "t_1" if poll == 1 => json!({"code": 0, "data": {
            "task_id": "t_1", "type": "image_to_model", "status": "running", "progress": 40
        }}),
        "t_1" => json!({"code": 0, "data": {
            "task_id": "t_1", "type": "image_to_model", "status": "success", "progress": 100,
            "result": {"artifactUrl": "https://x/model.glb", "artifactType": "glb"}
        }}),
        "t_2" => json!({"code": 0, "data": {
            "task_id": "t_2", "type": "convert_model", "status": "success", "progress": 100,
            "result": {"artifactUrl": "https://x/model.stl", "artifactType": "stl"}
        }}),
        "t_fail" => json!({"code": 0, "data": {"task_id": "t_fail", "status": "failed"}}),
        _ => json!({"code": 0, "data": {"task_id": task_id, "status": "queued"}}),
    }
}

async fn mock_file(
    State(spy): State<Arc<UpstreamSpy>>,
    Path(name): Path<String>,
    headers: HeaderMap,
) -> Response {
    spy.file_hits.fetch_add(1, Ordering::SeqCst);
    *spy.file_authorization.lock().unwrap() = header(&headers, AUTHORIZATION.as_str());
    match name.as_str() {
        "model.glb" => (StatusCode::OK, Bytes::from_static(MODEL_BYTES)).into_response(),
        _ => StatusCode::NOT_FOUND.into_response(),
    }
}

/// Greets with one status frame, then echoes. Task `closing` closes right
/// after the greeting; task `dropping` drops the connection instead.
async fn mock_watch(
    State(spy): State<Arc<UpstreamSpy>>,
    Path(task_id): Path<String>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> Response {
    spy.ws_connects.fetch_add(1, Ordering::SeqCst);
    *spy.ws_authorization.lock().unwrap() = header(&headers, AUTHORIZATION.as_str());
    ws.on_upgrade(move |socket| async move {
        mock_watch_session(socket, task_id).await;
        spy.ws_sessions_ended.fetch_add(1, Ordering::SeqCst);
    })
}

async fn mock_watch_session(mut socket: WebSocket, task_id: String) {
    let greeting = json!({"taskId": task_id, "status": "running", "progress": 10}).to_string();
    if socket.send(Message::Text(greeting.into())).await.is_err() {
        return;
    }
    match task_id.as_str() {
        "closing" => {
            let _ = socket.send(Message::Close(None)).await;
            return;
        }
        // Hang up without a close handshake.
        "dropping" => return,
        _ => {}
    }
    while let Some(Ok(message)) = socket.recv().await {
        match message {
            Message::Text(_) | Message::Binary(_) => {
                if socket.send(message).await.is_err() {
                    break;
                }
            }
            Message::Close(_) => break,
            _ => {}
        }
    }
}

fn header(headers: &HeaderMap, name: &str) -> Option<String> {
    headers.get(name).and_then(|v| v.to_str().ok()).map(str::to_string)
}
