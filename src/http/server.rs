//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create Axum Router with all handlers
//! - Wire up middleware (tracing, timeout, request ID)
//! - Bind server to listener
//! - Dispatch `/api` traffic to the download relay, the WebSocket relay or
//!   the reverse proxy, in that priority order

use std::sync::Arc;
use std::time::Duration;

use axum::{
    http::header::InvalidHeaderValue,
    routing::{any, get},
    Router,
};
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

use crate::config::{LimitsConfig, ProxyConfig};
use crate::http::cors::CorsPolicy;
use crate::http::proxy::{download_handler, proxy_handler};
use crate::http::request::{propagate_request_id_layer, set_request_id_layer};
use crate::http::response;
use crate::http::websocket::watch_handler;
use crate::lifecycle::signals::wait_for_signal;
use crate::upstream::UpstreamGateway;

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub gateway: Arc<UpstreamGateway>,
    pub cors: Arc<CorsPolicy>,
    pub limits: LimitsConfig,
    /// Cancelled when the server starts draining; open relays close on it.
    pub relays: CancellationToken,
}

/// Errors building the server.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("failed to build upstream client: {0}")]
    Client(#[from] reqwest::Error),

    #[error("invalid CORS configuration: {0}")]
    Cors(#[from] InvalidHeaderValue),
}

/// HTTP server for the bridge.
pub struct HttpServer {
    router: Router,
    relays: CancellationToken,
}

impl HttpServer {
    /// Create a new HTTP server with the given configuration.
    pub fn new(config: ProxyConfig) -> Result<Self, ServerError> {
        if config.upstream.api_key.is_none() {
            tracing::warn!("No upstream credential configured; credentialed routes will answer 500");
        }

        let relays = CancellationToken::new();
        let state = AppState {
            gateway: Arc::new(UpstreamGateway::new(&config)?),
            cors: Arc::new(CorsPolicy::from_config(&config.cors)?),
            limits: config.limits.clone(),
            relays: relays.clone(),
        };

        let router = Self::build_router(&config, state);
        Ok(Self { router, relays })
    }

    /// Build the Axum router with all middleware layers.
    ///
    /// Static routes win over the `{*rest}` wildcard, which gives the
    /// download relay and the watch socket priority over the generic proxy.
    #[allow(deprecated)]
    fn build_router(config: &ProxyConfig, state: AppState) -> Router {
        let prefix = config.upstream.local_prefix.trim_end_matches('/');

        Router::new()
            .route("/health", get(|| async { response::health() }))
            .route(&format!("{}/download", prefix), any(download_handler))
            .route(&format!("{}/task/watch", prefix), any(watch_handler))
            .route(&format!("{}/{{*rest}}", prefix), any(proxy_handler))
            .route(prefix, any(proxy_handler))
            .with_state(state)
            .layer(TimeoutLayer::new(Duration::from_secs(config.timeouts.request_secs)))
            .layer(propagate_request_id_layer())
            .layer(TraceLayer::new_for_http())
            .layer(set_request_id_layer())
    }

    /// The router, for in-process testing.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Run the server until `shutdown` fires or an OS signal arrives.
    ///
    /// Open WebSocket relays are told to close as soon as draining starts.
    pub async fn run(
        self,
        listener: TcpListener,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        let relays = self.relays;
        axum::serve(listener, self.router)
            .with_graceful_shutdown(async move {
                tokio::select! {
                    _ = shutdown.recv() => tracing::info!("Shutdown requested"),
                    _ = wait_for_signal() => {}
                }
                relays.cancel();
            })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Method, Request, StatusCode};
    use tower::ServiceExt;

    fn server() -> HttpServer {
        HttpServer::new(ProxyConfig::default()).unwrap()
    }

    #[tokio::test]
    async fn test_health() {
        let response = server()
            .router()
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = axum::body::to_bytes(response.into_body(), 1024).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["status"], "ok");
    }

    #[tokio::test]
    async fn test_preflight_answered_locally_without_credential() {
        let response = server()
            .router()
            .oneshot(
                Request::builder()
                    .method(Method::OPTIONS)
                    .uri("/api/task")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers().get("access-control-allow-origin").unwrap(), "*");
        assert!(response.headers().get("x-request-id").is_some());
    }

    #[tokio::test]
    async fn test_missing_credential_is_500_json() {
        let response = server()
            .router()
            .oneshot(Request::builder().uri("/api/task/t_1").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(response.headers().get("access-control-allow-origin").unwrap(), "*");

        let body = axum::body::to_bytes(response.into_body(), 1024).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["error"], "configuration_error");
        assert!(json["message"].as_str().unwrap().contains("UPSTREAM_API_KEY"));
    }

    #[tokio::test]
    async fn test_download_without_url_is_400() {
        let response = server()
            .router()
            .oneshot(Request::builder().uri("/api/download").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_oversized_body_rejected() {
        let mut config = ProxyConfig::default();
        config.limits.max_body_bytes = 8;
        config.upstream.api_key = crate::config::Credential::new("k");
        let server = HttpServer::new(config).unwrap();

        let response = server
            .router()
            .oneshot(
                Request::builder()
                    .method(Method::POST)
                    .uri("/api/task")
                    .header("content-length", "64")
                    .body(Body::from(vec![b'x'; 64]))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    }

    #[tokio::test]
    async fn test_oversized_chunked_body_rejected() {
        let mut config = ProxyConfig::default();
        config.limits.max_body_bytes = 8;
        config.upstream.api_key = crate::config::Credential::new("k");
        let server = HttpServer::new(config).unwrap();

        let chunks = (0..4).map(|_| Ok::<_, std::io::Error>(bytes::Bytes::from_static(&[b'x'; 16])));
        let response = server
            .router()
            .oneshot(
                Request::builder()
                    .method(Method::POST)
                    .uri("/api/task")
                    .body(Body::from_stream(futures_util::stream::iter(chunks)))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);

        let body = axum::body::to_bytes(response.into_body(), 1024).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["error"], "payload_too_large");
    }
}
