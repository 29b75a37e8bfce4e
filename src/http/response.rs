//! Response construction for the proxy routes.
//!
//! # Design Decisions
//! - Every response leaving an `/api` route carries the local CORS headers
//! - Upstream status and body are relayed verbatim
//! - Errors become `{error, message}` JSON with the credential scrubbed

use axum::body::Body;
use axum::http::header::{HeaderValue, CONTENT_LENGTH, CONTENT_TYPE};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use bytes::Bytes;

use crate::http::cors::CorsPolicy;
use crate::upstream::{ProxyError, UpstreamGateway, UpstreamResponse};

/// Relay an upstream response to the browser.
pub fn relay(upstream: UpstreamResponse, cors: &CorsPolicy) -> Response {
    let mut response = Response::new(Body::from(upstream.body));
    *response.status_mut() = upstream.status;
    *response.headers_mut() = upstream.headers;
    cors.apply(response.headers_mut());
    response
}

/// Binary artifact body for the download relay.
pub fn binary(bytes: Bytes, cors: &CorsPolicy) -> Response {
    let len = bytes.len();
    let mut response = Response::new(Body::from(bytes));
    let headers = response.headers_mut();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/octet-stream"));
    headers.insert(CONTENT_LENGTH, HeaderValue::from(len));
    cors.apply(headers);
    response
}

/// JSON error response.
pub fn error(err: &ProxyError, gateway: &UpstreamGateway, cors: &CorsPolicy) -> Response {
    let mut response = (err.status(), Json(gateway.error_body(err))).into_response();
    cors.apply(response.headers_mut());
    response
}

/// Liveness body for `/health`.
pub fn health() -> Response {
    (
        StatusCode::OK,
        Json(serde_json::json!({
            "status": "ok",
            "message": "forge-proxy is running",
        })),
    )
        .into_response()
}
