//! Reverse-proxy and download-relay handlers.
//!
//! # Responsibilities
//! - Answer CORS preflight locally (never forwarded)
//! - Relay `/api/download?url=` binaries without credentials
//! - Forward everything else under `/api` to the upstream prefix

use std::time::Instant;

use axum::{
    body::Body,
    extract::{Query, State},
    http::{header::CONTENT_LENGTH, Method, Request},
    response::Response,
};
use bytes::BytesMut;
use futures_util::StreamExt;
use serde::Deserialize;

use crate::http::request::request_id;
use crate::http::response;
use crate::http::server::AppState;
use crate::observability::metrics;
use crate::upstream::{ProxyError, ProxyRequest};

/// Query parameters of the download relay.
#[derive(Debug, Deserialize)]
pub struct DownloadQuery {
    pub url: Option<String>,
}

/// `GET /api/download?url=<target>`.
pub async fn download_handler(
    State(state): State<AppState>,
    method: Method,
    Query(query): Query<DownloadQuery>,
) -> Response {
    let start = Instant::now();
    if method == Method::OPTIONS {
        metrics::record_request(method.as_str(), 200, "preflight", start);
        return state.cors.preflight();
    }

    let response = match state.gateway.fetch_artifact(query.url.as_deref()).await {
        Ok(bytes) => {
            tracing::info!(bytes = bytes.len(), "Artifact relayed");
            response::binary(bytes, &state.cors)
        }
        Err(e) => {
            tracing::warn!(error = %e, "Download relay failed");
            response::error(&e, &state.gateway, &state.cors)
        }
    };

    metrics::record_request(method.as_str(), response.status().as_u16(), "download", start);
    response
}

/// Any method on `/api/<rest>`.
pub async fn proxy_handler(State(state): State<AppState>, request: Request<Body>) -> Response {
    let start = Instant::now();
    let request_id = request_id(request.headers());
    let method = request.method().clone();

    if method == Method::OPTIONS {
        metrics::record_request(method.as_str(), 200, "preflight", start);
        return state.cors.preflight();
    }

    let path = request.uri().path().to_string();
    tracing::debug!(
        request_id = %request_id,
        method = %method,
        path = %path,
        "Proxying request"
    );

    let response = match read_request(&state, request).await {
        Ok(proxy_request) => match state.gateway.forward(proxy_request).await {
            Ok(upstream) => {
                tracing::debug!(request_id = %request_id, status = %upstream.status, "Upstream responded");
                response::relay(upstream, &state.cors)
            }
            Err(e) => {
                tracing::error!(request_id = %request_id, path = %path, error = %e, "Upstream error");
                response::error(&e, &state.gateway, &state.cors)
            }
        },
        Err(e) => {
            tracing::warn!(request_id = %request_id, path = %path, error = %e, "Rejected request");
            response::error(&e, &state.gateway, &state.cors)
        }
    };

    metrics::record_request(method.as_str(), response.status().as_u16(), "proxy", start);
    response
}

/// Buffer the inbound body (bounded) into a framework-free request.
async fn read_request(state: &AppState, request: Request<Body>) -> Result<ProxyRequest, ProxyError> {
    let limit = state.limits.max_body_bytes;
    let declared = request
        .headers()
        .get(CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<usize>().ok());
    if declared.is_some_and(|len| len > limit) {
        return Err(ProxyError::PayloadTooLarge { limit });
    }

    // Chunked bodies carry no declared length; count as they arrive.
    let (parts, body) = request.into_parts();
    let mut stream = body.into_data_stream();
    let mut buf = BytesMut::with_capacity(declared.unwrap_or(0));
    while let Some(chunk) = stream.next().await {
        let chunk = chunk
            .map_err(|e| ProxyError::BadRequest(format!("failed to read request body: {}", e)))?;
        if buf.len() + chunk.len() > limit {
            return Err(ProxyError::PayloadTooLarge { limit });
        }
        buf.extend_from_slice(&chunk);
    }
    let body = buf.freeze();

    Ok(ProxyRequest {
        method: parts.method,
        path: parts.uri.path().to_string(),
        query: parts.uri.query().map(str::to_string),
        headers: parts.headers,
        body,
    })
}
