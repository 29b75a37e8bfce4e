//! Single-invocation routing for the serverless deployment.
//!
//! Implements the same contract as the long-running server (preflight,
//! download relay, credentialed reverse proxy, health) on top of the shared
//! [`UpstreamGateway`]. There is no WebSocket route here.

use std::collections::BTreeMap;

use axum::http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use bytes::Bytes;
use serde_json::json;

use crate::config::ProxyConfig;
use crate::http::{CorsPolicy, ServerError};
use crate::serverless::event::{ServerlessEvent, ServerlessResponse};
use crate::upstream::{ProxyError, ProxyRequest, UpstreamGateway, UpstreamResponse};

/// Routes one serverless event at a time. Holds no per-request state.
pub struct ServerlessHandler {
    gateway: UpstreamGateway,
    cors: CorsPolicy,
    function_prefix: String,
    max_body_bytes: usize,
}

impl ServerlessHandler {
    pub fn new(config: &ProxyConfig) -> Result<Self, ServerError> {
        Ok(Self {
            gateway: UpstreamGateway::new(config)?,
            cors: CorsPolicy::from_config(&config.cors)?,
            function_prefix: config.serverless.function_prefix.trim_end_matches('/').to_string(),
            max_body_bytes: config.limits.max_body_bytes,
        })
    }

    /// Handle one event.
    pub async fn handle(&self, event: ServerlessEvent) -> ServerlessResponse {
        let path = self.normalize_path(&event.path);
        tracing::debug!(method = %event.http_method, path = %path, "Serverless invocation");

        let method = match Method::from_bytes(event.http_method.to_uppercase().as_bytes()) {
            Ok(method) => method,
            Err(_) => {
                let err = ProxyError::BadRequest(format!("unsupported method '{}'", event.http_method));
                return self.error(&err);
            }
        };

        if method == Method::OPTIONS {
            return self.respond(StatusCode::OK, BTreeMap::new(), String::new(), false, true);
        }

        if path == "/health" {
            let body = json!({"status": "ok", "message": "forge-proxy function is running"});
            return self.json(StatusCode::OK, body.to_string());
        }

        let local = self.gateway.local_prefix().trim_end_matches('/');
        if path == format!("{}/download", local) {
            return self.download(&event).await;
        }

        if path == local || path.starts_with(&format!("{}/", local)) {
            return self.proxy(method, path, event).await;
        }

        self.json(
            StatusCode::NOT_FOUND,
            json!({"error": "not_found", "message": format!("no route for {}", path)}).to_string(),
        )
    }

    /// Map the function's mount path back onto the local prefix.
    fn normalize_path(&self, path: &str) -> String {
        match path.strip_prefix(&self.function_prefix) {
            Some(rest) if rest.is_empty() || rest.starts_with('/') => {
                format!("{}{}", self.gateway.local_prefix().trim_end_matches('/'), rest)
            }
            _ => path.to_string(),
        }
    }

    async fn download(&self, event: &ServerlessEvent) -> ServerlessResponse {
        match self.gateway.fetch_artifact(event.query_param("url")).await {
            Ok(bytes) => {
                let mut headers = BTreeMap::new();
                headers.insert("Content-Type".to_string(), "application/octet-stream".to_string());
                headers.insert("Content-Length".to_string(), bytes.len().to_string());
                self.respond(StatusCode::OK, headers, STANDARD.encode(&bytes), true, false)
            }
            Err(e) => {
                tracing::warn!(error = %e, "Download relay failed");
                self.error(&e)
            }
        }
    }

    async fn proxy(&self, method: Method, path: String, event: ServerlessEvent) -> ServerlessResponse {
        let result = async {
            let body = decode_body(&event, self.max_body_bytes)?;
            let query = event.query_string();
            let request = ProxyRequest {
                method,
                path,
                query,
                headers: header_map(event.headers.as_ref()),
                body,
            };
            self.gateway.forward(request).await
        }
        .await;

        match result {
            Ok(upstream) => self.relay(upstream),
            Err(e) => {
                tracing::error!(error = %e, "Serverless proxy error");
                self.error(&e)
            }
        }
    }

    fn relay(&self, upstream: UpstreamResponse) -> ServerlessResponse {
        let mut headers = BTreeMap::new();
        for (name, value) in &upstream.headers {
            if let Ok(value) = value.to_str() {
                headers
                    .entry(name.as_str().to_string())
                    .and_modify(|existing: &mut String| {
                        existing.push_str(", ");
                        existing.push_str(value);
                    })
                    .or_insert_with(|| value.to_string());
            }
        }

        let (body, is_base64) = match String::from_utf8(upstream.body.to_vec()) {
            Ok(text) => (text, false),
            Err(_) => (STANDARD.encode(&upstream.body), true),
        };
        self.respond(upstream.status, headers, body, is_base64, false)
    }

    fn error(&self, err: &ProxyError) -> ServerlessResponse {
        self.json(err.status(), self.gateway.error_body(err).to_string())
    }

    fn json(&self, status: StatusCode, body: String) -> ServerlessResponse {
        let mut headers = BTreeMap::new();
        headers.insert("Content-Type".to_string(), "application/json".to_string());
        self.respond(status, headers, body, false, false)
    }

    fn respond(
        &self,
        status: StatusCode,
        mut headers: BTreeMap<String, String>,
        body: String,
        is_base64_encoded: bool,
        preflight: bool,
    ) -> ServerlessResponse {
        for (name, value) in self.cors.pairs(preflight) {
            headers.insert(name.to_string(), value);
        }
        ServerlessResponse {
            status_code: status.as_u16(),
            headers,
            body,
            is_base64_encoded,
        }
    }
}

fn decode_body(event: &ServerlessEvent, limit: usize) -> Result<Bytes, ProxyError> {
    let raw = match event.body.as_deref() {
        Some(raw) if !raw.is_empty() => raw,
        _ => return Ok(Bytes::new()),
    };

    let body = if event.is_base64_encoded {
        STANDARD
            .decode(raw)
            .map(Bytes::from)
            .map_err(|e| ProxyError::BadRequest(format!("body is not valid base64: {}", e)))?
    } else {
        Bytes::copy_from_slice(raw.as_bytes())
    };

    if body.len() > limit {
        return Err(ProxyError::PayloadTooLarge { limit });
    }
    Ok(body)
}

fn header_map(headers: Option<&std::collections::HashMap<String, String>>) -> HeaderMap {
    let mut map = HeaderMap::new();
    for (name, value) in headers.into_iter().flatten() {
        if let (Ok(name), Ok(value)) = (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            map.append(name, value);
        }
    }
    map
}
