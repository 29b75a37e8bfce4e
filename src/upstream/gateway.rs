//! Credentialed access to the upstream API.
//!
//! # Responsibilities
//! - Rewrite local paths onto the upstream API prefix
//! - Inject the bearer credential and forward requests
//! - Fetch artifacts for the download relay with a bounded buffer
//! - Build the per-task WebSocket watch URL
//!
//! Both the long-running server and the serverless handler go through this
//! type, so the request/response contract lives in one place.

use std::time::Duration;

use axum::http::header::{HeaderValue, AUTHORIZATION};
use axum::http::{HeaderMap, Method, StatusCode};
use bytes::{Bytes, BytesMut};
use url::Url;

use crate::config::{Credential, ProxyConfig};
use crate::observability::metrics;
use crate::upstream::error::{redact, ProxyError};
use crate::upstream::headers::{forwardable_request_headers, relayable_response_headers};

/// One inbound HTTP call, detached from any server framework.
#[derive(Debug, Clone)]
pub struct ProxyRequest {
    pub method: Method,
    pub path: String,
    pub query: Option<String>,
    pub headers: HeaderMap,
    pub body: Bytes,
}

/// A fully read upstream response.
#[derive(Debug, Clone)]
pub struct UpstreamResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

/// Shared upstream client. Cheap to share behind an `Arc`; holds no mutable state.
pub struct UpstreamGateway {
    client: reqwest::Client,
    base_url: String,
    api_prefix: String,
    local_prefix: String,
    credential: Option<Credential>,
    max_download_bytes: usize,
}

impl UpstreamGateway {
    /// Build the gateway and its pooled HTTP client from configuration.
    pub fn new(config: &ProxyConfig) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(config.timeouts.connect_secs))
            .timeout(Duration::from_secs(config.timeouts.request_secs))
            .build()?;

        Ok(Self {
            client,
            base_url: config.upstream.base_url.trim_end_matches('/').to_string(),
            api_prefix: config.upstream.api_prefix.clone(),
            local_prefix: config.upstream.local_prefix.clone(),
            credential: config.upstream.api_key.clone(),
            max_download_bytes: config.limits.max_download_bytes,
        })
    }

    /// Local path prefix handled by the proxy (e.g. `/api`).
    pub fn local_prefix(&self) -> &str {
        &self.local_prefix
    }

    /// The configured credential, or a configuration error.
    pub fn credential(&self) -> Result<&Credential, ProxyError> {
        self.credential.as_ref().ok_or(ProxyError::MissingCredential)
    }

    /// JSON error body for `err`, scrubbed of the credential.
    pub fn error_body(&self, err: &ProxyError) -> serde_json::Value {
        err.to_body(self.credential.as_ref())
    }

    /// Full upstream URL for a local path, or `None` if the path is outside
    /// the local prefix. The query string is carried over verbatim.
    pub fn upstream_url(&self, path: &str, query: Option<&str>) -> Option<String> {
        let rewritten = rewrite_path(&self.local_prefix, &self.api_prefix, path)?;
        let mut url = format!("{}{}", self.base_url, rewritten);
        if let Some(query) = query.filter(|q| !q.is_empty()) {
            url.push('?');
            url.push_str(query);
        }
        Some(url)
    }

    /// Upstream WebSocket endpoint that streams updates for one task.
    pub fn watch_url(&self, task_id: &str) -> Result<Url, ProxyError> {
        let invalid = || ProxyError::Upstream("upstream base URL cannot carry a WebSocket path".into());

        let mut url = Url::parse(&self.base_url).map_err(|_| invalid())?;
        let scheme = if url.scheme() == "http" { "ws" } else { "wss" };
        url.set_scheme(scheme).map_err(|_| invalid())?;
        url.set_query(None);
        {
            let mut segments = url.path_segments_mut().map_err(|_| invalid())?;
            segments.pop_if_empty();
            segments.extend(self.api_prefix.split('/').filter(|s| !s.is_empty()));
            segments.extend(["task", "watch", task_id]);
        }
        Ok(url)
    }

    /// Forward a request to the upstream API with the credential injected.
    ///
    /// Non-2xx upstream replies are returned as-is; only transport failures
    /// become errors.
    pub async fn forward(&self, request: ProxyRequest) -> Result<UpstreamResponse, ProxyError> {
        let credential = self.credential()?;
        let url = self
            .upstream_url(&request.path, request.query.as_deref())
            .ok_or_else(|| {
                ProxyError::BadRequest(format!(
                    "path '{}' is outside {}",
                    request.path, self.local_prefix
                ))
            })?;

        let mut headers = forwardable_request_headers(&request.headers);
        let bearer =
            HeaderValue::from_str(&credential.bearer()).map_err(|_| ProxyError::MissingCredential)?;
        headers.insert(AUTHORIZATION, bearer);

        tracing::debug!(method = %request.method, path = %request.path, "Forwarding to upstream");

        let response = self
            .client
            .request(request.method, &url)
            .headers(headers)
            .body(request.body)
            .send()
            .await
            .map_err(|e| self.upstream_error("upstream request failed", &e))?;

        let status = response.status();
        let headers = relayable_response_headers(response.headers());
        let body = response
            .bytes()
            .await
            .map_err(|e| self.upstream_error("failed to read upstream response", &e))?;

        Ok(UpstreamResponse {
            status,
            headers,
            body,
        })
    }

    /// Fetch an artifact by URL without any credential.
    ///
    /// The target may omit its scheme, in which case `https://` is assumed.
    /// At most `limits.max_download_bytes` are buffered.
    pub async fn fetch_artifact(&self, target: Option<&str>) -> Result<Bytes, ProxyError> {
        let url = artifact_url(target)?;
        tracing::debug!(url = %url, "Fetching artifact");

        let mut response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| self.upstream_error("download failed", &e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ProxyError::Upstream(format!(
                "download failed with upstream status {}",
                status
            )));
        }

        let limit = self.max_download_bytes;
        let declared = response.content_length().unwrap_or(0);
        if declared > limit as u64 {
            return Err(self.oversize(limit));
        }

        let mut buf = BytesMut::with_capacity(declared as usize);
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| self.upstream_error("download interrupted", &e))?
        {
            if buf.len() + chunk.len() > limit {
                return Err(self.oversize(limit));
            }
            buf.extend_from_slice(&chunk);
        }

        metrics::record_download(buf.len());
        Ok(buf.freeze())
    }

    fn upstream_error(&self, context: &str, err: &reqwest::Error) -> ProxyError {
        ProxyError::Upstream(redact(&format!("{}: {}", context, err), self.credential.as_ref()))
    }

    fn oversize(&self, limit: usize) -> ProxyError {
        ProxyError::Upstream(format!("artifact exceeds the {} byte download limit", limit))
    }
}

/// Rewrite `local_prefix` at the start of `path` to `upstream_prefix`.
///
/// Only whole segments match: `/api/x` rewrites, `/apix` does not.
pub fn rewrite_path(local_prefix: &str, upstream_prefix: &str, path: &str) -> Option<String> {
    let local = local_prefix.trim_end_matches('/');
    let upstream = upstream_prefix.trim_end_matches('/');
    let rest = path.strip_prefix(local)?;
    if rest.is_empty() || rest.starts_with('/') {
        Some(format!("{}{}", upstream, rest))
    } else {
        None
    }
}

/// The URL the download relay dials for a `?url=` value.
pub fn artifact_url(target: Option<&str>) -> Result<Url, ProxyError> {
    let raw = target
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or_else(|| ProxyError::BadRequest("Missing required query parameter: url".into()))?;

    let target = normalize_target_url(raw);
    Url::parse(&target)
        .map_err(|e| ProxyError::Upstream(format!("invalid download URL '{}': {}", target, e)))
}

/// Prefix `https://` onto targets that carry no `http` scheme.
pub fn normalize_target_url(raw: &str) -> String {
    if raw.starts_with("http") {
        raw.to_string()
    } else {
        format!("https://{}", raw.trim_start_matches('/'))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gateway(base: &str) -> UpstreamGateway {
        let mut config = ProxyConfig::default();
        config.upstream.base_url = base.to_string();
        config.upstream.api_key = Credential::new("tsk_test");
        UpstreamGateway::new(&config).unwrap()
    }

    #[test]
    fn test_rewrite_path() {
        assert_eq!(rewrite_path("/api", "/openapi", "/api/task").as_deref(), Some("/openapi/task"));
        assert_eq!(
            rewrite_path("/api", "/openapi", "/api/task/abc/def").as_deref(),
            Some("/openapi/task/abc/def")
        );
        assert_eq!(rewrite_path("/api", "/openapi", "/api").as_deref(), Some("/openapi"));
        assert_eq!(rewrite_path("/api", "/openapi", "/apix/task"), None);
        assert_eq!(rewrite_path("/api", "/openapi", "/health"), None);
    }

    #[test]
    fn test_upstream_url_keeps_query_verbatim() {
        let gw = gateway("https://api.example.com/");
        assert_eq!(
            gw.upstream_url("/api/task/t_1", Some("a=1&b=%20x")).as_deref(),
            Some("https://api.example.com/openapi/task/t_1?a=1&b=%20x")
        );
        assert_eq!(
            gw.upstream_url("/api/upload", None).as_deref(),
            Some("https://api.example.com/openapi/upload")
        );
    }

    #[test]
    fn test_normalize_target_url() {
        assert_eq!(normalize_target_url("cdn.example.com/m.glb"), "https://cdn.example.com/m.glb");
        assert_eq!(normalize_target_url("//cdn.example.com/m.glb"), "https://cdn.example.com/m.glb");
        assert_eq!(normalize_target_url("http://cdn.example.com/m.glb"), "http://cdn.example.com/m.glb");
        assert_eq!(normalize_target_url("https://cdn.example.com/m.glb"), "https://cdn.example.com/m.glb");
    }

    #[test]
    fn test_artifact_url_dials_https_when_scheme_missing() {
        let url = artifact_url(Some(" cdn.example.com/models/m.glb?sig=1 ")).unwrap();
        assert_eq!(url.scheme(), "https");
        assert_eq!(url.as_str(), "https://cdn.example.com/models/m.glb?sig=1");

        let url = artifact_url(Some("http://127.0.0.1:9000/files/m.glb")).unwrap();
        assert_eq!(url.scheme(), "http");
        assert_eq!(url.port(), Some(9000));

        assert!(matches!(artifact_url(None), Err(ProxyError::BadRequest(_))));
    }

    #[tokio::test]
    async fn test_fetch_artifact_dials_normalized_url() {
        // A bare host:port becomes https://; a plain-HTTP listener then
        // fails the TLS handshake instead of serving the file.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            while let Ok((mut socket, _)) = listener.accept().await {
                use tokio::io::AsyncWriteExt;
                let _ = socket
                    .write_all(b"HTTP/1.1 200 OK\r\nContent-Length: 2\r\n\r\nok")
                    .await;
            }
        });

        let gw = gateway("https://api.example.com");
        let plain = gw
            .fetch_artifact(Some(&format!("http://{}/m.glb", addr)))
            .await
            .unwrap();
        assert_eq!(plain.as_ref(), b"ok");

        let err = gw
            .fetch_artifact(Some(&format!("{}/m.glb", addr)))
            .await
            .unwrap_err();
        assert!(matches!(err, ProxyError::Upstream(_)));
    }

    #[test]
    fn test_watch_url() {
        let gw = gateway("https://api.example.com");
        assert_eq!(
            gw.watch_url("t_1").unwrap().as_str(),
            "wss://api.example.com/openapi/task/watch/t_1"
        );

        let gw = gateway("http://127.0.0.1:9000");
        assert_eq!(
            gw.watch_url("abc").unwrap().as_str(),
            "ws://127.0.0.1:9000/openapi/task/watch/abc"
        );
    }

    #[test]
    fn test_missing_credential() {
        let config = ProxyConfig::default();
        let gw = UpstreamGateway::new(&config).unwrap();
        assert!(matches!(gw.credential(), Err(ProxyError::MissingCredential)));
    }

    #[tokio::test]
    async fn test_forward_without_credential_fails_fast() {
        let mut config = ProxyConfig::default();
        // Unroutable; the call must never get this far.
        config.upstream.base_url = "http://127.0.0.1:9".into();
        let gw = UpstreamGateway::new(&config).unwrap();

        let err = gw
            .forward(ProxyRequest {
                method: Method::GET,
                path: "/api/task/t_1".into(),
                query: None,
                headers: HeaderMap::new(),
                body: Bytes::new(),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, ProxyError::MissingCredential));
    }

    #[tokio::test]
    async fn test_fetch_artifact_requires_url() {
        let gw = gateway("https://api.example.com");
        assert!(matches!(gw.fetch_artifact(None).await, Err(ProxyError::BadRequest(_))));
        assert!(matches!(gw.fetch_artifact(Some("  ")).await, Err(ProxyError::BadRequest(_))));
    }

    #[tokio::test]
    async fn test_fetch_artifact_malformed_target_is_upstream_error() {
        let gw = gateway("https://api.example.com");
        let err = gw.fetch_artifact(Some("http://[::1")).await.unwrap_err();
        assert!(matches!(err, ProxyError::Upstream(_)));
    }
}
