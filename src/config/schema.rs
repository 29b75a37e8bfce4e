//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the bridge.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

/// Root configuration for the bridge.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ProxyConfig {
    /// Listener configuration (bind address).
    pub listener: ListenerConfig,

    /// Upstream generative-model API settings.
    pub upstream: UpstreamConfig,

    /// CORS headers answered to the browser.
    pub cors: CorsConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Body and download size ceilings.
    pub limits: LimitsConfig,

    /// Serverless deployment settings.
    pub serverless: ServerlessConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
        }
    }
}

/// Upstream API configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct UpstreamConfig {
    /// Base URL of the upstream service (e.g., "https://api.tripo3d.ai").
    pub base_url: String,

    /// Path prefix the upstream API lives under.
    pub api_prefix: String,

    /// Local path prefix rewritten to `api_prefix`.
    pub local_prefix: String,

    /// Bearer credential injected into every upstream call.
    #[serde(skip_serializing)]
    pub api_key: Option<Credential>,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.tripo3d.ai".to_string(),
            api_prefix: "/openapi".to_string(),
            local_prefix: "/api".to_string(),
            api_key: None,
        }
    }
}

/// CORS configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CorsConfig {
    /// Origin allowed to call the bridge from a browser.
    pub allowed_origin: String,

    /// Methods advertised in `Access-Control-Allow-Methods`.
    pub allowed_methods: Vec<String>,

    /// Headers advertised in `Access-Control-Allow-Headers`.
    pub allowed_headers: Vec<String>,

    /// Preflight cache lifetime in seconds.
    pub max_age_secs: u64,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            allowed_origin: "*".to_string(),
            allowed_methods: ["GET", "POST", "PUT", "DELETE", "OPTIONS"]
                .into_iter()
                .map(String::from)
                .collect(),
            allowed_headers: ["Content-Type", "Authorization", "X-Requested-With"]
                .into_iter()
                .map(String::from)
                .collect(),
            max_age_secs: 86_400,
        }
    }
}

/// Timeout configuration for upstream calls.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Connection establishment timeout in seconds.
    pub connect_secs: u64,

    /// Request timeout (total time for request/response) in seconds.
    pub request_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            connect_secs: 10,
            request_secs: 120,
        }
    }
}

/// Size ceilings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LimitsConfig {
    /// Maximum inbound request body forwarded upstream, in bytes.
    pub max_body_bytes: usize,

    /// Maximum artifact size the download relay will buffer, in bytes.
    pub max_download_bytes: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_body_bytes: 20 * 1024 * 1024,      // 20MB
            max_download_bytes: 200 * 1024 * 1024, // 200MB
        }
    }
}

/// Serverless deployment settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerlessConfig {
    /// Function path prefix rewritten to the local prefix before routing.
    pub function_prefix: String,
}

impl Default for ServerlessConfig {
    fn default() -> Self {
        Self {
            function_prefix: "/.netlify/functions/api".to_string(),
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Log output format.
    pub log_format: LogFormat,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_enabled: true,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

/// Upstream bearer credential.
///
/// Never printed by `Debug`/`Display` and never serialized.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential(String);

impl Credential {
    /// Wrap a raw secret. Returns `None` for blank input.
    pub fn new(secret: impl Into<String>) -> Option<Self> {
        let secret = secret.into().trim().to_string();
        if secret.is_empty() {
            None
        } else {
            Some(Self(secret))
        }
    }

    /// The raw secret, for building the `Authorization` header only.
    pub fn expose(&self) -> &str {
        &self.0
    }

    /// `Bearer <secret>` header value.
    pub fn bearer(&self) -> String {
        format!("Bearer {}", self.0)
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Credential([redacted])")
    }
}

impl fmt::Display for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[redacted]")
    }
}

impl<'de> Deserialize<'de> for Credential {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Credential::new(raw).ok_or_else(|| serde::de::Error::custom("api_key must not be blank"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ProxyConfig::default();
        assert_eq!(config.upstream.local_prefix, "/api");
        assert_eq!(config.upstream.api_prefix, "/openapi");
        assert!(config.upstream.api_key.is_none());
        assert_eq!(config.cors.allowed_origin, "*");
    }

    #[test]
    fn test_credential_is_redacted() {
        let cred = Credential::new("tsk_secret").unwrap();
        assert_eq!(format!("{}", cred), "[redacted]");
        assert!(!format!("{:?}", cred).contains("tsk_secret"));
        assert_eq!(cred.bearer(), "Bearer tsk_secret");
    }

    #[test]
    fn test_blank_credential_rejected() {
        assert!(Credential::new("   ").is_none());
    }

    #[test]
    fn test_credential_never_serialized() {
        let mut config = ProxyConfig::default();
        config.upstream.api_key = Credential::new("tsk_secret");
        let rendered = toml::to_string(&config).unwrap();
        assert!(!rendered.contains("tsk_secret"));
    }

    #[test]
    fn test_partial_toml() {
        let config: ProxyConfig = toml::from_str(
            r#"
            [upstream]
            base_url = "http://localhost:9000"
            api_key = "abc"

            [cors]
            allowed_origin = "https://app.example.com"
            "#,
        )
        .unwrap();
        assert_eq!(config.upstream.base_url, "http://localhost:9000");
        assert_eq!(config.upstream.api_prefix, "/openapi");
        assert_eq!(config.upstream.api_key.unwrap().expose(), "abc");
        assert_eq!(config.cors.allowed_origin, "https://app.example.com");
        assert_eq!(config.listener.bind_address, "0.0.0.0:8080");
    }
}
