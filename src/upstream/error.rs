//! Proxy-layer error taxonomy.

use axum::http::StatusCode;
use serde_json::{json, Value};
use thiserror::Error;

use crate::config::loader::CREDENTIAL_ENV;
use crate::config::Credential;

/// Errors produced while relaying a request to the upstream service.
///
/// Every variant is recovered into a JSON `{error, message}` response; none
/// of them terminates the process.
#[derive(Debug, Error)]
pub enum ProxyError {
    /// The upstream credential is not configured.
    #[error("{} is not configured on the server", CREDENTIAL_ENV)]
    MissingCredential,

    /// A required request parameter is missing or malformed.
    #[error("{0}")]
    BadRequest(String),

    /// The inbound body exceeds the configured ceiling.
    #[error("request body exceeds the {limit} byte limit")]
    PayloadTooLarge { limit: usize },

    /// The upstream call failed (transport error, bad target, oversize artifact).
    #[error("{0}")]
    Upstream(String),
}

impl ProxyError {
    /// HTTP status this error is surfaced with.
    pub fn status(&self) -> StatusCode {
        match self {
            ProxyError::MissingCredential => StatusCode::INTERNAL_SERVER_ERROR,
            ProxyError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ProxyError::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            ProxyError::Upstream(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Stable machine-readable label placed in the `error` field.
    pub fn label(&self) -> &'static str {
        match self {
            ProxyError::MissingCredential => "configuration_error",
            ProxyError::BadRequest(_) => "bad_request",
            ProxyError::PayloadTooLarge { .. } => "payload_too_large",
            ProxyError::Upstream(_) => "upstream_error",
        }
    }

    /// JSON body for this error with the credential scrubbed from the message.
    pub fn to_body(&self, credential: Option<&Credential>) -> Value {
        json!({
            "error": self.label(),
            "message": redact(&self.to_string(), credential),
        })
    }
}

/// Replace every occurrence of the credential in `message`.
pub fn redact(message: &str, credential: Option<&Credential>) -> String {
    match credential {
        Some(cred) => message.replace(cred.expose(), "[redacted]"),
        None => message.to_string(),
    }
}
