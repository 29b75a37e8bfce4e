//! CORS headers answered locally for every `/api` response.
//!
//! Upstream `Access-Control-*` headers are discarded before these are
//! applied, so the browser only ever sees the locally allowed origin.

use axum::http::header::{
    ACCESS_CONTROL_ALLOW_HEADERS, ACCESS_CONTROL_ALLOW_METHODS, ACCESS_CONTROL_ALLOW_ORIGIN,
    ACCESS_CONTROL_MAX_AGE, VARY,
};
use axum::http::header::{HeaderValue, InvalidHeaderValue};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};

use crate::config::CorsConfig;

/// Pre-rendered CORS header values.
#[derive(Debug, Clone)]
pub struct CorsPolicy {
    allow_origin: HeaderValue,
    allow_methods: HeaderValue,
    allow_headers: HeaderValue,
    max_age: HeaderValue,
    wildcard: bool,
}

impl CorsPolicy {
    pub fn from_config(config: &CorsConfig) -> Result<Self, InvalidHeaderValue> {
        Ok(Self {
            allow_origin: HeaderValue::from_str(&config.allowed_origin)?,
            allow_methods: HeaderValue::from_str(&config.allowed_methods.join(", "))?,
            allow_headers: HeaderValue::from_str(&config.allowed_headers.join(", "))?,
            max_age: HeaderValue::from(config.max_age_secs),
            wildcard: config.allowed_origin == "*",
        })
    }

    /// Overwrite the CORS headers on a response.
    pub fn apply(&self, headers: &mut HeaderMap) {
        headers.insert(ACCESS_CONTROL_ALLOW_ORIGIN, self.allow_origin.clone());
        headers.insert(ACCESS_CONTROL_ALLOW_METHODS, self.allow_methods.clone());
        headers.insert(ACCESS_CONTROL_ALLOW_HEADERS, self.allow_headers.clone());
        if !self.wildcard {
            headers.append(VARY, HeaderValue::from_static("Origin"));
        }
    }

    /// Name/value pairs, for transports that are not `HeaderMap` based.
    /// `preflight` adds `Access-Control-Max-Age`.
    pub fn pairs(&self, preflight: bool) -> Vec<(&'static str, String)> {
        let mut pairs = vec![
            ("Access-Control-Allow-Origin", header_text(&self.allow_origin)),
            ("Access-Control-Allow-Methods", header_text(&self.allow_methods)),
            ("Access-Control-Allow-Headers", header_text(&self.allow_headers)),
        ];
        if !self.wildcard {
            pairs.push(("Vary", "Origin".to_string()));
        }
        if preflight {
            pairs.push(("Access-Control-Max-Age", header_text(&self.max_age)));
        }
        pairs
    }

    /// Answer a preflight: 200, CORS headers, empty body.
    pub fn preflight(&self) -> Response {
        let mut response = StatusCode::OK.into_response();
        self.apply(response.headers_mut());
        response
            .headers_mut()
            .insert(ACCESS_CONTROL_MAX_AGE, self.max_age.clone());
        response
    }
}

fn header_text(value: &HeaderValue) -> String {
    value.to_str().unwrap_or_default().to_string()
}
