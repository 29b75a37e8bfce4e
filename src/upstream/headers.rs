//! Header filtering between the browser and the upstream service.
//!
//! # Responsibilities
//! - Strip hop-by-hop and host-specific request headers before forwarding
//! - Drop the client's own `Authorization` (the bridge injects its own)
//! - Strip hop-by-hop and upstream CORS headers from relayed responses

use axum::http::header::{
    AUTHORIZATION, CONNECTION, CONTENT_LENGTH, HOST, PROXY_AUTHENTICATE, PROXY_AUTHORIZATION,
    TE, TRAILER, TRANSFER_ENCODING, UPGRADE,
};
use axum::http::{HeaderMap, HeaderName};

const KEEP_ALIVE: &str = "keep-alive";

fn is_hop_by_hop(name: &HeaderName) -> bool {
    name == CONNECTION
        || name == TE
        || name == TRAILER
        || name == TRANSFER_ENCODING
        || name == UPGRADE
        || name == PROXY_AUTHENTICATE
        || name == PROXY_AUTHORIZATION
        || name.as_str() == KEEP_ALIVE
}

/// Headers from the browser request that may be sent upstream.
pub fn forwardable_request_headers(headers: &HeaderMap) -> HeaderMap {
    let mut out = HeaderMap::with_capacity(headers.len());
    for (name, value) in headers {
        if is_hop_by_hop(name) || name == HOST || name == CONTENT_LENGTH || name == AUTHORIZATION {
            continue;
        }
        out.append(name.clone(), value.clone());
    }
    out
}

/// Headers from the upstream response that may be relayed to the browser.
///
/// `Content-Length` is recomputed locally and `Access-Control-*` is replaced
/// by the bridge's own CORS policy.
pub fn relayable_response_headers(headers: &HeaderMap) -> HeaderMap {
    let mut out = HeaderMap::with_capacity(headers.len());
    for (name, value) in headers {
        if is_hop_by_hop(name)
            || name == CONTENT_LENGTH
            || name.as_str().starts_with("access-control-")
        {
            continue;
        }
        out.append(name.clone(), value.clone());
    }
    out
}
