//! Upstream API access shared by every deployment shape.
//!
//! # Data Flow
//! ```text
//! ProxyRequest (framework-free)
//!     → gateway.rs (prefix rewrite, credential injection)
//!     → headers.rs (strip hop-by-hop / host-specific headers)
//!     → reqwest → upstream API
//!     → UpstreamResponse (status, filtered headers, body)
//!
//! Download relay:
//!     ?url=<target> → gateway.rs (scheme default, bounded fetch) → Bytes
//! ```
//!
//! # Design Decisions
//! - One pooled client per process, no per-request state
//! - The credential is attached here and nowhere else
//! - Errors carry credential-free messages (error.rs redacts)

pub mod error;
pub mod gateway;
pub mod headers;

pub use error::ProxyError;
pub use gateway::{artifact_url, normalize_target_url, rewrite_path, ProxyRequest, UpstreamGateway, UpstreamResponse};
