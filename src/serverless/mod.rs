//! Serverless deployment variant.
//!
//! # Data Flow
//! ```text
//! platform event JSON
//!     → event.rs (ServerlessEvent)
//!     → handler.rs (normalize path, route)
//!     → upstream gateway (same forward / fetch_artifact as the server)
//!     → ServerlessResponse JSON (binary bodies base64 + flag)
//! ```
//!
//! # Design Decisions
//! - Stateless: one handler per process, one event per call
//! - No WebSocket relay in this shape

pub mod event;
pub mod handler;

pub use event::{ServerlessEvent, ServerlessResponse};
pub use handler::ServerlessHandler;
