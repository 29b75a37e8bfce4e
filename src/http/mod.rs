//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, middleware, route priority)
//!     → request.rs (request ID)
//!     → OPTIONS?            → cors.rs preflight (never forwarded)
//!     → /api/download       → proxy.rs download relay
//!     → /api/task/watch     → websocket.rs relay pair
//!     → /api/<rest>         → proxy.rs → upstream gateway
//!     → response.rs (relay status/body, CORS, JSON errors)
//!     → Send to client
//! ```

pub mod cors;
pub mod proxy;
pub mod request;
pub mod response;
pub mod server;
pub mod websocket;

pub use cors::CorsPolicy;
pub use request::X_REQUEST_ID;
pub use server::{AppState, HttpServer, ServerError};
