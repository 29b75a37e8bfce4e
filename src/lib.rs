//! Credential-hiding bridge between a browser and a generative 3D API.

pub mod config;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod orchestration;
pub mod serverless;
pub mod upstream;

pub use config::schema::ProxyConfig;
pub use http::HttpServer;
pub use lifecycle::Shutdown;
pub use orchestration::{TaskClient, TaskError};
pub use serverless::ServerlessHandler;
