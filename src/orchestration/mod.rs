//! Task orchestration client.
//!
//! Drives upload → generation → optional conversion → artifact resolution
//! against the proxy, with bounded polling and typed failures.

pub mod artifact;
pub mod client;
pub mod error;
pub mod payload;
pub mod poller;
pub mod types;

pub use artifact::{needs_conversion, resolve_artifact};
pub use client::{GenerationOutcome, TaskClient};
pub use error::TaskError;
pub use poller::{poll_task, PollSettings, TaskSource, DEFAULT_MAX_ATTEMPTS, DEFAULT_POLL_INTERVAL};
pub use types::{
    GenerationOptions, GenerationRequest, ProgressEvent, ResolvedArtifact, Task, TaskKind,
    TaskResult, TaskStatus, UploadResult,
};
