//! Orchestration client error taxonomy.

use thiserror::Error;

/// Errors surfaced to callers of the orchestration client.
///
/// Each failure class is its own variant so the UI can tell a reported task
/// failure from a timeout, a missing identifier or a transport problem.
#[derive(Debug, Error)]
pub enum TaskError {
    /// The proxy has no upstream credential configured.
    #[error("server configuration error: {0}")]
    MissingCredential(String),

    /// An upstream response lacked a required identifier.
    #[error("upstream response did not contain a {0}")]
    MissingIdentifier(&'static str),

    /// The provider reported the task in a failure-equivalent terminal state.
    #[error("task {task_id} failed with status '{status}'")]
    TaskFailed { task_id: String, status: String },

    /// The attempt budget ran out before the task reached a terminal state.
    #[error("task {task_id} did not finish after {attempts} status checks")]
    PollingTimeout { task_id: String, attempts: u32 },

    /// The HTTP request itself failed (network, DNS, TLS, etc.).
    #[error("HTTP request failed: {0}")]
    Transport(#[from] reqwest::Error),

    /// The proxy or provider answered with an error status.
    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    /// A response body could not be interpreted.
    #[error("invalid response payload: {0}")]
    Decode(String),

    /// The proxy URL the client was built with cannot carry a task path.
    #[error("invalid proxy URL: {0}")]
    InvalidUrl(String),

    /// The caller cancelled polling.
    #[error("polling task {0} was cancelled")]
    Cancelled(String),
}

impl TaskError {
    /// Whether a status-check failure may be retried within the attempt budget.
    pub fn is_transient(&self) -> bool {
        match self {
            TaskError::Transport(_) | TaskError::Decode(_) => true,
            TaskError::Api { status, .. } => *status >= 500 || *status == 408 || *status == 429,
            _ => false,
        }
    }
}
