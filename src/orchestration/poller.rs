//! Bounded polling of a task to a terminal state.
//!
//! # Responsibilities
//! - Issue status checks sequentially on a fixed interval
//! - Stop on the first terminal status
//! - Tolerate transient status-check failures within the attempt budget
//! - Report progress for every non-terminal observation
//!
//! # Design Decisions
//! - The budget counts attempts, not wall-clock time; a slow call only
//!   costs the one attempt it occupies
//! - Cancellation is observed both during a call and during the sleep

use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::orchestration::error::TaskError;
use crate::orchestration::types::{ProgressEvent, Task, TaskStatus};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);
pub const DEFAULT_MAX_ATTEMPTS: u32 = 300;

/// Poll cadence and budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollSettings {
    pub interval: Duration,
    pub max_attempts: u32,
}

impl Default for PollSettings {
    fn default() -> Self {
        Self {
            interval: DEFAULT_POLL_INTERVAL,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }
}

/// Anything that can report the current state of a task.
pub trait TaskSource {
    fn fetch_task(&self, task_id: &str) -> impl Future<Output = Result<Task, TaskError>> + Send;
}

/// Poll `task_id` until it succeeds, fails, the budget runs out or `cancel` fires.
///
/// Exactly one status call is in flight at any time. `on_progress` runs after
/// each non-terminal observation and never after a terminal one.
pub async fn poll_task<S, F>(
    source: &S,
    task_id: &str,
    settings: PollSettings,
    cancel: &CancellationToken,
    mut on_progress: F,
) -> Result<Task, TaskError>
where
    S: TaskSource + Sync,
    F: FnMut(ProgressEvent),
{
    let cancelled = || TaskError::Cancelled(task_id.to_string());

    for attempt in 1..=settings.max_attempts {
        if cancel.is_cancelled() {
            return Err(cancelled());
        }

        let fetched = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(cancelled()),
            fetched = source.fetch_task(task_id) => fetched,
        };

        match fetched {
            Ok(task) if task.status == TaskStatus::Success => {
                tracing::info!(task_id, attempt, "Task succeeded");
                return Ok(task);
            }
            Ok(Task {
                status: TaskStatus::Failed(status),
                ..
            }) => {
                tracing::warn!(task_id, attempt, status = %status, "Task failed");
                return Err(TaskError::TaskFailed {
                    task_id: task_id.to_string(),
                    status,
                });
            }
            Ok(task) => {
                tracing::debug!(task_id, attempt, status = %task.status, progress = ?task.progress, "Task pending");
                on_progress(ProgressEvent {
                    task_id: task_id.to_string(),
                    status: task.status,
                    progress: task.progress,
                    attempt,
                });
            }
            Err(e) if e.is_transient() => {
                tracing::warn!(task_id, attempt, error = %e, "Status check failed, will retry");
            }
            Err(e) => return Err(e),
        }

        if attempt < settings.max_attempts {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(cancelled()),
                _ = tokio::time::sleep(settings.interval) => {}
            }
        }
    }

    Err(TaskError::PollingTimeout {
        task_id: task_id.to_string(),
        attempts: settings.max_attempts,
    })
}
