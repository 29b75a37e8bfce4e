//! Task model as observed through the proxy.
//!
//! The orchestration client never writes task state. Everything here is a
//! read-only view decoded from upstream payloads.

use std::fmt;

use serde::Serialize;

/// What a task produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskKind {
    Generation,
    Conversion,
}

impl TaskKind {
    /// Classify the provider's task `type` field.
    pub fn from_wire(raw: &str) -> Self {
        match raw {
            "convert_model" | "conversion" => TaskKind::Conversion,
            _ => TaskKind::Generation,
        }
    }
}

/// Reported task status.
///
/// Unrecognized strings are kept verbatim in [`TaskStatus::Other`] and are
/// treated as non-terminal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskStatus {
    Queued,
    Running,
    Success,
    /// A failure-equivalent terminal value (`failed`, `cancelled`, `banned`, `expired`).
    Failed(String),
    Other(String),
}

impl TaskStatus {
    pub fn parse(raw: &str) -> Self {
        let normalized = raw.trim().to_ascii_lowercase();
        match normalized.as_str() {
            "queued" => TaskStatus::Queued,
            "running" => TaskStatus::Running,
            "success" => TaskStatus::Success,
            "failed" | "cancelled" | "banned" | "expired" => TaskStatus::Failed(normalized),
            _ => TaskStatus::Other(normalized),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            TaskStatus::Queued => "queued",
            TaskStatus::Running => "running",
            TaskStatus::Success => "success",
            TaskStatus::Failed(raw) | TaskStatus::Other(raw) => raw,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Success | TaskStatus::Failed(_))
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Output of a successful task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskResult {
    pub artifact_url: String,
    pub artifact_type: Option<String>,
}

/// One observation of an upstream task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Task {
    pub id: String,
    pub kind: TaskKind,
    pub status: TaskStatus,
    /// Percentage 0-100, when the provider reports one.
    pub progress: Option<u8>,
    /// Present only on success.
    pub result: Option<TaskResult>,
}

/// Token returned by the upload endpoint, consumed by one generation call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadResult {
    pub file_token: String,
    /// Image type sent alongside the token (`jpg`, `png`, `webp`).
    pub image_type: String,
}

/// Passed to the progress callback after every non-terminal poll.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressEvent {
    pub task_id: String,
    pub status: TaskStatus,
    pub progress: Option<u8>,
    pub attempt: u32,
}

/// Final downloadable output of a pipeline run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedArtifact {
    pub task_id: String,
    pub url: String,
    /// Lowercase file extension, without the dot.
    pub extension: String,
}

/// Provider generation knobs. Unset fields are left to upstream defaults.
#[derive(Debug, Clone, Default, Serialize)]
pub struct GenerationOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub texture: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pbr: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub face_limit: Option<u32>,
}

/// Everything needed to start a generation task from an uploaded image.
#[derive(Debug, Clone, Default)]
pub struct GenerationRequest {
    pub prompt: Option<String>,
    pub options: GenerationOptions,
}

/// Image type the provider expects for `file_name`, from its extension.
pub fn image_type_for(file_name: &str) -> &'static str {
    let ext = file_name
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "png" => "png",
        "webp" => "webp",
        _ => "jpg",
    }
}

/// MIME type for an uploaded image.
pub fn mime_type_for(file_name: &str) -> &'static str {
    match image_type_for(file_name) {
        "png" => "image/png",
        "webp" => "image/webp",
        _ => "image/jpeg",
    }
}
