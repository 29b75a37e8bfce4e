//! Final artifact resolution.

use url::Url;

use crate::orchestration::error::TaskError;
use crate::orchestration::types::{ResolvedArtifact, Task};

/// Extension used when neither the declared type nor the URL names one.
pub const DEFAULT_MODEL_FORMAT: &str = "glb";

/// Declared types that mean "packaged output" rather than a raw model file.
const PACKAGED_TYPES: &[&str] = &["zip"];

/// Resolve the download URL and file extension of a successful task.
pub fn resolve_artifact(task: &Task) -> Result<ResolvedArtifact, TaskError> {
    let result = task
        .result
        .as_ref()
        .ok_or(TaskError::MissingIdentifier("artifact URL"))?;

    let from_url = extension_from_url(&result.artifact_url);
    let declared = result.artifact_type.as_deref().map(str::to_ascii_lowercase);

    let packaged = declared
        .iter()
        .chain(from_url.iter())
        .any(|ext| PACKAGED_TYPES.contains(&ext.as_str()));

    let extension = if packaged {
        "zip".to_string()
    } else {
        declared
            .or(from_url)
            .unwrap_or_else(|| DEFAULT_MODEL_FORMAT.to_string())
    };

    Ok(ResolvedArtifact {
        task_id: task.id.clone(),
        url: result.artifact_url.clone(),
        extension,
    })
}

/// Whether a conversion task is needed to reach `requested` from `produced`.
pub fn needs_conversion(produced: &str, requested: Option<&str>) -> bool {
    requested
        .map(str::trim)
        .filter(|r| !r.is_empty())
        .is_some_and(|r| !r.eq_ignore_ascii_case(produced))
}

fn extension_from_url(raw: &str) -> Option<String> {
    let path = match Url::parse(raw) {
        Ok(url) => url.path().to_string(),
        Err(_) => raw.split(['?', '#']).next().unwrap_or_default().to_string(),
    };
    let file = path.rsplit('/').next()?;
    let (_, ext) = file.rsplit_once('.')?;
    if ext.is_empty() || !ext.chars().all(|c| c.is_ascii_alphanumeric()) {
        return None;
    }
    Some(ext.to_ascii_lowercase())
}
