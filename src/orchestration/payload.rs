//! Decoding of upstream response payloads.
//!
//! The provider wraps data in a `{code, data}` envelope, but field names
//! inside `data` are not stable across API versions. Identifiers are looked up
//! through ordered lists of JSON pointers and the first non-empty match wins.

use serde_json::Value;

use crate::orchestration::error::TaskError;
use crate::orchestration::types::{Task, TaskKind, TaskResult, TaskStatus, UploadResult};

const FILE_TOKEN_POINTERS: &[&str] = &[
    "/data/image_token",
    "/data/file_token",
    "/data/token",
    "/data/fileToken",
    "/file_token",
    "/image_token",
    "/token",
];

const TASK_ID_POINTERS: &[&str] = &[
    "/data/task_id",
    "/data/taskId",
    "/data/id",
    "/task_id",
    "/taskId",
    "/id",
];

const ARTIFACT_URL_POINTERS: &[&str] = &[
    "/result/artifactUrl",
    "/result/artifact_url",
    "/output/pbr_model",
    "/output/model",
    "/output/base_model",
    "/result/pbr_model/url",
    "/result/model/url",
];

const ARTIFACT_TYPE_POINTERS: &[&str] = &[
    "/result/artifactType",
    "/result/artifact_type",
    "/result/pbr_model/type",
    "/result/model/type",
];

/// First non-empty string (or number) found at any of `pointers`.
pub fn first_string(payload: &Value, pointers: &[&str]) -> Option<String> {
    pointers.iter().find_map(|pointer| match payload.pointer(pointer)? {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    })
}

/// Reject envelopes whose `code` is present and non-zero.
pub fn check_envelope(payload: &Value, http_status: u16) -> Result<(), TaskError> {
    match payload.get("code").and_then(Value::as_i64) {
        Some(0) | None => Ok(()),
        Some(code) => {
            let message = payload
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("request rejected");
            Err(TaskError::Api {
                status: http_status,
                message: format!("upstream code {}: {}", code, message),
            })
        }
    }
}

pub fn parse_upload(payload: &Value, image_type: &str) -> Result<UploadResult, TaskError> {
    let file_token =
        first_string(payload, FILE_TOKEN_POINTERS).ok_or(TaskError::MissingIdentifier("file token"))?;
    Ok(UploadResult {
        file_token,
        image_type: image_type.to_string(),
    })
}

pub fn parse_task_id(payload: &Value) -> Result<String, TaskError> {
    first_string(payload, TASK_ID_POINTERS).ok_or(TaskError::MissingIdentifier("task id"))
}

/// Decode a status payload. `requested_id` is used when the body omits the id.
pub fn parse_task(payload: &Value, requested_id: &str) -> Result<Task, TaskError> {
    let data = payload.get("data").filter(|d| d.is_object()).unwrap_or(payload);

    let status = data
        .get("status")
        .and_then(Value::as_str)
        .map(TaskStatus::parse)
        .ok_or_else(|| TaskError::Decode("task payload has no status".into()))?;

    let id = first_string(data, &["/task_id", "/taskId", "/id"])
        .unwrap_or_else(|| requested_id.to_string());
    let kind = data
        .get("type")
        .and_then(Value::as_str)
        .map(TaskKind::from_wire)
        .unwrap_or(TaskKind::Generation);
    let progress = data
        .get("progress")
        .and_then(Value::as_f64)
        .map(|p| p.clamp(0.0, 100.0).round() as u8);

    let result = if status == TaskStatus::Success {
        first_string(data, ARTIFACT_URL_POINTERS).map(|artifact_url| TaskResult {
            artifact_url,
            artifact_type: first_string(data, ARTIFACT_TYPE_POINTERS)
                .map(|t| t.to_ascii_lowercase()),
        })
    } else {
        None
    };

    Ok(Task {
        id,
        kind,
        status,
        progress,
        result,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_file_token_fallbacks() {
        let upload = parse_upload(&json!({"code": 0, "data": {"image_token": "ft_1"}}), "png").unwrap();
        assert_eq!(upload.file_token, "ft_1");
        assert_eq!(upload.image_type, "png");

        let upload = parse_upload(&json!({"data": {"fileToken": "ft_2"}}), "jpg").unwrap();
        assert_eq!(upload.file_token, "ft_2");

        let upload = parse_upload(&json!({"token": "ft_3"}), "jpg").unwrap();
        assert_eq!(upload.file_token, "ft_3");
    }

    #[test]
    fn test_missing_file_token() {
        let err = parse_upload(&json!({"code": 0, "data": {"image_token": ""}}), "jpg").unwrap_err();
        assert!(matches!(err, TaskError::MissingIdentifier("file token")));
    }

    #[test]
    fn test_task_id() {
        assert_eq!(parse_task_id(&json!({"data": {"task_id": "t_1"}})).unwrap(), "t_1");
        assert_eq!(parse_task_id(&json!({"taskId": "t_9"})).unwrap(), "t_9");
        assert!(matches!(
            parse_task_id(&json!({"code": 0, "data": {}})),
            Err(TaskError::MissingIdentifier("task id"))
        ));
    }

    #[test]
    fn test_envelope_code() {
        assert!(check_envelope(&json!({"code": 0, "data": {}}), 200).is_ok());
        assert!(check_envelope(&json!({"data": {}}), 200).is_ok());
        let err = check_envelope(&json!({"code": 2002, "message": "bad file"}), 200).unwrap_err();
        match err {
            TaskError::Api { status, message } => {
                assert_eq!(status, 200);
                assert!(message.contains("2002"));
                assert!(message.contains("bad file"));
            }
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[test]
    fn test_running_task() {
        let task = parse_task(&json!({"data": {"status": "running", "progress": 40}}), "t_1").unwrap();
        assert_eq!(task.id, "t_1");
        assert_eq!(task.status, TaskStatus::Running);
        assert_eq!(task.progress, Some(40));
        assert!(task.result.is_none());
    }

    #[test]
    fn test_success_result_shapes() {
        let task = parse_task(
            &json!({"status": "success", "result": {"artifactUrl": "https://x/model.glb", "artifactType": "GLB"}}),
            "t_1",
        )
        .unwrap();
        let result = task.result.unwrap();
        assert_eq!(result.artifact_url, "https://x/model.glb");
        assert_eq!(result.artifact_type.as_deref(), Some("glb"));

        let task = parse_task(
            &json!({"code": 0, "data": {"task_id": "t_2", "type": "convert_model", "status": "success",
                    "output": {"model": "https://x/out.zip"}}}),
            "ignored",
        )
        .unwrap();
        assert_eq!(task.id, "t_2");
        assert_eq!(task.kind, TaskKind::Conversion);
        assert_eq!(task.result.unwrap().artifact_url, "https://x/out.zip");
    }

    #[test]
    fn test_missing_status_is_decode_error() {
        assert!(matches!(parse_task(&json!({"data": {}}), "t"), Err(TaskError::Decode(_))));
    }
}
