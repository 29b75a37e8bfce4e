//! HTTP client that drives a generation through the proxy.
//!
//! # Responsibilities
//! - Upload an image and extract its file token
//! - Create generation and conversion tasks
//! - Poll tasks to a terminal state via [`poll_task`]
//! - Resolve and download the final artifact through the download relay
//!
//! # Data Flow
//! ```text
//! upload ──→ create generation ──→ poll ──┬──→ resolve artifact
//!                                         └──→ create conversion ──→ poll ──→ resolve artifact
//! ```
//!
//! The client talks only to the proxy's `/api` root and never holds the
//! upstream credential.

use bytes::Bytes;
use reqwest::multipart::{Form, Part};
use serde_json::{json, Map, Value};
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::orchestration::artifact::{needs_conversion, resolve_artifact};
use crate::orchestration::error::TaskError;
use crate::orchestration::payload::{check_envelope, parse_task, parse_task_id, parse_upload};
use crate::orchestration::poller::{poll_task, PollSettings, TaskSource};
use crate::orchestration::types::{
    image_type_for, mime_type_for, GenerationRequest, ProgressEvent, ResolvedArtifact, Task,
    UploadResult,
};

/// Error label the proxy uses when it has no upstream credential.
const CONFIGURATION_ERROR: &str = "configuration_error";

/// Result of a full [`TaskClient::generate`] run.
#[derive(Debug, Clone)]
pub struct GenerationOutcome {
    pub generation: Task,
    pub conversion: Option<Task>,
    pub artifact: ResolvedArtifact,
}

/// Orchestration client bound to one proxy.
pub struct TaskClient {
    http: reqwest::Client,
    api_url: String,
    poll: PollSettings,
    cancel: CancellationToken,
}

impl TaskClient {
    /// * `api_url` - the proxy's local prefix, e.g. `http://localhost:8080/api`.
    pub fn new(api_url: impl Into<String>) -> Self {
        Self::with_client(reqwest::Client::new(), api_url)
    }

    /// Reuse an existing [`reqwest::Client`].
    pub fn with_client(http: reqwest::Client, api_url: impl Into<String>) -> Self {
        Self {
            http,
            api_url: api_url.into().trim_end_matches('/').to_string(),
            poll: PollSettings::default(),
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_poll_settings(mut self, poll: PollSettings) -> Self {
        self.poll = poll;
        self
    }

    /// Polling stops with [`TaskError::Cancelled`] once `cancel` fires.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// `POST /api/upload` as multipart field `file`.
    pub async fn upload(&self, file_name: &str, data: impl Into<Bytes>) -> Result<UploadResult, TaskError> {
        let part = Part::stream(reqwest::Body::from(data.into()))
            .file_name(file_name.to_string())
            .mime_str(mime_type_for(file_name))?;
        let form = Form::new().part("file", part);

        let response = self
            .http
            .post(self.url("/upload"))
            .multipart(form)
            .send()
            .await?;

        let payload = Self::parse_response(response).await?;
        let upload = parse_upload(&payload, image_type_for(file_name))?;
        tracing::info!(file_name, "Image uploaded");
        Ok(upload)
    }

    /// `POST /api/task` with an `image_to_model` body. Returns the task id.
    pub async fn create_generation_task(
        &self,
        upload: &UploadResult,
        request: &GenerationRequest,
    ) -> Result<String, TaskError> {
        let body = generation_body(upload, request)?;
        let task_id = self.create_task(&body).await?;
        tracing::info!(task_id = %task_id, "Generation task created");
        Ok(task_id)
    }

    /// `POST /api/task` with a `convert_model` body. Returns the new task id.
    pub async fn create_conversion_task(
        &self,
        original_task_id: &str,
        format: &str,
    ) -> Result<String, TaskError> {
        let body = json!({
            "type": "convert_model",
            "format": format.trim().to_ascii_uppercase(),
            "original_model_task_id": original_task_id,
        });
        let task_id = self.create_task(&body).await?;
        tracing::info!(task_id = %task_id, original_task_id, format, "Conversion task created");
        Ok(task_id)
    }

    /// `GET /api/task/<id>`, one observation.
    pub async fn task_status(&self, task_id: &str) -> Result<Task, TaskError> {
        let response = self.http.get(self.task_url(task_id)?).send().await?;

        let payload = Self::parse_response(response).await?;
        parse_task(&payload, task_id)
    }

    /// Poll `task_id` to a terminal state with this client's settings.
    pub async fn wait_for_task<F>(&self, task_id: &str, on_progress: F) -> Result<Task, TaskError>
    where
        F: FnMut(ProgressEvent),
    {
        poll_task(self, task_id, self.poll, &self.cancel, on_progress).await
    }

    /// Run the whole pipeline for one image.
    ///
    /// When `target_format` differs from what generation produced, a
    /// conversion task is chained and its artifact is the one resolved.
    pub async fn generate<F>(
        &self,
        file_name: &str,
        image: impl Into<Bytes>,
        request: &GenerationRequest,
        target_format: Option<&str>,
        mut on_progress: F,
    ) -> Result<GenerationOutcome, TaskError>
    where
        F: FnMut(ProgressEvent),
    {
        let upload = self.upload(file_name, image).await?;
        let task_id = self.create_generation_task(&upload, request).await?;
        let generation = self.wait_for_task(&task_id, &mut on_progress).await?;
        let produced = resolve_artifact(&generation)?;

        if !needs_conversion(&produced.extension, target_format) {
            return Ok(GenerationOutcome {
                generation,
                conversion: None,
                artifact: produced,
            });
        }

        let format = target_format.unwrap_or_default();
        let conversion_id = self.create_conversion_task(&generation.id, format).await?;
        let conversion = self.wait_for_task(&conversion_id, &mut on_progress).await?;
        let artifact = resolve_artifact(&conversion)?;

        Ok(GenerationOutcome {
            generation,
            conversion: Some(conversion),
            artifact,
        })
    }

    /// Fetch an artifact's bytes through `GET /api/download?url=`.
    pub async fn download_artifact(&self, artifact: &ResolvedArtifact) -> Result<Bytes, TaskError> {
        self.download_url(&artifact.url).await
    }

    /// Fetch any storage URL through the download relay.
    pub async fn download_url(&self, target: &str) -> Result<Bytes, TaskError> {
        let response = self
            .http
            .get(self.url("/download"))
            .query(&[("url", target)])
            .send()
            .await?;

        let response = Self::ensure_success(response).await?;
        Ok(response.bytes().await?)
    }

    // ---- private helpers ----

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.api_url, path)
    }

    /// `<api>/task/<id>` with the id as one percent-encoded segment.
    fn task_url(&self, task_id: &str) -> Result<Url, TaskError> {
        let invalid = |reason: &str| TaskError::InvalidUrl(format!("{}: {}", self.api_url, reason));

        let mut url = Url::parse(&self.api_url).map_err(|e| invalid(&e.to_string()))?;
        url.path_segments_mut()
            .map_err(|_| invalid("cannot be a base"))?
            .pop_if_empty()
            .extend(["task", task_id]);
        Ok(url)
    }

    async fn create_task(&self, body: &Value) -> Result<String, TaskError> {
        let response = self.http.post(self.url("/task")).json(body).send().await?;
        let payload = Self::parse_response(response).await?;
        parse_task_id(&payload)
    }

    /// Map non-2xx responses to [`TaskError`], recognising the proxy's
    /// configuration error.
    async fn ensure_success(response: reqwest::Response) -> Result<reqwest::Response, TaskError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "<unreadable body>".to_string());
        Err(classify_failure(status.as_u16(), &body))
    }

    /// Check status, decode JSON and reject non-zero envelope codes.
    async fn parse_response(response: reqwest::Response) -> Result<Value, TaskError> {
        let response = Self::ensure_success(response).await?;
        let status = response.status().as_u16();
        let text = response.text().await?;
        let payload: Value =
            serde_json::from_str(&text).map_err(|e| TaskError::Decode(e.to_string()))?;
        check_envelope(&payload, status)?;
        Ok(payload)
    }
}

impl TaskSource for TaskClient {
    async fn fetch_task(&self, task_id: &str) -> Result<Task, TaskError> {
        self.task_status(task_id).await
    }
}

fn classify_failure(status: u16, body: &str) -> TaskError {
    let parsed: Option<Value> = serde_json::from_str(body).ok();
    let message = parsed
        .as_ref()
        .and_then(|v| v.get("message"))
        .and_then(Value::as_str)
        .unwrap_or(body)
        .to_string();

    let label = parsed.as_ref().and_then(|v| v.get("error")).and_then(Value::as_str);
    if label == Some(CONFIGURATION_ERROR) {
        return TaskError::MissingCredential(message);
    }
    TaskError::Api { status, message }
}

fn generation_body(upload: &UploadResult, request: &GenerationRequest) -> Result<Value, TaskError> {
    let mut body = Map::new();
    body.insert("type".into(), json!("image_to_model"));
    body.insert(
        "file".into(),
        json!({"type": upload.image_type, "file_token": upload.file_token}),
    );
    if let Some(prompt) = request.prompt.as_deref().filter(|p| !p.trim().is_empty()) {
        body.insert("prompt".into(), json!(prompt));
    }

    let options =
        serde_json::to_value(&request.options).map_err(|e| TaskError::Decode(e.to_string()))?;
    if let Value::Object(options) = options {
        body.extend(options);
    }
    Ok(Value::Object(body))
}
