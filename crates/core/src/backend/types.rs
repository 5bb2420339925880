//! Types for the upload control plane and task status endpoint.

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur while talking to the storage backend.
#[derive(Debug, Clone, Error)]
pub enum BackendError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Request timeout")]
    Timeout,

    /// Non-success response without a usable error message.
    #[error("HTTP {status}: {message}")]
    Http { status: u16, message: String },

    /// Non-success response carrying the backend's own `error` text.
    #[error("{message}")]
    Rejected { status: u16, message: String },

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("part accepted without an ETag integrity tag")]
    MissingIntegrityTag,

    #[error("ETag {etag} does not match MD5 {expected} of the part body")]
    ChecksumMismatch { etag: String, expected: String },
}

impl BackendError {
    /// Whether repeating the same request may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            BackendError::ConnectionFailed(_)
            | BackendError::Timeout
            | BackendError::MissingIntegrityTag
            | BackendError::ChecksumMismatch { .. } => true,
            BackendError::Http { status, .. } | BackendError::Rejected { status, .. } => {
                *status >= 500 || *status == 429
            }
            BackendError::InvalidResponse(_) => false,
        }
    }
}

/// Strip the quoting characters S3-compatible stores wrap around ETags.
///
/// Returns `None` when nothing is left.
pub fn normalize_etag(raw: &str) -> Option<String> {
    let tag = raw.trim().trim_matches('"');
    if tag.is_empty() {
        None
    } else {
        Some(tag.to_string())
    }
}

/// Request body for `POST /upload/initialize`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitializeRequest {
    pub object_key: String,
}

/// Response body for `POST /upload/initialize`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitializeResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub upload_id: Option<String>,
}

/// Request body for `POST /upload/part`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PartTargetRequest {
    pub object_key: String,
    pub upload_id: String,
    pub part_number: u32,
}

/// Response body for `POST /upload/part`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PartTargetResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

/// One entry of the commit part list. Field names follow the S3 API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletedPart {
    #[serde(rename = "PartNumber")]
    pub part_number: u32,
    #[serde(rename = "ETag")]
    pub etag: String,
}

/// Request body for `POST /upload/complete`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompleteRequest {
    pub object_key: String,
    pub upload_id: String,
    /// Ordered by part number.
    pub parts: Vec<CompletedPart>,
}

/// Success body for `POST /upload/complete`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompleteResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub object_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_id: Option<String>,
}

/// Request body for `POST /upload/abort`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AbortRequest {
    pub object_key: String,
    pub upload_id: String,
}

/// Error body returned by every control plane endpoint.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ErrorBody {
    #[serde(default)]
    pub error: Option<String>,
}

/// State of a processing task as reported by the status endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum TaskState {
    /// Accepted, not started. Celery reports unknown tasks as `PENDING`.
    Queued,
    /// Running; may repeat with new status detail.
    Progress,
    /// Finished successfully.
    Success,
    /// Finished with an error (also covers revoked tasks).
    Failure,
    /// Any other state string, treated as non-terminal.
    Unknown(String),
}

impl TaskState {
    pub fn as_str(&self) -> &str {
        match self {
            TaskState::Queued => "QUEUED",
            TaskState::Progress => "PROGRESS",
            TaskState::Success => "SUCCESS",
            TaskState::Failure => "FAILURE",
            TaskState::Unknown(raw) => raw,
        }
    }

    /// SUCCESS and FAILURE are terminal; nothing changes after them.
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskState::Success | TaskState::Failure)
    }
}

impl From<String> for TaskState {
    fn from(raw: String) -> Self {
        match raw.trim().to_ascii_uppercase().as_str() {
            "QUEUED" | "PENDING" | "RECEIVED" => TaskState::Queued,
            "PROGRESS" | "STARTED" | "RETRY" => TaskState::Progress,
            "SUCCESS" => TaskState::Success,
            "FAILURE" | "REVOKED" => TaskState::Failure,
            _ => TaskState::Unknown(raw),
        }
    }
}

impl From<TaskState> for String {
    fn from(state: TaskState) -> Self {
        state.as_str().to_string()
    }
}

impl std::fmt::Display for TaskState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Response body for `GET /upload/status/{taskId}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskStatusResponse {
    #[serde(default)]
    pub task_id: Option<String>,
    pub state: TaskState,
    #[serde(default)]
    pub info: Option<serde_json::Value>,
}

/// One observation of a processing task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskStatus {
    pub task_id: String,
    pub state: TaskState,
    /// Human-readable status detail, when the backend sent one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl TaskStatus {
    /// Build an observation from the wire response.
    ///
    /// The detail comes from `info.status`, then `info.error`, then `info`
    /// itself when it is a bare string.
    pub fn from_response(task_id: &str, response: TaskStatusResponse) -> Self {
        let detail = response.info.as_ref().and_then(|info| match info {
            serde_json::Value::String(s) => Some(s.clone()),
            serde_json::Value::Object(map) => ["status", "error"]
                .iter()
                .find_map(|key| map.get(*key).and_then(|v| v.as_str()))
                .map(str::to_string),
            _ => None,
        });

        Self {
            task_id: response.task_id.unwrap_or_else(|| task_id.to_string()),
            state: response.state,
            detail: detail.filter(|d| !d.trim().is_empty()),
        }
    }
}

/// Trait for the storage control plane that brokers multipart uploads.
#[async_trait]
pub trait UploadBackend: Send + Sync {
    /// Backend name for logging.
    fn name(&self) -> &str;

    /// Start a multipart upload for `object_key`, returning the upload id.
    async fn initialize(&self, object_key: &str) -> Result<String, BackendError>;

    /// Get a single-use upload target URL for one part.
    async fn part_target(
        &self,
        object_key: &str,
        upload_id: &str,
        part_number: u32,
    ) -> Result<String, BackendError>;

    /// PUT one part's bytes to its target, returning the unquoted ETag.
    async fn put_part(&self, url: &str, body: Bytes) -> Result<String, BackendError>;

    /// Commit the uploaded parts, returning the processing task id.
    async fn complete(&self, request: &CompleteRequest) -> Result<String, BackendError>;

    /// Abort a multipart upload, releasing any stored parts.
    async fn abort(&self, object_key: &str, upload_id: &str) -> Result<(), BackendError>;

    /// Check that the control plane is reachable.
    async fn health(&self) -> Result<(), BackendError>;
}

/// Trait for reading processing task status.
#[async_trait]
pub trait TaskStatusSource: Send + Sync {
    async fn task_status(&self, task_id: &str) -> Result<TaskStatus, BackendError>;
}
