//! HTTP implementation of the upload control plane and status endpoint.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::{header::ETAG, Client, Response};
use serde::{de::DeserializeOwned, Serialize};
use tracing::debug;

use crate::config::ControlPlaneConfig;
use crate::metrics::record_backend_request;

use super::{
    normalize_etag, AbortRequest, BackendError, CompleteRequest, CompleteResponse, ErrorBody,
    InitializeRequest, InitializeResponse, PartTargetRequest, PartTargetResponse, TaskStatus,
    TaskStatusResponse, TaskStatusSource, UploadBackend,
};

/// Upload API client speaking JSON over HTTP.
#[derive(Debug, Clone)]
pub struct HttpUploadBackend {
    client: Client,
    base_url: String,
    part_timeout: Duration,
}

/// Part PUT timeout used by [`HttpUploadBackend::with_client`].
const DEFAULT_PART_TIMEOUT: Duration = Duration::from_secs(600);

impl HttpUploadBackend {
    /// Create a new client for the configured control plane.
    pub fn new(config: &ControlPlaneConfig) -> Result<Self, BackendError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs as u64))
            .build()
            .map_err(|e| BackendError::ConnectionFailed(format!("HTTP client setup: {}", e)))?;

        Ok(Self::with_client(client, &config.url)
            .with_part_timeout(Duration::from_secs(config.part_timeout_secs as u64)))
    }

    /// Create a client around an existing `reqwest::Client`.
    pub fn with_client(client: Client, base_url: &str) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            part_timeout: DEFAULT_PART_TIMEOUT,
        }
    }

    /// Replace the client timeout for part PUTs.
    pub fn with_part_timeout(mut self, timeout: Duration) -> Self {
        self.part_timeout = timeout;
        self
    }

    fn url(&self, endpoint: &str) -> String {
        format!("{}{}", self.base_url, endpoint)
    }

    /// POST a JSON body and decode a JSON success response.
    async fn post_json<B, R>(
        &self,
        operation: &str,
        endpoint: &str,
        body: &B,
    ) -> Result<R, BackendError>
    where
        B: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let started = Instant::now();
        let result: Result<R, BackendError> = async {
            let response = self
                .client
                .post(self.url(endpoint))
                .json(body)
                .send()
                .await
                .map_err(map_send_error)?;
            decode_json(response).await
        }
        .await;
        record_backend_request(operation, result.is_ok(), started.elapsed().as_secs_f64());
        result
    }

    /// GET a JSON success response.
    async fn get_json<R>(&self, operation: &str, endpoint: &str) -> Result<R, BackendError>
    where
        R: DeserializeOwned,
    {
        let started = Instant::now();
        let result: Result<R, BackendError> = async {
            let response = self
                .client
                .get(self.url(endpoint))
                .send()
                .await
                .map_err(map_send_error)?;
            decode_json(response).await
        }
        .await;
        record_backend_request(operation, result.is_ok(), started.elapsed().as_secs_f64());
        result
    }
}

fn map_send_error(e: reqwest::Error) -> BackendError {
    if e.is_timeout() {
        BackendError::Timeout
    } else if e.is_connect() {
        BackendError::ConnectionFailed(e.to_string())
    } else {
        BackendError::ConnectionFailed(format!("request failed: {}", e))
    }
}

/// Turn a non-success response into an error, preferring the body's `error` text.
async fn error_from_response(response: Response) -> BackendError {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();

    match serde_json::from_str::<ErrorBody>(&body)
        .ok()
        .and_then(|b| b.error)
        .filter(|msg| !msg.trim().is_empty())
    {
        Some(message) => BackendError::Rejected {
            status: status.as_u16(),
            message,
        },
        None => BackendError::Http {
            status: status.as_u16(),
            message: format!(
                "HTTP {}{}",
                status,
                if body.is_empty() {
                    String::new()
                } else {
                    format!(": {}", body.chars().take(200).collect::<String>())
                }
            ),
        },
    }
}

async fn decode_json<R: DeserializeOwned>(response: Response) -> Result<R, BackendError> {
    if !response.status().is_success() {
        return Err(error_from_response(response).await);
    }

    let body = response.text().await.map_err(map_send_error)?;
    serde_json::from_str(&body).map_err(|e| {
        BackendError::InvalidResponse(format!(
            "{}: {}",
            e,
            body.chars().take(200).collect::<String>()
        ))
    })
}

#[async_trait]
impl UploadBackend for HttpUploadBackend {
    fn name(&self) -> &str {
        "http"
    }

    async fn initialize(&self, object_key: &str) -> Result<String, BackendError> {
        let request = InitializeRequest {
            object_key: object_key.to_string(),
        };
        let response: InitializeResponse = self
            .post_json("initialize", "/upload/initialize", &request)
            .await?;

        response
            .upload_id
            .filter(|id| !id.is_empty())
            .ok_or_else(|| BackendError::InvalidResponse("response has no uploadId".to_string()))
    }

    async fn part_target(
        &self,
        object_key: &str,
        upload_id: &str,
        part_number: u32,
    ) -> Result<String, BackendError> {
        let request = PartTargetRequest {
            object_key: object_key.to_string(),
            upload_id: upload_id.to_string(),
            part_number,
        };
        let response: PartTargetResponse = self
            .post_json("part_target", "/upload/part", &request)
            .await?;

        response
            .url
            .filter(|url| !url.is_empty())
            .ok_or_else(|| BackendError::InvalidResponse("response has no url".to_string()))
    }

    async fn put_part(&self, url: &str, body: Bytes) -> Result<String, BackendError> {
        let started = Instant::now();
        let len = body.len();
        let result: Result<String, BackendError> = async {
            let response = self
                .client
                .put(url)
                .timeout(self.part_timeout)
                .body(body)
                .send()
                .await
                .map_err(map_send_error)?;

            if !response.status().is_success() {
                return Err(error_from_response(response).await);
            }

            let etag = response
                .headers()
                .get(ETAG)
                .and_then(|value| value.to_str().ok())
                .and_then(normalize_etag)
                .ok_or(BackendError::MissingIntegrityTag)?;
            debug!(bytes = len, etag = %etag, "Part accepted");
            Ok(etag)
        }
        .await;
        record_backend_request("put_part", result.is_ok(), started.elapsed().as_secs_f64());
        result
    }

    async fn complete(&self, request: &CompleteRequest) -> Result<String, BackendError> {
        let response: CompleteResponse = self
            .post_json("complete", "/upload/complete", request)
            .await?;

        response
            .task_id
            .filter(|id| !id.is_empty())
            .ok_or_else(|| BackendError::InvalidResponse("response has no taskId".to_string()))
    }

    async fn abort(&self, object_key: &str, upload_id: &str) -> Result<(), BackendError> {
        let request = AbortRequest {
            object_key: object_key.to_string(),
            upload_id: upload_id.to_string(),
        };
        let _: serde_json::Value = self.post_json("abort", "/upload/abort", &request).await?;
        Ok(())
    }

    async fn health(&self) -> Result<(), BackendError> {
        let _: serde_json::Value = self.get_json("health", "/health").await?;
        Ok(())
    }
}

#[async_trait]
impl TaskStatusSource for HttpUploadBackend {
    async fn task_status(&self, task_id: &str) -> Result<TaskStatus, BackendError> {
        let endpoint = format!("/upload/status/{}", urlencoding::encode(task_id));
        let response: TaskStatusResponse = self.get_json("task_status", &endpoint).await?;
        Ok(TaskStatus::from_response(task_id, response))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_url_trailing_slash_is_trimmed() {
        let backend = HttpUploadBackend::with_client(Client::new(), "http://localhost:5000/");
        assert_eq!(
            backend.url("/upload/initialize"),
            "http://localhost:5000/upload/initialize"
        );
    }

    #[test]
    fn test_new_from_config() {
        let backend = HttpUploadBackend::new(&ControlPlaneConfig::default()).unwrap();
        assert_eq!(backend.name(), "http");
        assert_eq!(backend.url("/health"), "http://localhost:5000/health");
        assert_eq!(backend.part_timeout, Duration::from_secs(600));
    }
}
