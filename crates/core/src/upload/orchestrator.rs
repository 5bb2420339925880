//! Upload orchestrator implementation.
//!
//! Drives one object through the multipart protocol:
//! - Validate: local type/size check, no network
//! - Initialize: open a backend session
//! - Transfer: all parts concurrently, each with bounded retry
//! - Commit: submit the ordered part list, receive the processing task id

use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::backend::{BackendError, UploadBackend};
use crate::config::MAX_PARTS;
use crate::metrics::{
    BYTES_UPLOADED, PARTS_FAILED, PARTS_UPLOADED, PART_RETRIES, UPLOADS_TOTAL, UPLOAD_DURATION,
};
use crate::object::InputObject;
use crate::planner::{part_count, plan_parts, PartDescriptor};
use crate::retry::{retry_with_backoff, RetryError};

use super::config::UploadConfig;
use super::session::UploadSession;
use super::types::{PendingSession, UploadError, UploadProgress, UploadReceipt};

/// Commit error text when the backend gave none.
const GENERIC_COMMIT_ERROR: &str = "failed to finalize upload";

/// Check an object against the accepted media category and size ceiling,
/// and that the configured chunk size can partition it.
pub fn validate_object(object: &InputObject, config: &UploadConfig) -> Result<(), UploadError> {
    if config.chunk_size_bytes == 0 {
        return Err(UploadError::Validation(
            "chunk size must be at least 1 byte".to_string(),
        ));
    }
    if !object
        .media_category()
        .eq_ignore_ascii_case(config.accepted_media_category.trim())
    {
        return Err(UploadError::Validation(format!(
            "{} has media type {}, expected a {} file",
            object.name(),
            object.media_type(),
            config.accepted_media_category
        )));
    }
    if object.is_empty() {
        return Err(UploadError::Validation(format!("{} is empty", object.name())));
    }
    if object.len() > config.max_object_size_bytes {
        return Err(UploadError::Validation(format!(
            "{} is {} bytes, larger than the {} byte limit",
            object.name(),
            object.len(),
            config.max_object_size_bytes
        )));
    }
    let parts = part_count(object.len(), config.chunk_size_bytes);
    if parts > MAX_PARTS {
        return Err(UploadError::Validation(format!(
            "{} needs {} parts of {} bytes, limit is {}",
            object.name(),
            parts,
            config.chunk_size_bytes,
            MAX_PARTS
        )));
    }
    Ok(())
}

/// Build a collision-resistant object key from a timestamp and display name.
pub fn object_key_for(name: &str, now: DateTime<Utc>) -> String {
    let sanitized: String = name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let sanitized = if sanitized.trim_matches('_').is_empty() {
        "object".to_string()
    } else {
        sanitized
    };
    format!("{}-{}", now.timestamp_millis(), sanitized)
}

/// Failure of a single part attempt.
#[derive(Debug, Error)]
enum PartAttemptError {
    #[error("failed to read part bytes: {0}")]
    Read(#[from] std::io::Error),

    #[error(transparent)]
    Backend(#[from] BackendError),
}

impl PartAttemptError {
    fn is_transient(&self) -> bool {
        match self {
            PartAttemptError::Read(_) => false,
            PartAttemptError::Backend(e) => e.is_transient(),
        }
    }
}

/// Whether an ETag is a plain MD5 hex digest (not a multipart or KMS tag).
fn is_md5_etag(etag: &str) -> bool {
    etag.len() == 32 && etag.chars().all(|c| c.is_ascii_hexdigit())
}

/// The upload orchestrator - owns each upload session from start to commit.
pub struct UploadOrchestrator {
    config: UploadConfig,
    backend: Arc<dyn UploadBackend>,
}

impl UploadOrchestrator {
    /// Create a new orchestrator.
    pub fn new(config: UploadConfig, backend: Arc<dyn UploadBackend>) -> Self {
        Self { config, backend }
    }

    pub fn config(&self) -> &UploadConfig {
        &self.config
    }

    /// Validate an object without touching the network.
    pub fn validate(&self, object: &InputObject) -> Result<(), UploadError> {
        validate_object(object, &self.config)
    }

    /// Upload an object, returning the committed key and processing task id.
    pub async fn upload(
        &self,
        object: &InputObject,
        cancel: &CancellationToken,
    ) -> Result<UploadReceipt, UploadError> {
        self.upload_with_progress(object, &UploadProgress::new(), cancel)
            .await
    }

    /// Upload an object, publishing per-part progress to `progress`.
    pub async fn upload_with_progress(
        &self,
        object: &InputObject,
        progress: &UploadProgress,
        cancel: &CancellationToken,
    ) -> Result<UploadReceipt, UploadError> {
        let started = Instant::now();
        let result = self.run(object, progress, cancel).await;

        let label = match &result {
            Ok(_) => "committed",
            Err(e) => e.stage(),
        };
        UPLOADS_TOTAL.with_label_values(&[label]).inc();
        UPLOAD_DURATION
            .with_label_values(&[label])
            .observe(started.elapsed().as_secs_f64());

        result
    }

    /// Release a backend session (e.g. one left by a cancelled upload).
    pub async fn abort(&self, object_key: &str, upload_id: &str) -> Result<(), BackendError> {
        self.backend.abort(object_key, upload_id).await
    }

    async fn run(
        &self,
        object: &InputObject,
        progress: &UploadProgress,
        cancel: &CancellationToken,
    ) -> Result<UploadReceipt, UploadError> {
        validate_object(object, &self.config)?;
        if cancel.is_cancelled() {
            return Err(UploadError::Cancelled { session: None });
        }

        let parts = plan_parts(object.len(), self.config.chunk_size_bytes);
        if parts.is_empty() {
            return Err(UploadError::Validation(format!(
                "{} cannot be split into parts",
                object.name()
            )));
        }

        let object_key = object_key_for(object.name(), Utc::now());
        info!(
            object_key = %object_key,
            size_bytes = object.len(),
            backend = self.backend.name(),
            "Initializing upload"
        );

        // Runs to completion so an opened session always reaches the caller.
        let upload_id = self
            .backend
            .initialize(&object_key)
            .await
            .map_err(|e| UploadError::Initialization(e.to_string()))?;
        if cancel.is_cancelled() {
            warn!(
                object_key = %object_key,
                upload_id = %upload_id,
                "Upload cancelled, backend session left open"
            );
            return Err(UploadError::Cancelled {
                session: Some(PendingSession {
                    object_key,
                    upload_id,
                }),
            });
        }

        let mut session = UploadSession::new(object_key, upload_id, parts.len() as u32);
        info!(
            object_key = session.object_key(),
            upload_id = session.upload_id(),
            parts = parts.len(),
            "Upload session opened"
        );

        match self
            .transfer_and_commit(object, &parts, &mut session, progress, cancel)
            .await
        {
            Ok(task_id) => {
                info!(
                    object_key = session.object_key(),
                    task_id = %task_id,
                    "Upload committed"
                );
                Ok(UploadReceipt {
                    object_key: session.object_key().to_string(),
                    upload_id: session.upload_id().to_string(),
                    task_id,
                    part_count: session.part_count(),
                    size_bytes: object.len(),
                })
            }
            Err(UploadError::Cancelled { .. }) => {
                session.abandon();
                warn!(
                    object_key = session.object_key(),
                    upload_id = session.upload_id(),
                    "Upload cancelled, backend session left open"
                );
                Err(UploadError::Cancelled {
                    session: Some(PendingSession {
                        object_key: session.object_key().to_string(),
                        upload_id: session.upload_id().to_string(),
                    }),
                })
            }
            Err(e) => {
                session.abandon();
                warn!(
                    object_key = session.object_key(),
                    upload_id = session.upload_id(),
                    error = %e,
                    "Upload failed"
                );
                if self.config.abort_on_failure {
                    self.abort_quietly(&session).await;
                }
                Err(e)
            }
        }
    }

    /// Transfer every part, then commit. Returns the processing task id.
    async fn transfer_and_commit(
        &self,
        object: &InputObject,
        parts: &[PartDescriptor],
        session: &mut UploadSession,
        progress: &UploadProgress,
        cancel: &CancellationToken,
    ) -> Result<String, UploadError> {
        session.begin_transfer()?;
        progress.reset(parts.len() as u64, object.len());

        let object_key = session.object_key().to_string();
        let upload_id = session.upload_id().to_string();
        let limit = match self.config.max_concurrent_parts {
            0 => parts.len().max(1),
            n => n,
        };

        {
            let mut transfers = stream::iter(parts.iter().copied())
                .map(|part| self.transfer_part(object, &object_key, &upload_id, part, cancel))
                .buffer_unordered(limit);

            // Single writer for the session map and the progress counter.
            loop {
                let next = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => {
                        return Err(UploadError::Cancelled { session: None });
                    }
                    next = transfers.next() => next,
                };

                match next {
                    Some(Ok((part, etag))) => {
                        session.record_part(part.part_number, etag)?;
                        progress.record_part(part.len);
                        PARTS_UPLOADED.inc();
                        BYTES_UPLOADED.inc_by(part.len);
                        debug!(
                            part_number = part.part_number,
                            completed = progress.completed_parts(),
                            total = progress.total_parts(),
                            "Part stored"
                        );
                    }
                    // Dropping the stream cancels the parts still in flight.
                    Some(Err(e)) => return Err(e),
                    None => break,
                }
            }
        }

        let request = session.commit_request()?;
        debug!(parts = request.parts.len(), "Committing upload");

        if cancel.is_cancelled() {
            return Err(UploadError::Cancelled { session: None });
        }
        // Never interrupted once sent.
        let task_id = self
            .backend
            .complete(&request)
            .await
            .map_err(commit_error)?;
        session.mark_committed()?;

        Ok(task_id)
    }

    /// Transfer one part with the configured retry policy.
    async fn transfer_part(
        &self,
        object: &InputObject,
        object_key: &str,
        upload_id: &str,
        part: PartDescriptor,
        cancel: &CancellationToken,
    ) -> Result<(PartDescriptor, String), UploadError> {
        let operation_name = format!("part {}", part.part_number);
        let result = retry_with_backoff(
            &self.config.retry,
            cancel,
            &operation_name,
            PartAttemptError::is_transient,
            |attempt| async move {
                if attempt > 1 {
                    PART_RETRIES.inc();
                }
                self.attempt_part(object, object_key, upload_id, part).await
            },
        )
        .await;

        match result {
            Ok(etag) => Ok((part, etag)),
            Err(RetryError::Cancelled { .. }) => Err(UploadError::Cancelled { session: None }),
            Err(RetryError::Exhausted { error, attempts }) => {
                PARTS_FAILED.inc();
                warn!(
                    part_number = part.part_number,
                    attempts,
                    error = %error,
                    "Part transfer failed"
                );
                Err(UploadError::PartTransfer {
                    part_number: part.part_number,
                    attempts,
                    reason: error.to_string(),
                })
            }
        }
    }

    /// One attempt: negotiate a target, read the range, PUT it.
    async fn attempt_part(
        &self,
        object: &InputObject,
        object_key: &str,
        upload_id: &str,
        part: PartDescriptor,
    ) -> Result<String, PartAttemptError> {
        let url = self
            .backend
            .part_target(object_key, upload_id, part.part_number)
            .await?;
        let body = object.read_range(part.offset, part.len).await?;

        let expected_md5 = self
            .config
            .verify_part_checksum
            .then(|| format!("{:x}", md5::compute(&body)));

        let etag = self.backend.put_part(&url, body).await?;

        if let Some(expected) = expected_md5 {
            if is_md5_etag(&etag) && !etag.eq_ignore_ascii_case(&expected) {
                return Err(BackendError::ChecksumMismatch { etag, expected }.into());
            }
        }
        Ok(etag)
    }

    /// Best-effort release of a failed session.
    async fn abort_quietly(&self, session: &UploadSession) {
        match self
            .backend
            .abort(session.object_key(), session.upload_id())
            .await
        {
            Ok(()) => info!(
                object_key = session.object_key(),
                upload_id = session.upload_id(),
                "Aborted failed upload session"
            ),
            Err(e) => warn!(
                object_key = session.object_key(),
                upload_id = session.upload_id(),
                error = %e,
                "Failed to abort upload session"
            ),
        }
    }
}

/// Surface the backend's error text verbatim, or a generic message.
fn commit_error(e: BackendError) -> UploadError {
    match e {
        BackendError::Rejected { message, .. } => UploadError::Commit(message),
        BackendError::Http { status, .. } => {
            UploadError::Commit(format!("{} (HTTP {})", GENERIC_COMMIT_ERROR, status))
        }
        other => UploadError::Commit(format!("{}: {}", GENERIC_COMMIT_ERROR, other)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn video(len: usize) -> InputObject {
        InputObject::from_bytes("clip.mp4", "video/mp4", vec![0u8; len])
    }

    #[test]
    fn test_validate_accepts_video_within_limit() {
        let config = UploadConfig::default();
        assert!(validate_object(&video(10), &config).is_ok());
    }

    #[test]
    fn test_validate_rejects_wrong_category() {
        let config = UploadConfig::default();
        let object = InputObject::from_bytes("song.flac", "audio/flac", vec![1u8; 4]);
        let err = validate_object(&object, &config).unwrap_err();
        assert!(matches!(err, UploadError::Validation(_)));
        assert!(err.to_string().contains("audio/flac"));
    }

    #[test]
    fn test_validate_rejects_empty_and_oversized() {
        let config = UploadConfig {
            max_object_size_bytes: 8,
            ..Default::default()
        };
        assert!(matches!(
            validate_object(&video(0), &config),
            Err(UploadError::Validation(_))
        ));
        assert!(matches!(
            validate_object(&video(9), &config),
            Err(UploadError::Validation(_))
        ));
        assert!(validate_object(&video(8), &config).is_ok());
    }

    #[test]
    fn test_validate_rejects_zero_chunk_size() {
        let config = UploadConfig {
            chunk_size_bytes: 0,
            ..Default::default()
        };
        let err = validate_object(&video(12), &config).unwrap_err();
        assert!(matches!(err, UploadError::Validation(_)));
    }

    #[test]
    fn test_validate_rejects_too_many_parts() {
        let config = UploadConfig {
            chunk_size_bytes: 1,
            ..Default::default()
        };
        assert!(validate_object(&video(MAX_PARTS as usize), &config).is_ok());
        assert!(matches!(
            validate_object(&video(MAX_PARTS as usize + 1), &config),
            Err(UploadError::Validation(_))
        ));
    }

    #[test]
    fn test_object_key_for() {
        let now = Utc.timestamp_millis_opt(1_700_000_000_123).unwrap();
        assert_eq!(
            object_key_for("My Talk (final).mp4", now),
            "1700000000123-My_Talk__final_.mp4"
        );
        assert_eq!(object_key_for("///", now), "1700000000123-object");
    }

    #[test]
    fn test_is_md5_etag() {
        assert!(is_md5_etag("9e107d9d372bb6826bd81d3542a419d6"));
        assert!(!is_md5_etag("9e107d9d372bb6826bd81d3542a419d6-3"));
        assert!(!is_md5_etag("etag-1"));
    }

    #[test]
    fn test_commit_error_prefers_backend_text() {
        let err = commit_error(BackendError::Rejected {
            status: 500,
            message: "An error occurred (InvalidPart) when calling CompleteMultipartUpload"
                .to_string(),
        });
        match err {
            UploadError::Commit(msg) => assert_eq!(
                msg,
                "An error occurred (InvalidPart) when calling CompleteMultipartUpload"
            ),
            other => panic!("unexpected error: {:?}", other),
        }

        let err = commit_error(BackendError::Http {
            status: 502,
            message: "HTTP 502 Bad Gateway".to_string(),
        });
        assert_eq!(
            err.to_string(),
            "commit rejected: failed to finalize upload (HTTP 502)"
        );
    }
}
