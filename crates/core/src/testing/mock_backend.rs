//! Mock upload backend for testing.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::RwLock;

use crate::backend::{BackendError, CompleteRequest, UploadBackend};

/// A recorded backend call for test assertions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordedCall {
    Initialize {
        object_key: String,
    },
    PartTarget {
        object_key: String,
        upload_id: String,
        part_number: u32,
    },
    PutPart {
        part_number: u32,
        len: usize,
    },
    Complete(CompleteRequest),
    Abort {
        object_key: String,
        upload_id: String,
    },
    Health,
}

/// Scripted failure of one part's PUT.
#[derive(Debug, Clone)]
struct PartFailure {
    /// Remaining failures (`None` = fail forever).
    remaining: Option<u32>,
    error: BackendError,
}

/// Mock implementation of the UploadBackend trait.
///
/// Provides controllable behavior for testing:
/// - Record every call for assertions
/// - Keep the bytes received for each part
/// - Fail initialize, individual parts, commit or abort on demand
/// - Delay initialize, PUTs or commit to observe concurrency and cancellation
///
/// By default every PUT succeeds with the MD5 hex digest of the body as ETag,
/// like S3 does for single-part PUTs.
///
/// # Example
///
/// ```rust,ignore
/// let backend = MockUploadBackend::new();
///
/// // Part 2 never returns an ETag
/// backend.omit_etag_for_part(2).await;
///
/// let orchestrator = UploadOrchestrator::new(config, Arc::new(backend.clone()));
/// let err = orchestrator.upload(&object, &cancel).await.unwrap_err();
///
/// assert!(backend.complete_requests().await.is_empty());
/// ```
#[derive(Debug, Clone)]
pub struct MockUploadBackend {
    calls: Arc<RwLock<Vec<RecordedCall>>>,
    parts: Arc<RwLock<HashMap<u32, Bytes>>>,
    upload_id: Arc<RwLock<String>>,
    task_id: Arc<RwLock<String>>,
    initialize_error: Arc<RwLock<Option<BackendError>>>,
    part_failures: Arc<RwLock<HashMap<u32, PartFailure>>>,
    missing_etag_parts: Arc<RwLock<HashSet<u32>>>,
    etag_overrides: Arc<RwLock<HashMap<u32, String>>>,
    complete_error: Arc<RwLock<Option<BackendError>>>,
    abort_error: Arc<RwLock<Option<BackendError>>>,
    health_error: Arc<RwLock<Option<BackendError>>>,
    initialize_delay: Arc<RwLock<Option<Duration>>>,
    put_delay: Arc<RwLock<Option<Duration>>>,
    complete_delay: Arc<RwLock<Option<Duration>>>,
    in_flight: Arc<AtomicUsize>,
    max_in_flight: Arc<AtomicUsize>,
}

impl Default for MockUploadBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MockUploadBackend {
    /// Create a new mock backend.
    pub fn new() -> Self {
        Self {
            calls: Arc::new(RwLock::new(Vec::new())),
            parts: Arc::new(RwLock::new(HashMap::new())),
            upload_id: Arc::new(RwLock::new("mock-upload-1".to_string())),
            task_id: Arc::new(RwLock::new("mock-task-1".to_string())),
            initialize_error: Arc::new(RwLock::new(None)),
            part_failures: Arc::new(RwLock::new(HashMap::new())),
            missing_etag_parts: Arc::new(RwLock::new(HashSet::new())),
            etag_overrides: Arc::new(RwLock::new(HashMap::new())),
            complete_error: Arc::new(RwLock::new(None)),
            abort_error: Arc::new(RwLock::new(None)),
            health_error: Arc::new(RwLock::new(None)),
            initialize_delay: Arc::new(RwLock::new(None)),
            put_delay: Arc::new(RwLock::new(None)),
            complete_delay: Arc::new(RwLock::new(None)),
            in_flight: Arc::new(AtomicUsize::new(0)),
            max_in_flight: Arc::new(AtomicUsize::new(0)),
        }
    }

    // =========================================================================
    // Configuration
    // =========================================================================

    /// Set the task id returned by a successful commit.
    pub async fn set_task_id(&self, task_id: impl Into<String>) {
        *self.task_id.write().await = task_id.into();
    }

    /// Make initialize fail with this error.
    pub async fn fail_initialize(&self, error: BackendError) {
        *self.initialize_error.write().await = Some(error);
    }

    /// Fail the PUT of `part_number` the next `times` times.
    pub async fn fail_part(&self, part_number: u32, times: u32, error: BackendError) {
        self.part_failures.write().await.insert(
            part_number,
            PartFailure {
                remaining: Some(times),
                error,
            },
        );
    }

    /// Fail every PUT of `part_number`.
    pub async fn fail_part_always(&self, part_number: u32, error: BackendError) {
        self.part_failures.write().await.insert(
            part_number,
            PartFailure {
                remaining: None,
                error,
            },
        );
    }

    /// Accept PUTs of `part_number` without returning an ETag.
    pub async fn omit_etag_for_part(&self, part_number: u32) {
        self.missing_etag_parts.write().await.insert(part_number);
    }

    /// Return this ETag for `part_number` instead of the body's MD5.
    pub async fn set_part_etag(&self, part_number: u32, etag: impl Into<String>) {
        self.etag_overrides
            .write()
            .await
            .insert(part_number, etag.into());
    }

    /// Make commit fail with this error.
    pub async fn fail_complete(&self, error: BackendError) {
        *self.complete_error.write().await = Some(error);
    }

    /// Make abort fail with this error.
    pub async fn fail_abort(&self, error: BackendError) {
        *self.abort_error.write().await = Some(error);
    }

    /// Make health checks fail with this error.
    pub async fn fail_health(&self, error: BackendError) {
        *self.health_error.write().await = Some(error);
    }

    /// Delay initialize by `delay`.
    pub async fn set_initialize_delay(&self, delay: Duration) {
        *self.initialize_delay.write().await = Some(delay);
    }

    /// Delay every PUT by `delay`.
    pub async fn set_put_delay(&self, delay: Duration) {
        *self.put_delay.write().await = Some(delay);
    }

    /// Delay commit by `delay`.
    pub async fn set_complete_delay(&self, delay: Duration) {
        *self.complete_delay.write().await = Some(delay);
    }

    // =========================================================================
    // Assertions
    // =========================================================================

    /// All recorded calls, in order.
    pub async fn calls(&self) -> Vec<RecordedCall> {
        self.calls.read().await.clone()
    }

    /// Number of recorded calls.
    pub async fn call_count(&self) -> usize {
        self.calls.read().await.len()
    }

    /// Commit requests received.
    pub async fn complete_requests(&self) -> Vec<CompleteRequest> {
        self.calls
            .read()
            .await
            .iter()
            .filter_map(|call| match call {
                RecordedCall::Complete(request) => Some(request.clone()),
                _ => None,
            })
            .collect()
    }

    /// Abort calls received, as `(object_key, upload_id)`.
    pub async fn aborts(&self) -> Vec<(String, String)> {
        self.calls
            .read()
            .await
            .iter()
            .filter_map(|call| match call {
                RecordedCall::Abort {
                    object_key,
                    upload_id,
                } => Some((object_key.clone(), upload_id.clone())),
                _ => None,
            })
            .collect()
    }

    /// Number of part targets requested.
    pub async fn part_target_count(&self) -> usize {
        self.calls
            .read()
            .await
            .iter()
            .filter(|call| matches!(call, RecordedCall::PartTarget { .. }))
            .count()
    }

    /// Number of PUT attempts made for `part_number`.
    pub async fn put_attempts(&self, part_number: u32) -> usize {
        self.calls
            .read()
            .await
            .iter()
            .filter(|call| {
                matches!(call, RecordedCall::PutPart { part_number: n, .. } if *n == part_number)
            })
            .count()
    }

    /// Bytes stored for `part_number`, if its PUT succeeded.
    pub async fn stored_part(&self, part_number: u32) -> Option<Bytes> {
        self.parts.read().await.get(&part_number).cloned()
    }

    /// Stored parts concatenated in part-number order.
    pub async fn assembled(&self) -> Vec<u8> {
        let parts = self.parts.read().await;
        let mut numbers: Vec<&u32> = parts.keys().collect();
        numbers.sort();
        numbers
            .into_iter()
            .flat_map(|n| parts[n].iter().copied())
            .collect()
    }

    /// Highest number of PUTs observed in flight at once.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    async fn record(&self, call: RecordedCall) {
        self.calls.write().await.push(call);
    }

    async fn scripted_part_failure(&self, part_number: u32) -> Option<BackendError> {
        let mut failures = self.part_failures.write().await;
        let failure = failures.get_mut(&part_number)?;
        match failure.remaining {
            None => Some(failure.error.clone()),
            Some(0) => None,
            Some(n) => {
                failure.remaining = Some(n - 1);
                Some(failure.error.clone())
            }
        }
    }

    async fn store_part(&self, part_number: u32, body: Bytes) -> Result<String, BackendError> {
        if let Some(error) = self.scripted_part_failure(part_number).await {
            return Err(error);
        }
        if self.missing_etag_parts.read().await.contains(&part_number) {
            return Err(BackendError::MissingIntegrityTag);
        }

        let etag = match self.etag_overrides.read().await.get(&part_number) {
            Some(etag) => etag.clone(),
            None => format!("{:x}", md5::compute(&body)),
        };
        self.parts.write().await.insert(part_number, body);
        Ok(etag)
    }
}

/// Part number encoded in a mock target URL.
fn part_number_from_url(url: &str) -> Result<u32, BackendError> {
    url.rsplit('/')
        .next()
        .and_then(|segment| segment.parse().ok())
        .ok_or_else(|| BackendError::InvalidResponse(format!("not a mock part URL: {}", url)))
}

#[async_trait]
impl UploadBackend for MockUploadBackend {
    fn name(&self) -> &str {
        "mock"
    }

    async fn initialize(&self, object_key: &str) -> Result<String, BackendError> {
        self.record(RecordedCall::Initialize {
            object_key: object_key.to_string(),
        })
        .await;

        let delay = *self.initialize_delay.read().await;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(error) = self.initialize_error.read().await.clone() {
            return Err(error);
        }
        Ok(self.upload_id.read().await.clone())
    }

    async fn part_target(
        &self,
        object_key: &str,
        upload_id: &str,
        part_number: u32,
    ) -> Result<String, BackendError> {
        self.record(RecordedCall::PartTarget {
            object_key: object_key.to_string(),
            upload_id: upload_id.to_string(),
            part_number,
        })
        .await;

        Ok(format!(
            "mock://parts/{}/{}/{}",
            object_key, upload_id, part_number
        ))
    }

    async fn put_part(&self, url: &str, body: Bytes) -> Result<String, BackendError> {
        let part_number = part_number_from_url(url)?;
        self.record(RecordedCall::PutPart {
            part_number,
            len: body.len(),
        })
        .await;

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        let delay = *self.put_delay.read().await;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let result = self.store_part(part_number, body).await;

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }

    async fn complete(&self, request: &CompleteRequest) -> Result<String, BackendError> {
        self.record(RecordedCall::Complete(request.clone())).await;

        let delay = *self.complete_delay.read().await;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(error) = self.complete_error.read().await.clone() {
            return Err(error);
        }
        Ok(self.task_id.read().await.clone())
    }

    async fn abort(&self, object_key: &str, upload_id: &str) -> Result<(), BackendError> {
        self.record(RecordedCall::Abort {
            object_key: object_key.to_string(),
            upload_id: upload_id.to_string(),
        })
        .await;

        match self.abort_error.read().await.clone() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    async fn health(&self) -> Result<(), BackendError> {
        self.record(RecordedCall::Health).await;

        match self.health_error.read().await.clone() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}
