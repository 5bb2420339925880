//! Types for the upload orchestrator.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::session::SessionError;

/// A backend session left open by a cancelled upload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingSession {
    pub object_key: String,
    pub upload_id: String,
}

/// Errors that can occur during an upload.
#[derive(Debug, Error)]
pub enum UploadError {
    /// Object failed the type or size check. No network call was made.
    #[error("validation failed: {0}")]
    Validation(String),

    /// The control plane did not return a usable upload session.
    #[error("failed to initialize upload: {0}")]
    Initialization(String),

    /// A part could not be stored.
    #[error("part {part_number} failed after {attempts} attempt(s): {reason}")]
    PartTransfer {
        part_number: u32,
        attempts: u32,
        reason: String,
    },

    /// The finalization endpoint rejected the part set.
    /// Carries the backend's error text verbatim when it sent one.
    #[error("commit rejected: {0}")]
    Commit(String),

    /// The caller cancelled the upload before it was committed.
    /// `session` is set when a backend session had already been opened.
    #[error("upload cancelled")]
    Cancelled { session: Option<PendingSession> },

    /// Session bookkeeping invariant was violated.
    #[error("upload session error: {0}")]
    Session(#[from] SessionError),
}

impl UploadError {
    /// Short label for the stage that failed (used for metrics).
    pub fn stage(&self) -> &'static str {
        match self {
            UploadError::Validation(_) => "validation",
            UploadError::Initialization(_) => "initialization",
            UploadError::PartTransfer { .. } => "part_transfer",
            UploadError::Commit(_) => "commit",
            UploadError::Cancelled { .. } => "cancelled",
            UploadError::Session(_) => "session",
        }
    }
}

/// Result of a committed upload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadReceipt {
    /// Key of the committed object.
    pub object_key: String,
    /// Multipart upload id the parts were stored under.
    pub upload_id: String,
    /// Processing task spawned by the commit.
    pub task_id: String,
    /// Number of parts committed.
    pub part_count: u32,
    /// Object size in bytes.
    pub size_bytes: u64,
}

#[derive(Debug, Default)]
struct ProgressCounters {
    total_parts: AtomicU64,
    completed_parts: AtomicU64,
    total_bytes: AtomicU64,
    uploaded_bytes: AtomicU64,
}

/// Lock-free upload progress, sampled by observers while parts complete.
///
/// Progress is counted in parts, not bytes: each completed part adds
/// `1 / total_parts` to [`UploadProgress::fraction`].
#[derive(Debug, Clone, Default)]
pub struct UploadProgress {
    counters: Arc<ProgressCounters>,
}

impl UploadProgress {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start tracking a new transfer.
    pub(crate) fn reset(&self, total_parts: u64, total_bytes: u64) {
        self.counters.completed_parts.store(0, Ordering::SeqCst);
        self.counters.uploaded_bytes.store(0, Ordering::SeqCst);
        self.counters.total_bytes.store(total_bytes, Ordering::SeqCst);
        self.counters.total_parts.store(total_parts, Ordering::SeqCst);
    }

    /// Record one completed part.
    pub(crate) fn record_part(&self, bytes: u64) {
        self.counters.uploaded_bytes.fetch_add(bytes, Ordering::SeqCst);
        self.counters.completed_parts.fetch_add(1, Ordering::SeqCst);
    }

    pub fn total_parts(&self) -> u64 {
        self.counters.total_parts.load(Ordering::SeqCst)
    }

    pub fn completed_parts(&self) -> u64 {
        self.counters.completed_parts.load(Ordering::SeqCst)
    }

    pub fn total_bytes(&self) -> u64 {
        self.counters.total_bytes.load(Ordering::SeqCst)
    }

    pub fn uploaded_bytes(&self) -> u64 {
        self.counters.uploaded_bytes.load(Ordering::SeqCst)
    }

    /// Completed fraction in `[0, 1]` (0 before the transfer starts).
    pub fn fraction(&self) -> f64 {
        let total = self.total_parts();
        if total == 0 {
            return 0.0;
        }
        (self.completed_parts().min(total) as f64) / (total as f64)
    }

    pub fn is_complete(&self) -> bool {
        let total = self.total_parts();
        total > 0 && self.completed_parts() >= total
    }
}
