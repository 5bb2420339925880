//! Testing utilities and mock implementations.
//!
//! This module provides mock implementations of the backend traits, allowing
//! the upload and polling flows to be tested without a control plane.
//!
//! # Example
//!
//! ```rust,ignore
//! use chronos_core::testing::{fixtures, MockStatusSource, MockUploadBackend};
//!
//! let backend = MockUploadBackend::new();
//! backend.fail_part(2, 1, BackendError::Timeout).await;
//!
//! let status = MockStatusSource::new();
//! status.push_state(TaskState::Progress, Some("Transcribing")).await;
//! status.push_state(TaskState::Success, None).await;
//! ```

mod mock_backend;
mod mock_status_source;

pub use mock_backend::{MockUploadBackend, RecordedCall};
pub use mock_status_source::MockStatusSource;

/// Test fixtures and helper functions.
pub mod fixtures {
    use crate::object::InputObject;
    use crate::poller::PollerConfig;
    use crate::retry::RetryPolicy;
    use crate::upload::UploadConfig;

    pub const MIB: u64 = 1024 * 1024;

    /// Deterministic, non-repeating-per-chunk test bytes.
    pub fn pattern_bytes(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i % 251) as u8).collect()
    }

    /// An in-memory MP4 of `len` bytes.
    pub fn video_object(len: usize) -> InputObject {
        InputObject::from_bytes("lecture.mp4", "video/mp4", pattern_bytes(len))
    }

    /// Upload configuration with fast retries.
    pub fn upload_config(chunk_size_bytes: u64) -> UploadConfig {
        UploadConfig {
            chunk_size_bytes,
            retry: RetryPolicy {
                max_attempts: 3,
                base_delay_ms: 1,
                max_delay_ms: 5,
            },
            ..Default::default()
        }
    }

    /// Poller configuration that spins quickly and never times out.
    pub fn poller_config() -> PollerConfig {
        PollerConfig {
            poll_interval_ms: 5,
            max_attempts: 0,
            max_wait_secs: 0,
        }
    }
}
