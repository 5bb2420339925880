//! Upload orchestrator configuration.

use serde::{Deserialize, Serialize};

use crate::planner::DEFAULT_CHUNK_SIZE;
use crate::retry::RetryPolicy;

/// Configuration for the upload orchestrator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadConfig {
    /// Size of every part except possibly the last (bytes).
    #[serde(default = "default_chunk_size")]
    pub chunk_size_bytes: u64,

    /// Largest object accepted for upload (bytes).
    #[serde(default = "default_max_object_size")]
    pub max_object_size_bytes: u64,

    /// Top-level media type objects must have (e.g., "video").
    #[serde(default = "default_media_category")]
    pub accepted_media_category: String,

    /// Maximum part transfers in flight (0 = unlimited).
    /// Also bounds how many part bodies are buffered in memory.
    #[serde(default = "default_max_concurrent_parts")]
    pub max_concurrent_parts: usize,

    /// Release the backend session when an upload fails after initialization.
    #[serde(default = "default_true")]
    pub abort_on_failure: bool,

    /// Compare MD5-style ETags against the MD5 of the bytes sent.
    #[serde(default)]
    pub verify_part_checksum: bool,

    /// Retry policy applied to each part transfer.
    #[serde(default)]
    pub retry: RetryPolicy,
}

fn default_chunk_size() -> u64 {
    DEFAULT_CHUNK_SIZE
}

fn default_max_object_size() -> u64 {
    2 * 1024 * 1024 * 1024 // 2 GiB
}

fn default_max_concurrent_parts() -> usize {
    4
}

fn default_media_category() -> String {
    "video".to_string()
}

fn default_true() -> bool {
    true
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            chunk_size_bytes: default_chunk_size(),
            max_object_size_bytes: default_max_object_size(),
            accepted_media_category: default_media_category(),
            max_concurrent_parts: default_max_concurrent_parts(),
            abort_on_failure: default_true(),
            verify_part_checksum: false,
            retry: RetryPolicy::default(),
        }
    }
}
