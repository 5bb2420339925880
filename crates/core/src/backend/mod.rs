//! Storage backend abstraction.
//!
//! This module provides the `UploadBackend` trait for the multipart upload
//! control plane and the `TaskStatusSource` trait for the processing job
//! status endpoint, plus their HTTP implementation.

mod http;
mod types;

pub use http::HttpUploadBackend;
pub use types::*;
