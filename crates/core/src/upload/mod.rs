//! Chunked multipart upload orchestrator.
//!
//! Drives one object through the control plane's multipart protocol:
//! - **Validate**: local type/size check, before any network call
//! - **Transfer**: all parts concurrently, each retried with backoff
//! - **Commit**: ordered part list in, processing task id out

mod config;
mod orchestrator;
mod session;
mod types;

pub use config::UploadConfig;
pub use orchestrator::{object_key_for, validate_object, UploadOrchestrator};
pub use session::{SessionError, SessionState, UploadSession};
pub use types::{PendingSession, UploadError, UploadProgress, UploadReceipt};
