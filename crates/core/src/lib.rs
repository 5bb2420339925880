pub mod backend;
pub mod config;
pub mod metrics;
pub mod object;
pub mod planner;
pub mod poller;
pub mod retry;
pub mod testing;
pub mod upload;

pub use backend::{
    normalize_etag, BackendError, CompleteRequest, CompletedPart, HttpUploadBackend, TaskState,
    TaskStatus, TaskStatusSource, UploadBackend,
};
pub use config::{
    load_config, load_config_from_env, load_config_from_str, validate_config, Config,
    ConfigError, ControlPlaneConfig, MAX_PARTS,
};
pub use object::{media_type_for_path, InputObject, ObjectSource};
pub use planner::{part_count, plan_parts, PartDescriptor, DEFAULT_CHUNK_SIZE};
pub use poller::{JobStatusPoller, PollOutcome, PollerConfig, PollerHandle, TaskObservation};
pub use retry::{retry_with_backoff, RetryError, RetryPolicy};
pub use upload::{
    object_key_for, validate_object, PendingSession, SessionError, SessionState, UploadConfig,
    UploadError, UploadOrchestrator, UploadProgress, UploadReceipt, UploadSession,
};
