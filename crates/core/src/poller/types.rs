//! Types for the job status poller.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::backend::{TaskState, TaskStatus};

/// Detail shown when a successful task sent no status text.
pub(crate) const SUCCESS_FALLBACK: &str = "Processing complete";
/// Detail shown when a failed task sent no error text.
pub(crate) const FAILURE_FALLBACK: &str = "Processing failed";

/// One successful status query, with a display-ready detail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskObservation {
    pub task_id: String,
    pub state: TaskState,
    /// Backend status text, or a generic label for the state.
    pub detail: String,
    /// 1-based query number that produced this observation.
    pub attempt: u32,
    pub observed_at: DateTime<Utc>,
}

impl TaskObservation {
    pub fn new(status: TaskStatus, attempt: u32) -> Self {
        let detail = status
            .detail
            .unwrap_or_else(|| fallback_detail(&status.state).to_string());
        Self {
            task_id: status.task_id,
            state: status.state,
            detail,
            attempt,
            observed_at: Utc::now(),
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }
}

fn fallback_detail(state: &TaskState) -> &str {
    match state {
        TaskState::Queued => "Queued",
        TaskState::Progress => "Processing",
        TaskState::Success => SUCCESS_FALLBACK,
        TaskState::Failure => FAILURE_FALLBACK,
        TaskState::Unknown(raw) => raw,
    }
}

/// How a wait on a processing task ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome {
    /// The task finished successfully.
    Succeeded { detail: String },
    /// The task finished with an error.
    Failed { detail: String },
    /// The attempt budget or deadline ran out before a terminal state.
    TimedOut { attempts: u32, elapsed: Duration },
    /// The caller cancelled the wait.
    Cancelled,
}

impl PollOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, PollOutcome::Succeeded { .. })
    }

    /// Short label (used for metrics and logs).
    pub fn label(&self) -> &'static str {
        match self {
            PollOutcome::Succeeded { .. } => "succeeded",
            PollOutcome::Failed { .. } => "failed",
            PollOutcome::TimedOut { .. } => "timed_out",
            PollOutcome::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for PollOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PollOutcome::Succeeded { detail } => write!(f, "succeeded: {}", detail),
            PollOutcome::Failed { detail } => write!(f, "failed: {}", detail),
            PollOutcome::TimedOut { attempts, elapsed } => write!(
                f,
                "timed out after {} quer(ies) in {:.1}s",
                attempts,
                elapsed.as_secs_f64()
            ),
            PollOutcome::Cancelled => f.write_str("cancelled"),
        }
    }
}
