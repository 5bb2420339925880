//! Mock task status source for testing.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::backend::{BackendError, TaskState, TaskStatus, TaskStatusSource};

/// Mock implementation of the TaskStatusSource trait.
///
/// Returns scripted responses in order. Once the script has a single entry
/// left, that entry is returned for every further query.
#[derive(Debug, Clone, Default)]
pub struct MockStatusSource {
    script: Arc<RwLock<Vec<Result<TaskStatus, BackendError>>>>,
    queries: Arc<RwLock<Vec<String>>>,
}

impl MockStatusSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an observation to the script.
    pub async fn push_state(&self, state: TaskState, detail: Option<&str>) {
        self.script.write().await.push(Ok(TaskStatus {
            task_id: String::new(),
            state,
            detail: detail.map(str::to_string),
        }));
    }

    /// Append a failed query to the script.
    pub async fn push_error(&self, error: BackendError) {
        self.script.write().await.push(Err(error));
    }

    /// Task ids queried, in order.
    pub async fn queries(&self) -> Vec<String> {
        self.queries.read().await.clone()
    }

    /// Number of queries made.
    pub async fn query_count(&self) -> usize {
        self.queries.read().await.len()
    }
}

#[async_trait]
impl TaskStatusSource for MockStatusSource {
    async fn task_status(&self, task_id: &str) -> Result<TaskStatus, BackendError> {
        self.queries.write().await.push(task_id.to_string());

        let mut script = self.script.write().await;
        let next = match script.len() {
            0 => {
                return Err(BackendError::InvalidResponse(
                    "no scripted task status".to_string(),
                ))
            }
            1 => script[0].clone(),
            _ => script.remove(0),
        };
        next.map(|mut status| {
            status.task_id = task_id.to_string();
            status
        })
    }
}
