//! Job status poller implementation.

use std::sync::Arc;
use std::time::Instant;

use tokio::sync::watch;
use tokio::task::{JoinError, JoinHandle};
use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::{debug, info, warn};

use crate::backend::{BackendError, TaskState, TaskStatusSource};
use crate::metrics::{TASK_OUTCOMES, TASK_POLLS};

use super::config::PollerConfig;
use super::types::{PollOutcome, TaskObservation};

/// Polls a processing task until it reaches SUCCESS or FAILURE.
#[derive(Clone)]
pub struct JobStatusPoller {
    config: PollerConfig,
    source: Arc<dyn TaskStatusSource>,
}

impl JobStatusPoller {
    pub fn new(config: PollerConfig, source: Arc<dyn TaskStatusSource>) -> Self {
        Self { config, source }
    }

    pub fn config(&self) -> &PollerConfig {
        &self.config
    }

    /// Query the task once.
    pub async fn observe(&self, task_id: &str) -> Result<TaskObservation, BackendError> {
        let status = self.source.task_status(task_id).await;
        TASK_POLLS
            .with_label_values(&[if status.is_ok() { "ok" } else { "error" }])
            .inc();
        Ok(TaskObservation::new(status?, 1))
    }

    /// Wait for `task_id` to reach a terminal state.
    ///
    /// `on_update` sees every successful observation, intermediate ones
    /// included. Failed queries are logged and count toward the attempt
    /// budget but never end the wait by themselves.
    pub async fn watch<F>(
        &self,
        task_id: &str,
        cancel: &CancellationToken,
        on_update: F,
    ) -> PollOutcome
    where
        F: FnMut(&TaskObservation),
    {
        info!(task_id = %task_id, "Waiting for processing task");
        let outcome = self.poll_until_terminal(task_id, cancel, on_update).await;

        TASK_OUTCOMES.with_label_values(&[outcome.label()]).inc();
        match &outcome {
            PollOutcome::Succeeded { detail } => {
                info!(task_id = %task_id, detail = %detail, "Processing task succeeded")
            }
            PollOutcome::Failed { detail } => {
                warn!(task_id = %task_id, detail = %detail, "Processing task failed")
            }
            PollOutcome::TimedOut { attempts, elapsed } => warn!(
                task_id = %task_id,
                attempts,
                elapsed_secs = elapsed.as_secs(),
                "Gave up waiting for processing task"
            ),
            PollOutcome::Cancelled => info!(task_id = %task_id, "Stopped waiting for processing task"),
        }
        outcome
    }

    /// Run [`JobStatusPoller::watch`] on a background task.
    ///
    /// Dropping the returned handle cancels the task.
    pub fn spawn(&self, task_id: impl Into<String>) -> PollerHandle {
        let task_id = task_id.into();
        let poller = self.clone();
        let cancel = CancellationToken::new();
        let (updates_tx, updates_rx) = watch::channel(None);

        let token = cancel.clone();
        let join = tokio::spawn(async move {
            poller
                .watch(&task_id, &token, |observation| {
                    updates_tx.send_replace(Some(observation.clone()));
                })
                .await
        });

        PollerHandle {
            updates: updates_rx,
            cancel: cancel.clone(),
            _guard: cancel.drop_guard(),
            join,
        }
    }

    async fn poll_until_terminal<F>(
        &self,
        task_id: &str,
        cancel: &CancellationToken,
        mut on_update: F,
    ) -> PollOutcome
    where
        F: FnMut(&TaskObservation),
    {
        let started = Instant::now();
        let interval = self.config.poll_interval();
        let mut attempts = 0u32;

        loop {
            if cancel.is_cancelled() {
                return PollOutcome::Cancelled;
            }
            if self.budget_exhausted(attempts, started) {
                return PollOutcome::TimedOut {
                    attempts,
                    elapsed: started.elapsed(),
                };
            }
            attempts += 1;

            let result = tokio::select! {
                biased;
                _ = cancel.cancelled() => return PollOutcome::Cancelled,
                result = self.source.task_status(task_id) => result,
            };

            match result {
                Ok(status) => {
                    TASK_POLLS.with_label_values(&["ok"]).inc();
                    let observation = TaskObservation::new(status, attempts);
                    on_update(&observation);

                    match observation.state {
                        TaskState::Success => {
                            return PollOutcome::Succeeded {
                                detail: observation.detail,
                            }
                        }
                        TaskState::Failure => {
                            return PollOutcome::Failed {
                                detail: observation.detail,
                            }
                        }
                        _ => debug!(
                            task_id = %task_id,
                            state = %observation.state,
                            detail = %observation.detail,
                            attempt = attempts,
                            "Processing task not finished"
                        ),
                    }
                }
                Err(e) => {
                    TASK_POLLS.with_label_values(&["error"]).inc();
                    warn!(
                        task_id = %task_id,
                        attempt = attempts,
                        error = %e,
                        "Failed to query processing task status"
                    );
                }
            }

            if self.budget_exhausted(attempts, started) {
                return PollOutcome::TimedOut {
                    attempts,
                    elapsed: started.elapsed(),
                };
            }

            let delay = match self.config.max_wait() {
                Some(max_wait) => interval.min(max_wait.saturating_sub(started.elapsed())),
                None => interval,
            };
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return PollOutcome::Cancelled,
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }

    fn budget_exhausted(&self, attempts: u32, started: Instant) -> bool {
        if let Some(limit) = self.config.attempt_limit() {
            if attempts >= limit {
                return true;
            }
        }
        match self.config.max_wait() {
            Some(max_wait) => started.elapsed() >= max_wait,
            None => false,
        }
    }
}

/// Handle to a poller running on a background task.
///
/// The task is cancelled when the handle is dropped.
pub struct PollerHandle {
    updates: watch::Receiver<Option<TaskObservation>>,
    cancel: CancellationToken,
    _guard: DropGuard,
    join: JoinHandle<PollOutcome>,
}

impl PollerHandle {
    /// Stop polling. No query is issued after this returns.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Most recent observation, if any query succeeded yet.
    pub fn latest(&self) -> Option<TaskObservation> {
        self.updates.borrow().clone()
    }

    /// Receiver notified on every new observation.
    pub fn subscribe(&self) -> watch::Receiver<Option<TaskObservation>> {
        self.updates.clone()
    }

    /// Wait for the poll loop to finish.
    ///
    /// Dropping this future before it resolves cancels the task.
    pub async fn join(self) -> Result<PollOutcome, JoinError> {
        let PollerHandle { join, _guard, .. } = self;
        join.await
    }
}
