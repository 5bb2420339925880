//! Job status poller.
//!
//! Periodically queries the processing task spawned by a committed upload
//! until it reaches a terminal state, the wait budget runs out, or the caller
//! cancels.

mod config;
mod runner;
mod types;

pub use config::PollerConfig;
pub use runner::{JobStatusPoller, PollerHandle};
pub use types::{PollOutcome, TaskObservation};
