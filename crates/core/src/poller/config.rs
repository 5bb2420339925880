//! Poller configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Configuration for the job status poller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollerConfig {
    /// Delay between status queries (milliseconds).
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,

    /// Maximum status queries before giving up (0 = unlimited).
    #[serde(default)]
    pub max_attempts: u32,

    /// Maximum time to wait for a terminal state (seconds, 0 = unlimited).
    #[serde(default = "default_max_wait")]
    pub max_wait_secs: u64,
}

fn default_poll_interval() -> u64 {
    3000 // 3 seconds
}

fn default_max_wait() -> u64 {
    2 * 60 * 60 // 2 hours
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval(),
            max_attempts: 0,
            max_wait_secs: default_max_wait(),
        }
    }
}

impl PollerConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Deadline for the whole wait, if bounded.
    pub fn max_wait(&self) -> Option<Duration> {
        (self.max_wait_secs > 0).then(|| Duration::from_secs(self.max_wait_secs))
    }

    /// Attempt budget, if bounded.
    pub fn attempt_limit(&self) -> Option<u32> {
        (self.max_attempts > 0).then_some(self.max_attempts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = PollerConfig::default();
        assert_eq!(config.poll_interval(), Duration::from_secs(3));
        assert_eq!(config.attempt_limit(), None);
        assert_eq!(config.max_wait(), Some(Duration::from_secs(7200)));
    }

    #[test]
    fn test_zero_disables_bounds() {
        let toml = r#"
            poll_interval_ms = 250
            max_attempts = 0
            max_wait_secs = 0
        "#;
        let config: PollerConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.poll_interval(), Duration::from_millis(250));
        assert_eq!(config.attempt_limit(), None);
        assert_eq!(config.max_wait(), None);
    }

    #[test]
    fn test_deserialize_partial() {
        let config: PollerConfig = toml::from_str("max_attempts = 40").unwrap();
        assert_eq!(config.attempt_limit(), Some(40));
        assert_eq!(config.poll_interval_ms, 3000);
    }
}
