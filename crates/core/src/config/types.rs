use serde::{Deserialize, Serialize};

use crate::poller::PollerConfig;
use crate::upload::UploadConfig;

/// Root configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub control_plane: ControlPlaneConfig,
    #[serde(default)]
    pub upload: UploadConfig,
    #[serde(default)]
    pub poller: PollerConfig,
}

/// Storage control plane (upload API) configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ControlPlaneConfig {
    /// Base URL of the upload API (e.g., "http://localhost:5000")
    #[serde(default = "default_url")]
    pub url: String,
    /// Request timeout in seconds (default: 30)
    #[serde(default = "default_timeout")]
    pub timeout_secs: u32,
    /// Timeout for a single part PUT in seconds (default: 600).
    /// Parts carry whole chunks, so they get a longer budget than API calls.
    #[serde(default = "default_part_timeout")]
    pub part_timeout_secs: u32,
}

impl Default for ControlPlaneConfig {
    fn default() -> Self {
        Self {
            url: default_url(),
            timeout_secs: default_timeout(),
            part_timeout_secs: default_part_timeout(),
        }
    }
}

fn default_url() -> String {
    "http://localhost:5000".to_string()
}

fn default_timeout() -> u32 {
    30
}

fn default_part_timeout() -> u32 {
    600
}
