//! Client tuning stored in profiles
//!
//! Timeouts and polling limits for the API client. Every field has a serde
//! default so a profile only lists what it overrides.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::progress::PollConfig;

/// Timeouts and delays for a profile's client
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResilienceConfig {
    /// Per-request HTTP timeout in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Wait between creating a lakehouse and reading it back, in seconds
    #[serde(default = "default_settle_delay")]
    pub settle_delay_secs: u64,

    /// Long-running operation polling
    #[serde(default)]
    pub polling: PollingConfig,
}

impl Default for ResilienceConfig {
    fn default() -> Self {
        Self {
            request_timeout_secs: default_request_timeout(),
            settle_delay_secs: default_settle_delay(),
            polling: PollingConfig::default(),
        }
    }
}

impl ResilienceConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_secs(self.settle_delay_secs)
    }
}

/// Polling configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollingConfig {
    /// Delay between polls in milliseconds
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,

    /// Maximum number of polls
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Overall polling deadline in seconds; 0 disables it
    #[serde(default = "default_poll_timeout")]
    pub timeout_secs: u64,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            interval_ms: default_interval_ms(),
            max_attempts: default_max_attempts(),
            timeout_secs: default_poll_timeout(),
        }
    }
}

impl From<&PollingConfig> for PollConfig {
    fn from(polling: &PollingConfig) -> Self {
        PollConfig {
            interval: Duration::from_millis(polling.interval_ms),
            max_attempts: polling.max_attempts,
            timeout: (polling.timeout_secs > 0).then(|| Duration::from_secs(polling.timeout_secs)),
        }
    }
}

// Default value functions for serde
fn default_request_timeout() -> u64 {
    60
}

fn default_settle_delay() -> u64 {
    15
}

fn default_interval_ms() -> u64 {
    2000
}

fn default_max_attempts() -> u32 {
    300
}

fn default_poll_timeout() -> u64 {
    600
}
