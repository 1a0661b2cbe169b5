// ABOUTME: Notification channel configuration.
// ABOUTME: Declares where outcome events are fanned out to.

use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

use super::EnvValue;

#[derive(Debug, Clone, Deserialize)]
pub struct NotifyConfig {
    /// Upper bound on a single channel delivery.
    #[serde(default = "default_timeout", with = "humantime_serde")]
    pub timeout: Duration,

    #[serde(default)]
    pub channels: Vec<ChannelConfig>,
}

fn default_timeout() -> Duration {
    Duration::from_secs(10)
}

impl Default for NotifyConfig {
    fn default() -> Self {
        NotifyConfig {
            timeout: default_timeout(),
            channels: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum ChannelConfig {
    /// Emit events through the process log.
    Log,

    /// Run an executable with the event in its environment.
    Command { path: PathBuf },

    /// POST the event as JSON to a plain-HTTP endpoint.
    Webhook { url: EnvValue },
}
