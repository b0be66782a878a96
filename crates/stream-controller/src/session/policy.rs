//! Reconnect policy.

use super::phase::Phase;
use crate::config::Config;

use std::time::Duration;

/// Fixed-delay reconnect policy. The delay does not grow between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub delay: Duration,
    /// `None` retries until success or user stop.
    pub max_attempts: Option<u32>,
}

impl ReconnectPolicy {
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self {
            delay: config.reconnect_delay,
            max_attempts: config.max_reconnect_attempts,
        }
    }

    /// Whether another attempt may be scheduled after `attempts` failures.
    #[must_use]
    pub fn allows_another(&self, attempts: u32) -> bool {
        self.max_attempts.map_or(true, |max| attempts < max)
    }

    /// User-facing errors are suppressed for the whole reconnect phase.
    #[must_use]
    pub const fn suppresses_errors(phase: Phase) -> bool {
        phase.is_reconnecting()
    }
}
