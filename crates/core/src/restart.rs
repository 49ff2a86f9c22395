// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Volute Contributors

//! Crash-restart backoff policy (§4.3).

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Exponential backoff policy governing automatic mind restarts.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct RestartPolicy {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_base_delay")]
    pub base_delay: Duration,
    #[serde(default = "default_max_delay")]
    pub max_delay: Duration,
}

impl Default for RestartPolicy {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay: default_base_delay(),
            max_delay: default_max_delay(),
        }
    }
}

fn default_max_attempts() -> u32 {
    5
}

fn default_base_delay() -> Duration {
    Duration::from_secs(3)
}

fn default_max_delay() -> Duration {
    Duration::from_secs(60)
}

impl RestartPolicy {
    /// Decide whether the `attempt`-th crash (1-indexed: `attempt == 1` is
    /// the mind's first crash) should trigger a restart, and after what
    /// delay (§4.3: `delay = min(baseDelay * 2^(attempt - 1), maxDelay)`).
    ///
    /// `should_restart` is `false` once `attempt >= max_attempts` — with the
    /// default policy that means the 5th crash is the one that gives up and
    /// leaves the mind stopped, not the 6th.
    pub fn decide(&self, attempt: u32) -> RestartDecision {
        if attempt >= self.max_attempts {
            return RestartDecision { should_restart: false, delay: Duration::ZERO, attempt };
        }
        let exponent = attempt.saturating_sub(1);
        let scaled = self.base_delay.saturating_mul(1u32.checked_shl(exponent).unwrap_or(u32::MAX));
        let delay = scaled.min(self.max_delay);
        RestartDecision { should_restart: true, delay, attempt }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RestartDecision {
    pub should_restart: bool,
    pub delay: Duration,
    pub attempt: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backs_off_exponentially_up_to_max_delay() {
        let policy = RestartPolicy::default();
        assert_eq!(policy.decide(1).delay, Duration::from_secs(3));
        assert_eq!(policy.decide(2).delay, Duration::from_secs(6));
        assert_eq!(policy.decide(3).delay, Duration::from_secs(12));
        assert_eq!(policy.decide(4).delay, Duration::from_secs(24));

        let lenient = RestartPolicy { max_attempts: 20, ..policy };
        assert_eq!(lenient.decide(6).delay, Duration::from_secs(60));
    }

    #[test]
    fn stops_restarting_after_max_attempts() {
        let policy = RestartPolicy::default();
        let decision = policy.decide(5);
        assert!(!decision.should_restart);
    }
}
