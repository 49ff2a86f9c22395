// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Volute Contributors

//! Sleep/wake state for a mind (§3 "Sleep state", §4.10).

use serde::{Deserialize, Serialize};

/// Persisted sleep/wake state for a single mind.
///
/// `sleeping_since` and `scheduled_wake_at` are stored as epoch seconds
/// (via `Clock::epoch_secs`) rather than `Instant`, since this state must
/// survive a daemon restart (§4.10 "Sleep state persists across restarts").
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SleepState {
    pub sleeping: bool,
    #[serde(default)]
    pub sleeping_since: Option<u64>,
    #[serde(default)]
    pub scheduled_wake_at: Option<u64>,
    #[serde(default)]
    pub woken_by_trigger: Option<String>,
    #[serde(default)]
    pub voluntary_wake_at: Option<u64>,
    #[serde(default)]
    pub queued_message_count: u32,
}

impl SleepState {
    pub fn awake() -> Self {
        Self::default()
    }

    pub fn begin_sleep(&mut self, now: u64, scheduled_wake_at: Option<u64>) {
        self.sleeping = true;
        self.sleeping_since = Some(now);
        self.scheduled_wake_at = scheduled_wake_at;
        self.woken_by_trigger = None;
        self.voluntary_wake_at = None;
    }

    pub fn wake(&mut self, trigger: Option<&str>, now: u64) {
        self.sleeping = false;
        self.sleeping_since = None;
        self.scheduled_wake_at = None;
        self.woken_by_trigger = trigger.map(str::to_string);
        self.voluntary_wake_at = Some(now);
        self.queued_message_count = 0;
    }
}

/// Per-mind sleep/wake schedule configuration (§4.10), loaded from the
/// mind's config directory alongside `routes.json`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SleepConfig {
    /// Cron expression; when it fires and the mind is awake, sleep begins.
    #[serde(default)]
    pub sleep_cron: Option<String>,
    /// Cron expression; when it fires and the mind is asleep, wake begins.
    #[serde(default)]
    pub wake_cron: Option<String>,
    /// Additional channel/sender globs that wake a sleeping mind, beyond
    /// the defaults (DMs, @mentions).
    #[serde(default)]
    pub wake_triggers: Vec<String>,
}
