// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Volute Contributors

//! Persisted crash-attempt counters backing `RestartPolicy` (§4.3).

use crate::atomic::{read_json, write_json_atomic};
use crate::error::Result;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::PathBuf;
use volute_core::{RestartDecision, RestartPolicy};

pub struct RestartTracker {
    path: PathBuf,
    policy: RestartPolicy,
    attempts: Mutex<HashMap<String, u32>>,
}

impl RestartTracker {
    pub fn load(path: impl Into<PathBuf>, policy: RestartPolicy) -> Result<Self> {
        let path = path.into();
        let attempts: HashMap<String, u32> = read_json(&path)?.unwrap_or_default();
        Ok(Self { path, policy, attempts: Mutex::new(attempts) })
    }

    fn persist(&self, attempts: &HashMap<String, u32>) -> Result<()> {
        write_json_atomic(&self.path, attempts)
    }

    /// Record a crash for `key` and decide whether to restart (§4.3).
    ///
    /// `RestartPolicy::decide` is 1-indexed, so this crash's own ordinal
    /// (the count including itself) is what gets evaluated, not the count
    /// of crashes before it.
    pub fn record_crash(&self, key: &str) -> Result<RestartDecision> {
        let mut attempts = self.attempts.lock();
        let next = *attempts.get(key).unwrap_or(&0) + 1;
        let decision = self.policy.decide(next);
        attempts.insert(key.to_string(), next);
        self.persist(&attempts)?;
        Ok(decision)
    }

    /// Reset the counter for `key` on a clean stop (§4.3).
    pub fn reset(&self, key: &str) -> Result<()> {
        let mut attempts = self.attempts.lock();
        if attempts.remove(key).is_some() {
            self.persist(&attempts)?;
        }
        Ok(())
    }

    pub fn attempts_for(&self, key: &str) -> u32 {
        *self.attempts.lock().get(key).unwrap_or(&0)
    }
}
