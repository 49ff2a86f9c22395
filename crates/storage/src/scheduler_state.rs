// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Volute Contributors

//! The `scheduler-state.json` firing ledger (§4.7, §8 idempotence
//! invariant): `mind:id -> last fired epoch-minute`.

use crate::atomic::{read_json, write_json_atomic};
use crate::error::Result;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::PathBuf;

pub struct SchedulerState {
    path: PathBuf,
    last_fired: Mutex<HashMap<String, u64>>,
}

fn firing_key(mind: &str, schedule_id: &str) -> String {
    format!("{mind}:{schedule_id}")
}

impl SchedulerState {
    pub fn load(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let last_fired: HashMap<String, u64> = read_json(&path)?.unwrap_or_default();
        Ok(Self { path, last_fired: Mutex::new(last_fired) })
    }

    /// Returns true and records the firing if `(mind, schedule_id)` has not
    /// already fired during `epoch_minute`; returns false without mutating
    /// state otherwise. A schedule fires at most once per epoch-minute,
    /// across daemon restarts, because the ledger is persisted before this
    /// returns (§4.7 point 3).
    pub fn try_claim(&self, mind: &str, schedule_id: &str, epoch_minute: u64) -> Result<bool> {
        let key = firing_key(mind, schedule_id);
        let mut last_fired = self.last_fired.lock();
        if last_fired.get(&key) == Some(&epoch_minute) {
            return Ok(false);
        }
        last_fired.insert(key, epoch_minute);
        write_json_atomic(&self.path, &*last_fired)?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fires_at_most_once_per_epoch_minute() {
        let dir = tempfile::tempdir().unwrap();
        let state = SchedulerState::load(dir.path().join("scheduler-state.json")).unwrap();
        assert!(state.try_claim("alpha", "daily", 720).unwrap());
        assert!(!state.try_claim("alpha", "daily", 720).unwrap());
        assert!(state.try_claim("alpha", "daily", 721).unwrap());
    }

    #[test]
    fn ledger_survives_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scheduler-state.json");
        let state = SchedulerState::load(&path).unwrap();
        state.try_claim("alpha", "daily", 720).unwrap();

        let reloaded = SchedulerState::load(&path).unwrap();
        assert!(!reloaded.try_claim("alpha", "daily", 720).unwrap());
    }

    #[test]
    fn distinct_minds_and_schedules_do_not_collide() {
        let dir = tempfile::tempdir().unwrap();
        let state = SchedulerState::load(dir.path().join("scheduler-state.json")).unwrap();
        assert!(state.try_claim("alpha", "daily", 720).unwrap());
        assert!(state.try_claim("beta", "daily", 720).unwrap());
        assert!(state.try_claim("alpha", "hourly", 720).unwrap());
    }
}
