// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Volute Contributors

//! Per-mind `sleep-state.json` persistence (§3, §4.10).

use crate::atomic::{read_json, write_json_atomic};
use crate::error::Result;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::PathBuf;
use volute_core::SleepState;

pub struct SleepStateStore {
    path: PathBuf,
    states: Mutex<HashMap<String, SleepState>>,
}

impl SleepStateStore {
    pub fn load(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let states: HashMap<String, SleepState> = read_json(&path)?.unwrap_or_default();
        Ok(Self { path, states: Mutex::new(states) })
    }

    pub fn get(&self, mind: &str) -> SleepState {
        self.states.lock().get(mind).cloned().unwrap_or_default()
    }

    pub fn set(&self, mind: &str, state: SleepState) -> Result<()> {
        let mut states = self.states.lock();
        states.insert(mind.to_string(), state);
        write_json_atomic(&self.path, &*states)
    }
}
