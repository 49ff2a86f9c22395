// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Volute Contributors

//! Cron-driven schedule definitions (§3 "Schedule", §4.7).

use serde::{Deserialize, Serialize};

/// What a schedule fires: a literal message, or a script to execute.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ScheduleTarget {
    Message { message: String },
    Script { script: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Schedule {
    pub id: String,
    pub cron: String,
    #[serde(flatten)]
    pub target: ScheduleTarget,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}
