// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Volute Contributors

#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! volute-storage: on-disk and sqlite-backed persistence for the
//! supervisor's durable state — the registry, crash-attempt ledger,
//! rotating logs, scheduler firing ledger, sleep state, and the sleep
//! delivery queue. Every writer owns exactly one file or table (§3
//! "Ownership").

mod atomic;
mod delivery_queue;
mod error;
mod registry;
mod restart_tracker;
mod rotating_log;
mod scheduler_state;
mod sleep_state;

pub use atomic::{read_json, write_json_atomic};
pub use delivery_queue::DeliveryQueue;
pub use error::{Result, StorageError};
pub use registry::{PortRange, Registry};
pub use restart_tracker::RestartTracker;
pub use rotating_log::RotatingLog;
pub use scheduler_state::SchedulerState;
pub use sleep_state::SleepStateStore;
