// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Volute Contributors

#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! volute-adapters: the I/O boundary — subprocess spawn and process-group
//! kill, orphan reclamation, the mind HTTP client, the in-process activity
//! bus, the optional webhook forwarder, and bounded-timeout script
//! execution for scheduled scripts.

mod activity_bus;
mod error;
mod mind_client;
mod process;
mod script;
mod webhook;

pub use activity_bus::ActivityBus;
pub use error::{MindClientError, SpawnError};
pub use mind_client::{MessagePayload, MindClient};
pub use process::{
    chown_to_user, cmdline_contains, find_port_owners, kill_process_group, process_alive,
    read_pid_file, reclaim_orphan, spawn_and_wait_ready, write_pid_file, SpawnedProcess,
};
pub use script::{run_script, ScriptOutcome, DEFAULT_SCRIPT_TIMEOUT};
pub use webhook::WebhookForwarder;
