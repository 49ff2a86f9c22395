// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Volute Contributors

//! Centralized environment variable access for the daemon crate.

use std::path::PathBuf;

use crate::lifecycle::LifecycleError;

/// Resolve the daemon home: `VOLUTE_STATE_DIR` > `XDG_STATE_HOME/volute` >
/// `~/.local/state/volute`.
pub fn state_dir() -> Result<PathBuf, LifecycleError> {
    if let Ok(dir) = std::env::var("VOLUTE_STATE_DIR") {
        return Ok(PathBuf::from(dir));
    }
    if let Ok(xdg) = std::env::var("XDG_STATE_HOME") {
        return Ok(PathBuf::from(xdg).join("volute"));
    }
    let home = std::env::var("HOME").map_err(|_| LifecycleError::NoStateDir)?;
    Ok(PathBuf::from(home).join(".local/state/volute"))
}

/// `tracing_subscriber::EnvFilter` directive, default `info`.
pub fn log_directive() -> String {
    std::env::var("VOLUTE_LOG").unwrap_or_else(|_| "info".to_string())
}

/// TCP port to bind the HTTP API to. `0` lets the OS choose, recorded into
/// `daemon.json` for connectors/operators to discover.
pub fn port() -> u16 {
    std::env::var("VOLUTE_PORT").ok().and_then(|s| s.parse().ok()).unwrap_or(0)
}

/// Bearer token for the HTTP API. Generated and persisted to `daemon.json`
/// on first start if not set.
pub fn auth_token() -> Option<String> {
    std::env::var("VOLUTE_TOKEN").ok().filter(|s| !s.is_empty())
}

/// Outbound webhook target for the activity bus (§4.2): every event is
/// POSTed to this URL with a bearer token. Disabled unless both are set.
pub fn webhook_config() -> Option<(String, String)> {
    let url = std::env::var("VOLUTE_WEBHOOK_URL").ok().filter(|s| !s.is_empty())?;
    let token = std::env::var("VOLUTE_WEBHOOK_TOKEN").unwrap_or_default();
    Some((url, token))
}

/// Whether per-mind OS-user isolation is enabled (§4.5 "Under optional
/// isolation..."). Off by default since it requires the operator to have
/// provisioned a dedicated `volute-<name>` account for every mind ahead of
/// time.
pub fn isolation_enabled() -> bool {
    matches!(std::env::var("VOLUTE_ISOLATION").as_deref(), Ok("1") | Ok("true"))
}

/// Executable used to spawn every mind's HTTP server process. The same
/// program is launched for every mind, distinguished by its env (§4.5
/// "Spawn protocol"); args come after the program name, space-separated.
pub fn mind_command() -> (String, Vec<String>) {
    let raw = std::env::var("VOLUTE_MIND_COMMAND").unwrap_or_else(|_| "mind".to_string());
    let mut parts = raw.split_whitespace().map(str::to_string);
    let program = parts.next().unwrap_or_else(|| "mind".to_string());
    (program, parts.collect())
}
