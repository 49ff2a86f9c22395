// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Volute Contributors

//! Per-mind configuration (`volute.json`, `routes.json`) and the daemon's
//! own published identity (`daemon.json`), §6 "Persistent files".

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use volute_core::{Schedule, SleepConfig};

/// What to launch for one connector type, read from a mind's `volute.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectorConfig {
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub env: HashMap<String, String>,
}

/// The aggregate per-mind config document, `<mind dir>/home/volute.json`.
/// `routes.json` lives alongside it but has its own schema (`RoutingConfig`)
/// and is loaded straight into `DeliveryManager` via `reload_routing_config`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MindConfig {
    #[serde(default)]
    pub sleep: SleepConfig,
    #[serde(default)]
    pub schedules: Vec<Schedule>,
    #[serde(default)]
    pub connectors: HashMap<String, ConnectorConfig>,
}

impl MindConfig {
    /// Load `volute.json` from `path`. Missing file reads as the default
    /// (no sleep schedule, no schedules, no connectors); a present but
    /// unparseable file is a config parse error (§7), logged by the caller,
    /// which should keep whatever it loaded last rather than propagate.
    pub fn load(path: &Path) -> Result<Option<Self>, std::io::Error> {
        match std::fs::read_to_string(path) {
            Ok(raw) => match serde_json::from_str(&raw) {
                Ok(config) => Ok(Some(config)),
                Err(e) => Err(std::io::Error::new(std::io::ErrorKind::InvalidData, e)),
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }
}

/// Published daemon identity (`daemon.json`, §6), content-fingerprint
/// protected on shutdown: a second daemon's `daemon.json` never gets
/// unlinked by the first one's exit path (§5 "Shared-resource policy").
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DaemonIdentity {
    pub port: u16,
    pub hostname: String,
    pub token: String,
}
