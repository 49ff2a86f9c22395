// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Volute Contributors

//! The `Mind` record: a supervised AI subprocess with a stable name, port,
//! and on-disk directory.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Lifecycle stage of a mind, separate from its process running-state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Freshly created, not yet promoted to a full mind.
    Seed,
    /// A fully developed mind.
    Mind,
}

/// Durable registry entry for a mind.
///
/// `running` is the *desired* state across daemon restarts (§4.1): daemon
/// startup iterates the registry and attempts to start every entry with
/// `running == true`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mind {
    pub name: String,
    pub port: u16,
    pub dir: PathBuf,
    pub stage: Stage,
    pub running: bool,
    #[serde(default)]
    pub variants: Vec<String>,
}

impl Mind {
    pub fn new(name: impl Into<String>, port: u16, dir: PathBuf) -> Self {
        Self { name: name.into(), port, dir, stage: Stage::Seed, running: false, variants: Vec::new() }
    }
}

/// Composite key addressing either a base mind or a `base@variant`.
///
/// A variant resolves to a distinct mind with its own directory and port
/// (§9 Open Question — "variant identity"); `MindKey` is the parsed form of
/// the wire-level `name` or `name@variant` string used throughout the
/// supervisor (process-table keys, log paths, PID files).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MindKey {
    pub base: String,
    pub variant: Option<String>,
}

impl MindKey {
    pub fn parse(raw: &str) -> Self {
        match raw.split_once('@') {
            Some((base, variant)) => Self { base: base.to_string(), variant: Some(variant.to_string()) },
            None => Self { base: raw.to_string(), variant: None },
        }
    }

    /// The composite key as used in process-table / log-path lookups.
    pub fn composite(&self) -> String {
        match &self.variant {
            Some(v) => format!("{}@{}", self.base, v),
            None => self.base.clone(),
        }
    }
}

impl fmt::Display for MindKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.composite())
    }
}

/// The dedicated OS user a mind runs under when isolation is enabled
/// (§1 "multi-tenant isolation beyond per-mind user accounts" is the
/// non-goal — per-mind user accounts themselves are in scope, §4.5
/// "Spawn protocol"). Deterministic from the mind's base name so the
/// daemon never has to persist it: the account is provisioned out of
/// band (e.g. `useradd`) with this exact name before isolation is turned
/// on for that mind.
pub fn isolation_user(base_name: &str) -> String {
    format!("volute-{base_name}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_base_without_variant() {
        let key = MindKey::parse("alpha");
        assert_eq!(key.base, "alpha");
        assert_eq!(key.variant, None);
        assert_eq!(key.composite(), "alpha");
    }

    #[test]
    fn parses_base_with_variant() {
        let key = MindKey::parse("alpha@experimental");
        assert_eq!(key.base, "alpha");
        assert_eq!(key.variant.as_deref(), Some("experimental"));
        assert_eq!(key.composite(), "alpha@experimental");
    }
}
