// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Volute Contributors

//! Durable record of minds, keyed by name (§4.1).
//!
//! The registry is one JSON array file (`registry.json`) guarded by a
//! `parking_lot::Mutex` in-process; writes go through
//! [`crate::atomic::write_json_atomic`] so a crash mid-write cannot corrupt
//! it. Registry corruption is treated as fatal on load (§7 "refuses to come
//! up rather than overwrite mid-file") rather than silently discarded.

use crate::atomic::{read_json, write_json_atomic};
use crate::error::{Result, StorageError};
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use volute_core::Mind;

/// Reserved TCP port range minds are allocated from.
#[derive(Debug, Clone, Copy)]
pub struct PortRange {
    pub start: u16,
    pub end: u16,
}

impl Default for PortRange {
    fn default() -> Self {
        Self { start: 41000, end: 41999 }
    }
}

pub struct Registry {
    path: PathBuf,
    ports: PortRange,
    minds: Mutex<Vec<Mind>>,
}

impl Registry {
    /// Load `registry.json` from `path`, or start empty if absent.
    /// A present-but-unparseable file is fatal (§7).
    pub fn load(path: impl Into<PathBuf>, ports: PortRange) -> Result<Self> {
        let path = path.into();
        let minds: Vec<Mind> = read_json(&path)?.unwrap_or_default();
        Ok(Self { path, ports, minds: Mutex::new(minds) })
    }

    fn persist(&self, minds: &[Mind]) -> Result<()> {
        write_json_atomic(&self.path, &minds.to_vec())
    }

    /// Register a new mind, assigning the lowest free port in the
    /// reserved range. Ports are never reused while the record exists.
    pub fn add(&self, name: impl Into<String>, dir: PathBuf) -> Result<Mind> {
        let name = name.into();
        let mut minds = self.minds.lock();
        if minds.iter().any(|m| m.name == name) {
            return Err(StorageError::DuplicateName(name));
        }
        let used: std::collections::HashSet<u16> = minds.iter().map(|m| m.port).collect();
        let port = (self.ports.start..=self.ports.end)
            .find(|p| !used.contains(p))
            .ok_or(StorageError::PortRangeExhausted(self.ports.start, self.ports.end))?;
        let mind = Mind::new(name, port, dir);
        minds.push(mind.clone());
        self.persist(&minds)?;
        Ok(mind)
    }

    pub fn remove(&self, name: &str) -> Result<()> {
        let mut minds = self.minds.lock();
        let before = minds.len();
        minds.retain(|m| m.name != name);
        if minds.len() == before {
            return Err(StorageError::NotFound(name.to_string()));
        }
        self.persist(&minds)
    }

    pub fn get(&self, name: &str) -> Option<Mind> {
        self.minds.lock().iter().find(|m| m.name == name).cloned()
    }

    pub fn list(&self) -> Vec<Mind> {
        self.minds.lock().clone()
    }

    /// Update the desired-running flag for `name` (§4.1 "`running` is the
    /// desired state"). Errors if the mind does not exist.
    pub fn set_running(&self, name: &str, running: bool) -> Result<()> {
        let mut minds = self.minds.lock();
        let mind = minds.iter_mut().find(|m| m.name == name).ok_or_else(|| StorageError::NotFound(name.to_string()))?;
        mind.running = running;
        self.persist(&minds)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}
