// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Volute Contributors

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SpawnError {
    #[error("working directory does not exist: {0}")]
    MissingDir(std::path::PathBuf),
    #[error("failed to spawn process: {0}")]
    Spawn(#[source] std::io::Error),
    #[error("timed out after {0:?} waiting for readiness")]
    ReadinessTimeout(std::time::Duration),
    #[error("process exited before becoming ready (status {0})")]
    ExitedBeforeReady(std::process::ExitStatus),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Error)]
pub enum MindClientError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("mind responded with status {0}")]
    Status(reqwest::StatusCode),
}
