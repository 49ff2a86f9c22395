// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Volute Contributors

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("mind not found: {0}")]
    UnknownMind(String),
    #[error("storage error: {0}")]
    Storage(#[from] volute_storage::StorageError),
    #[error("mind http error: {0}")]
    Client(#[from] volute_adapters::MindClientError),
}

#[derive(Debug, Error)]
pub enum SleepError {
    #[error("mind not found: {0}")]
    UnknownMind(String),
    #[error("storage error: {0}")]
    Storage(#[from] volute_storage::StorageError),
    #[error("mind http error: {0}")]
    Client(#[from] volute_adapters::MindClientError),
    #[error("mind manager error: {0}")]
    Mind(#[from] MindManagerError),
    #[error("timed out waiting for mind to go idle")]
    WaitForIdleTimeout,
}

#[derive(Debug, Error)]
pub enum MindManagerError {
    #[error("mind not found: {0}")]
    UnknownMind(String),
    #[error("mind already running: {0}")]
    AlreadyRunning(String),
    #[error("storage error: {0}")]
    Storage(#[from] volute_storage::StorageError),
    #[error("spawn error: {0}")]
    Spawn(#[from] volute_adapters::SpawnError),
    #[error("mind http error: {0}")]
    Client(#[from] volute_adapters::MindClientError),
}
