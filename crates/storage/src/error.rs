// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Volute Contributors

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("io error at {path}: {source}")]
    Io {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("mind name already registered: {0}")]
    DuplicateName(String),
    #[error("mind not found: {0}")]
    NotFound(String),
    #[error("no ports remaining in reserved range {0}..{1}")]
    PortRangeExhausted(u16, u16),
    #[error("registry corrupt at {path}: {reason}")]
    Corrupt { path: std::path::PathBuf, reason: String },
}

pub type Result<T> = std::result::Result<T, StorageError>;
