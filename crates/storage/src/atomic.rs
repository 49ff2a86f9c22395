// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Volute Contributors

//! Atomic write-tempfile-then-rename helper shared by every on-disk ledger
//! (registry, restart ledger, scheduler state, sleep state).

use crate::error::{Result, StorageError};
use std::fs;
use std::io::Write;
use std::path::Path;

/// Serialize `value` to pretty JSON and write it atomically to `path`: the
/// new content lands in a sibling tempfile first, then an `fs::rename`
/// swaps it into place, so a crash mid-write never leaves a torn file.
pub fn write_json_atomic<T: serde::Serialize>(path: &Path, value: &T) -> Result<()> {
    let parent = path.parent().unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(parent).map_err(|source| StorageError::Io { path: parent.to_path_buf(), source })?;

    let tmp_path = parent.join(format!(
        ".{}.tmp",
        path.file_name().and_then(|n| n.to_str()).unwrap_or("ledger")
    ));
    let body = serde_json::to_vec_pretty(value)?;
    {
        let mut file = fs::File::create(&tmp_path)
            .map_err(|source| StorageError::Io { path: tmp_path.clone(), source })?;
        file.write_all(&body).map_err(|source| StorageError::Io { path: tmp_path.clone(), source })?;
        file.sync_all().map_err(|source| StorageError::Io { path: tmp_path.clone(), source })?;
    }
    fs::rename(&tmp_path, path).map_err(|source| StorageError::Io { path: path.to_path_buf(), source })?;
    Ok(())
}

/// Read and parse a JSON ledger. Returns `Ok(None)` when the file is
/// absent (fresh daemon home), so callers can distinguish "never written"
/// from "corrupt".
pub fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    match fs::read(path) {
        Ok(bytes) => {
            let value = serde_json::from_slice(&bytes).map_err(|e| StorageError::Corrupt {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?;
            Ok(Some(value))
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(source) => Err(StorageError::Io { path: path.to_path_buf(), source }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct Doc {
        value: u32,
    }

    #[test]
    fn write_then_read_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("doc.json");
        write_json_atomic(&path, &Doc { value: 7 }).unwrap();
        let read: Option<Doc> = read_json(&path).unwrap();
        assert_eq!(read, Some(Doc { value: 7 }));
    }

    #[test]
    fn read_missing_file_returns_none() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing.json");
        let read: Option<Doc> = read_json(&path).unwrap();
        assert_eq!(read, None);
    }

    #[test]
    fn read_corrupt_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.json");
        fs::write(&path, b"{not json").unwrap();
        let result: Result<Option<Doc>> = read_json(&path);
        assert!(matches!(result, Err(StorageError::Corrupt { .. })));
    }
}
