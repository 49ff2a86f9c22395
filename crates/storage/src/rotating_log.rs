// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Volute Contributors

//! Size-bounded, line-oriented append log (§4.4), used for the daemon log
//! and each mind's `logs/mind.log`.
//!
//! Rotation keeps a bounded number of numbered generations, shifting older
//! ones up and dropping the oldest.

use crate::error::{Result, StorageError};
use parking_lot::Mutex;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

const DEFAULT_MAX_BYTES: u64 = 10 * 1024 * 1024;
const DEFAULT_MAX_GENERATIONS: u32 = 3;

pub struct RotatingLog {
    path: PathBuf,
    max_bytes: u64,
    max_generations: u32,
    file: Mutex<File>,
}

impl RotatingLog {
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        Self::with_limits(path, DEFAULT_MAX_BYTES, DEFAULT_MAX_GENERATIONS)
    }

    pub fn with_limits(path: impl Into<PathBuf>, max_bytes: u64, max_generations: u32) -> Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|source| StorageError::Io { path: parent.to_path_buf(), source })?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|source| StorageError::Io { path: path.clone(), source })?;
        Ok(Self { path, max_bytes, max_generations, file: Mutex::new(file) })
    }

    /// Append one line. Writes are resilient to mid-line crashes: a failed
    /// or partial line never corrupts prior entries since each write is a
    /// single `write_all` + newline (§4.4 "no partial JSON framing
    /// required").
    pub fn append_line(&self, line: &str) -> Result<()> {
        self.rotate_if_needed()?;
        let mut file = self.file.lock();
        writeln!(file, "{line}").map_err(|source| StorageError::Io { path: self.path.clone(), source })?;
        file.flush().map_err(|source| StorageError::Io { path: self.path.clone(), source })?;
        Ok(())
    }

    fn rotate_if_needed(&self) -> Result<()> {
        let size = match fs::metadata(&self.path) {
            Ok(meta) => meta.len(),
            Err(_) => return Ok(()),
        };
        if size < self.max_bytes {
            return Ok(());
        }
        self.rotate()
    }

    fn rotate(&self) -> Result<()> {
        let mut file = self.file.lock();
        let oldest = generation_path(&self.path, self.max_generations);
        if oldest.exists() {
            let _ = fs::remove_file(&oldest);
        }
        for n in (1..self.max_generations).rev() {
            let src = generation_path(&self.path, n);
            if src.exists() {
                let _ = fs::rename(&src, generation_path(&self.path, n + 1));
            }
        }
        fs::rename(&self.path, generation_path(&self.path, 1))
            .map_err(|source| StorageError::Io { path: self.path.clone(), source })?;
        *file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|source| StorageError::Io { path: self.path.clone(), source })?;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn generation_path(path: &Path, n: u32) -> PathBuf {
    let mut os = path.as_os_str().to_owned();
    os.push(format!(".{n}"));
    PathBuf::from(os)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn appends_lines_without_truncating() {
        let dir = tempfile::tempdir().unwrap();
        let log = RotatingLog::open(dir.path().join("mind.log")).unwrap();
        log.append_line("first").unwrap();
        log.append_line("second").unwrap();
        let contents = fs::read_to_string(log.path()).unwrap();
        assert_eq!(contents, "first\nsecond\n");
    }

    #[test]
    fn rotates_when_over_size_limit() {
        let dir = tempfile::tempdir().unwrap();
        let log = RotatingLog::with_limits(dir.path().join("mind.log"), 10, 3).unwrap();
        log.append_line("0123456789").unwrap();
        log.append_line("next generation").unwrap();
        assert!(generation_path(log.path(), 1).exists());
        let contents = fs::read_to_string(log.path()).unwrap();
        assert_eq!(contents, "next generation\n");
    }

    #[test]
    fn keeps_bounded_generations() {
        let dir = tempfile::tempdir().unwrap();
        let log = RotatingLog::with_limits(dir.path().join("mind.log"), 5, 2).unwrap();
        for i in 0..5 {
            log.append_line(&format!("entry-{i}-xxxxxx")).unwrap();
        }
        assert!(!generation_path(log.path(), 3).exists());
    }
}
