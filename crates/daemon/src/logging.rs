// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Volute Contributors

//! Tracing setup: human-readable lines to stderr, the same lines appended
//! to the rotating `daemon.log` and fanned out to `GET /api/system/logs`
//! subscribers (§6).

use std::io;
use std::path::Path;
use std::sync::Arc;

use tokio::sync::broadcast;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;
use volute_storage::{RotatingLog, StorageError};

const LOG_BROADCAST_CAPACITY: usize = 256;

/// Handle for subscribing to daemon log lines as they're written.
#[derive(Clone)]
pub struct LogBroadcaster {
    tx: broadcast::Sender<String>,
}

impl LogBroadcaster {
    pub fn subscribe(&self) -> broadcast::Receiver<String> {
        self.tx.subscribe()
    }
}

struct TeeWriter {
    log: Arc<RotatingLog>,
    tx: broadcast::Sender<String>,
}

impl io::Write for TeeWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        for line in String::from_utf8_lossy(buf).lines() {
            if line.is_empty() {
                continue;
            }
            if let Err(e) = self.log.append_line(line) {
                eprintln!("failed to append daemon log line: {e}");
            }
            let _ = self.tx.send(line.to_string());
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[derive(Clone)]
struct TeeMakeWriter {
    log: Arc<RotatingLog>,
    tx: broadcast::Sender<String>,
}

impl<'a> MakeWriter<'a> for TeeMakeWriter {
    type Writer = TeeWriter;

    fn make_writer(&'a self) -> Self::Writer {
        TeeWriter { log: Arc::clone(&self.log), tx: self.tx.clone() }
    }
}

/// Install the global tracing subscriber and open the rotating log file at
/// `log_path`. `directive` is an `EnvFilter` directive (e.g. `info` or
/// `volute_engine=debug,info`), sourced from `VOLUTE_LOG`.
pub fn init(log_path: &Path, directive: &str) -> Result<LogBroadcaster, StorageError> {
    let log = Arc::new(RotatingLog::open(log_path)?);
    let (tx, _rx) = broadcast::channel(LOG_BROADCAST_CAPACITY);
    let tee = TeeMakeWriter { log, tx: tx.clone() };

    let filter = EnvFilter::try_new(directive).unwrap_or_else(|_| EnvFilter::new("info"));
    let stderr_layer = tracing_subscriber::fmt::layer().with_writer(io::stderr);
    let file_layer = tracing_subscriber::fmt::layer().with_writer(tee).with_ansi(false);

    tracing_subscriber::registry().with(filter).with(stderr_layer).with(file_layer).init();

    Ok(LogBroadcaster { tx })
}
