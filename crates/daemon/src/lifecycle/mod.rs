// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Volute Contributors

//! Daemon lifecycle: fixed paths, startup sequencing, and the ordered
//! shutdown described in §5.

mod startup;
pub use startup::{startup, StartupResult};

use std::fs::File;
use std::path::PathBuf;
use std::sync::Arc;

use thiserror::Error;
use tracing::{info, warn};

use crate::api::AppState;
use crate::config::DaemonIdentity;

/// Fixed paths under the daemon home directory (§6 "Persistent files").
#[derive(Debug, Clone)]
pub struct Config {
    pub home: PathBuf,
    pub pid_path: PathBuf,
    pub identity_path: PathBuf,
    pub log_path: PathBuf,
    pub registry_path: PathBuf,
    pub crash_attempts_path: PathBuf,
    pub scheduler_state_path: PathBuf,
    pub sleep_state_path: PathBuf,
    pub delivery_queue_path: PathBuf,
    pub minds_dir: PathBuf,
    pub mind_state_dir: PathBuf,
}

impl Config {
    pub fn load() -> Result<Self, LifecycleError> {
        let home = crate::env::state_dir()?;
        Ok(Self {
            pid_path: home.join("daemon.pid"),
            identity_path: home.join("daemon.json"),
            log_path: home.join("daemon.log"),
            registry_path: home.join("registry.json"),
            crash_attempts_path: home.join("crash-attempts.json"),
            scheduler_state_path: home.join("scheduler-state.json"),
            sleep_state_path: home.join("sleep-state.json"),
            delivery_queue_path: home.join("delivery-queue.sqlite3"),
            minds_dir: home.join("minds"),
            mind_state_dir: home.join("state"),
            home,
        })
    }

    pub fn mind_dir(&self, name: &str) -> PathBuf {
        self.minds_dir.join(name)
    }

    pub fn mind_home_dir(&self, name: &str) -> PathBuf {
        self.mind_dir(name).join("home")
    }

    pub fn routes_path(&self, name: &str) -> PathBuf {
        self.mind_home_dir(name).join("routes.json")
    }

    pub fn volute_config_path(&self, name: &str) -> PathBuf {
        self.mind_home_dir(name).join("volute.json")
    }
}

/// Running daemon state: engine wiring plus the handles needed to shut
/// everything down in order.
pub struct DaemonState {
    pub config: Config,
    // Held only to maintain the exclusive lock; released on drop.
    #[allow(dead_code)]
    lock_file: File,
    pub app: Arc<AppState>,
    sleep_ticker: tokio::task::JoinHandle<()>,
}

impl DaemonState {
    pub(crate) fn new(
        config: Config,
        lock_file: File,
        app: Arc<AppState>,
        sleep_ticker: tokio::task::JoinHandle<()>,
    ) -> Self {
        Self { config, lock_file, app, sleep_ticker }
    }

    /// Ordered shutdown (§5): stop scheduler, stop the sleep ticker,
    /// flush in-flight batches, stopAll connectors, stopAll minds, clear
    /// restart attempts, unlink PID/identity files only if they still
    /// belong to this process. Returning from here is itself the "close
    /// the HTTP server" step: it's what lets `axum::serve`'s graceful
    /// shutdown future resolve.
    pub async fn shutdown(&mut self) {
        info!("shutting down daemon");

        self.app.scheduler.stop();
        // scheduler-state.json is persisted on every successful claim
        // (SchedulerState::try_claim), so there is nothing left to flush here.

        self.sleep_ticker.abort();

        self.app.delivery_manager.dispose().await;

        self.app.connector_manager.stop_all().await;
        self.app.mind_manager.stop_all().await;

        for mind in self.app.registry.list() {
            if let Err(e) = self.app.restart_tracker.reset(&mind.name) {
                warn!(mind = %mind.name, error = %e, "failed to clear restart attempts on shutdown");
            }
        }

        self.unlink_owned_files();

        info!("daemon shutdown complete");
    }

    fn unlink_owned_files(&self) {
        if let Some(pid) = volute_adapters::read_pid_file(&self.config.pid_path) {
            if pid == std::process::id() {
                if let Err(e) = std::fs::remove_file(&self.config.pid_path) {
                    warn!(error = %e, "failed to remove pid file");
                }
            }
        }

        if let Ok(raw) = std::fs::read_to_string(&self.config.identity_path) {
            if let Ok(identity) = serde_json::from_str::<DaemonIdentity>(&raw) {
                if identity.token == self.app.token {
                    if let Err(e) = std::fs::remove_file(&self.config.identity_path) {
                        warn!(error = %e, "failed to remove daemon.json");
                    }
                }
            }
        }
    }
}

#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("could not determine state directory")]
    NoStateDir,
    #[error("failed to acquire daemon lock: another instance already running?")]
    LockFailed(#[source] std::io::Error),
    #[error("failed to bind http listener on port {0}: {1}")]
    BindFailed(u16, std::io::Error),
    #[error("storage error: {0}")]
    Storage(#[from] volute_storage::StorageError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}
