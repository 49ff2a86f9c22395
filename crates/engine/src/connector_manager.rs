// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Volute Contributors

//! ConnectorManager: one subprocess per `(mind, connector-type)` pair,
//! mirroring MindManager's lifecycle contract without its own backoff —
//! connectors are cheap to restart, so crash recovery is left to the
//! operator / external supervision (§4.6).

use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tracing::{info, warn};
use volute_storage::RotatingLog;

type ConnectorKey = (String, String);

struct ConnectorHandle {
    pid: u32,
}

/// What to launch for a `(mind, connector-type)` pair; resolved by the
/// daemon from the mind's connector config before calling `start`.
pub struct ConnectorCommand {
    pub program: String,
    pub args: Vec<String>,
}

pub struct ConnectorManager {
    home: PathBuf,
    daemon_port: u16,
    daemon_token: String,
    handles: Mutex<HashMap<ConnectorKey, ConnectorHandle>>,
}

impl ConnectorManager {
    pub fn new(home: PathBuf, daemon_port: u16, daemon_token: String) -> Arc<Self> {
        Arc::new(Self { home, daemon_port, daemon_token, handles: Mutex::new(HashMap::new()) })
    }

    fn log_path(&self, mind: &str, connector_type: &str) -> PathBuf {
        self.home.join("state").join(mind).join("logs").join(format!("connector-{connector_type}.log"))
    }

    pub fn is_running(&self, mind: &str, connector_type: &str) -> bool {
        self.handles.lock().contains_key(&(mind.to_string(), connector_type.to_string()))
    }

    pub fn running_for(&self, mind: &str) -> Vec<String> {
        self.handles.lock().keys().filter(|(m, _)| m == mind).map(|(_, t)| t.clone()).collect()
    }

    /// `startConnectors(mind, dir, mindPort, daemonPort)` — here scoped to
    /// one connector type at a time; the daemon calls this once per
    /// configured connector when starting a mind.
    pub fn start(
        self: &Arc<Self>,
        mind: &str,
        connector_type: &str,
        command: ConnectorCommand,
        dir: &Path,
        mind_port: u16,
        extra_env: &[(String, String)],
    ) -> std::io::Result<()> {
        let key = (mind.to_string(), connector_type.to_string());
        if self.handles.lock().contains_key(&key) {
            return Ok(());
        }

        let log = RotatingLog::open(self.log_path(mind, connector_type))
            .map_err(|e| std::io::Error::other(e.to_string()))?;

        let mut cmd = Command::new(&command.program);
        cmd.args(&command.args)
            .current_dir(dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .env("VOLUTE_MIND_NAME", mind)
            .env("VOLUTE_MIND_PORT", mind_port.to_string())
            .env("VOLUTE_MIND_DIR", dir.display().to_string())
            .env("VOLUTE_DAEMON_URL", format!("http://127.0.0.1:{}", self.daemon_port))
            .env("VOLUTE_DAEMON_TOKEN", &self.daemon_token);
        for (k, v) in extra_env {
            cmd.env(k, v);
        }
        #[cfg(unix)]
        {
            cmd.process_group(0);
        }

        let mut child = cmd.spawn()?;
        let pid = child.id().unwrap_or(0);
        let (Some(stdout), Some(stderr)) = (child.stdout.take(), child.stderr.take()) else {
            return Err(std::io::Error::other("connector missing piped stdio"));
        };

        let log = Arc::new(log);
        tail_into_log(stdout, Arc::clone(&log));
        tail_into_log(stderr, log);

        let this = Arc::clone(self);
        let (mind_owned, type_owned) = (mind.to_string(), connector_type.to_string());
        tokio::spawn(async move {
            match child.wait().await {
                Ok(status) => warn!(mind = %mind_owned, connector = %type_owned, %status, "connector exited"),
                Err(e) => warn!(mind = %mind_owned, connector = %type_owned, error = %e, "failed to wait on connector"),
            }
            this.handles.lock().remove(&(mind_owned, type_owned));
        });

        info!(mind, connector_type, pid, "connector started");
        self.handles.lock().insert(key, ConnectorHandle { pid });
        Ok(())
    }

    pub async fn stop(&self, mind: &str, connector_type: &str) {
        let handle = self.handles.lock().remove(&(mind.to_string(), connector_type.to_string()));
        if let Some(handle) = handle {
            let _ = volute_adapters::kill_process_group(handle.pid, std::time::Duration::from_secs(5)).await;
        }
    }

    /// `stopAll()` (§4.6).
    pub async fn stop_all(&self) {
        let keys: Vec<ConnectorKey> = self.handles.lock().keys().cloned().collect();
        for (mind, connector_type) in keys {
            self.stop(&mind, &connector_type).await;
        }
    }
}

fn tail_into_log(reader: impl tokio::io::AsyncRead + Unpin + Send + 'static, log: Arc<RotatingLog>) {
    tokio::spawn(async move {
        let mut lines = BufReader::new(reader).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            if let Err(e) = log.append_line(&line) {
                warn!(error = %e, "failed to append connector log line");
            }
        }
    });
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn start_and_stop_a_connector_process() {
        let dir = tempfile::tempdir().unwrap();
        let manager = ConnectorManager::new(dir.path().to_path_buf(), 9000, "token".into());
        manager
            .start(
                "alpha",
                "discord",
                ConnectorCommand { program: "sleep".into(), args: vec!["5".into()] },
                dir.path(),
                41000,
                &[],
            )
            .unwrap();
        assert!(manager.is_running("alpha", "discord"));
        manager.stop("alpha", "discord").await;
        assert!(!manager.is_running("alpha", "discord"));
    }
}
