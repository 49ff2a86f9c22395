// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Volute Contributors

//! Black-box daemon harness: spawns the real `voluted` binary against an
//! isolated state directory and drives it over HTTP, the way an operator
//! or connector process would interact with a running deployment.

use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::time::{Duration, Instant};

pub const WAIT_MAX_MS: u64 = 5_000;

pub struct DaemonHarness {
    pub dir: tempfile::TempDir,
    pub token: String,
    pub port: u16,
    pub base_url: String,
    http: reqwest::Client,
    child: Child,
}

impl DaemonHarness {
    /// Start `voluted` with an isolated `VOLUTE_STATE_DIR`, `VOLUTE_TOKEN`
    /// fixed ahead of time so tests don't have to scrape it back out, and
    /// `VOLUTE_MIND_COMMAND` pointed at the `stub-mind` helper binary.
    pub fn start() -> Self {
        let dir = tempfile::tempdir().expect("tempdir for daemon state");
        let token = format!("test-token-{}", std::process::id());
        let stub_mind = assert_cmd::cargo::cargo_bin("stub-mind");

        let child = Command::new(assert_cmd::cargo::cargo_bin("voluted"))
            .env("VOLUTE_STATE_DIR", dir.path())
            .env("VOLUTE_PORT", "0")
            .env("VOLUTE_TOKEN", &token)
            .env("VOLUTE_LOG", "warn")
            .env("VOLUTE_MIND_COMMAND", stub_mind.display().to_string())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .expect("spawn voluted");

        let identity_path = dir.path().join("daemon.json");
        let deadline = Instant::now() + Duration::from_millis(WAIT_MAX_MS);
        let port = loop {
            if let Ok(raw) = std::fs::read_to_string(&identity_path) {
                if let Ok(identity) = serde_json::from_str::<serde_json::Value>(&raw) {
                    if let Some(port) = identity.get("port").and_then(|p| p.as_u64()) {
                        break port as u16;
                    }
                }
            }
            if Instant::now() >= deadline {
                panic!("daemon.json never appeared at {}", identity_path.display());
            }
            std::thread::sleep(Duration::from_millis(20));
        };

        Self {
            base_url: format!("http://127.0.0.1:{port}"),
            http: reqwest::Client::new(),
            dir,
            token,
            port,
            child,
        }
    }

    pub fn minds_dir(&self) -> PathBuf {
        self.dir.path().join("minds")
    }

    pub fn mind_home_dir(&self, name: &str) -> PathBuf {
        self.minds_dir().join(name).join("home")
    }

    /// Register a mind directly in `registry.json`, the way an operator's
    /// provisioning step would before the daemon is told to start it. No
    /// `/api` endpoint creates minds (§6 lists start/stop/restart only).
    /// Picks its own free port, since the stub mind must bind exactly the
    /// port the daemon's spawn-ready handshake expects.
    pub fn register_mind(&self, name: &str) -> u16 {
        let port = free_port();
        let dir = self.dir.path().join("minds").join(name);
        std::fs::create_dir_all(dir.join("home")).expect("create mind dir");

        let registry_path = self.dir.path().join("registry.json");
        let mut minds: Vec<serde_json::Value> = match std::fs::read_to_string(&registry_path) {
            Ok(raw) => serde_json::from_str(&raw).unwrap_or_default(),
            Err(_) => Vec::new(),
        };
        minds.push(serde_json::json!({
            "name": name,
            "port": port,
            "dir": dir,
            "stage": "mind",
            "running": false,
            "variants": [],
        }));
        std::fs::write(&registry_path, serde_json::to_vec_pretty(&minds).expect("serialize registry"))
            .expect("write registry.json");
        port
    }

    /// Path the stub mind appends received `/message` bodies to.
    pub fn mind_log_path(&self, name: &str) -> PathBuf {
        self.minds_dir().join(name).join("messages.log")
    }

    pub async fn post(&self, path: &str, body: serde_json::Value) -> reqwest::Response {
        self.http
            .post(format!("{}{}", self.base_url, path))
            .bearer_auth(&self.token)
            .json(&body)
            .send()
            .await
            .expect("request to daemon")
    }

    pub async fn post_no_body(&self, path: &str) -> reqwest::Response {
        self.http
            .post(format!("{}{}", self.base_url, path))
            .bearer_auth(&self.token)
            .send()
            .await
            .expect("request to daemon")
    }

    pub async fn delete(&self, path: &str) -> reqwest::Response {
        self.http
            .delete(format!("{}{}", self.base_url, path))
            .bearer_auth(&self.token)
            .send()
            .await
            .expect("request to daemon")
    }

    pub fn stop(mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

impl Drop for DaemonHarness {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

pub fn wait_for(max_ms: u64, mut predicate: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_millis(max_ms);
    loop {
        if predicate() {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        std::thread::sleep(Duration::from_millis(20));
    }
}

pub fn read_lines(path: &Path) -> Vec<String> {
    std::fs::read_to_string(path).map(|raw| raw.lines().map(str::to_string).collect()).unwrap_or_default()
}

/// Ask the OS for a free TCP port, then release it immediately. Good
/// enough for tests: nothing else on the machine is racing for it.
fn free_port() -> u16 {
    std::net::TcpListener::bind("127.0.0.1:0")
        .and_then(|l| l.local_addr())
        .map(|a| a.port())
        .unwrap_or(0)
}
