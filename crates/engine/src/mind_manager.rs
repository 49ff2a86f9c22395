// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Volute Contributors

//! MindManager: spawn/stop/restart of mind subprocesses, orphan
//! reclamation, crash recovery, and pending-context delivery (§4.5).

use crate::error::MindManagerError;
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex as AsyncMutex;
use tracing::{info, warn};
use volute_adapters::{
    kill_process_group, reclaim_orphan, spawn_and_wait_ready, write_pid_file, MindClient,
    MessagePayload,
};
use volute_core::{ActivityEvent, InboundMessage, Mind, MindKey};
use volute_storage::{Registry, RestartTracker};

const SPAWN_READY_TIMEOUT: Duration = Duration::from_secs(30);
const STOP_GRACE: Duration = Duration::from_secs(5);
const READY_NEEDLE_PREFIX: &str = "listening on :";

/// The command used to launch a mind's HTTP server process.
#[derive(Debug, Clone)]
pub struct MindCommand {
    pub program: String,
    pub args: Vec<String>,
}

/// A one-shot system message stashed for delivery after the next
/// successful start (§4.5 "Pending context delivery").
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PendingContextKind {
    Merge,
    Sprout,
    Restart,
}

#[derive(Debug, Clone)]
pub struct PendingContext {
    pub kind: PendingContextKind,
    pub summary: Option<String>,
    pub justification: Option<String>,
    pub memory: Option<String>,
}

impl PendingContext {
    fn render(&self) -> String {
        let mut text = match self.kind {
            PendingContextKind::Merge => "[system] You have been merged from a variant.".to_string(),
            PendingContextKind::Sprout => "[system] You have sprouted a new variant.".to_string(),
            PendingContextKind::Restart => "[system] You have been restarted.".to_string(),
        };
        if let Some(summary) = &self.summary {
            text.push_str(&format!("\nSummary: {summary}"));
        }
        if let Some(justification) = &self.justification {
            text.push_str(&format!("\nJustification: {justification}"));
        }
        if let Some(memory) = &self.memory {
            text.push_str(&format!("\nMemory: {memory}"));
        }
        text
    }
}

struct ProcessRecord {
    pid: u32,
    port: u16,
}

pub struct MindManager {
    home: PathBuf,
    command: MindCommand,
    registry: Arc<Registry>,
    restart_tracker: Arc<RestartTracker>,
    activity: Arc<volute_adapters::ActivityBus>,
    mind_client: MindClient,
    shutting_down: AtomicBool,
    locks: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
    processes: Mutex<HashMap<String, ProcessRecord>>,
    pending: Mutex<HashMap<String, PendingContext>>,
    variants: Mutex<HashMap<String, Vec<String>>>,
    isolation_enabled: bool,
}

impl MindManager {
    pub fn new(
        home: PathBuf,
        command: MindCommand,
        registry: Arc<Registry>,
        restart_tracker: Arc<RestartTracker>,
        activity: Arc<volute_adapters::ActivityBus>,
        isolation_enabled: bool,
    ) -> Self {
        Self {
            home,
            command,
            registry,
            restart_tracker,
            activity,
            mind_client: MindClient::new(),
            shutting_down: AtomicBool::new(false),
            locks: Mutex::new(HashMap::new()),
            processes: Mutex::new(HashMap::new()),
            pending: Mutex::new(HashMap::new()),
            variants: Mutex::new(HashMap::new()),
            isolation_enabled,
        }
    }

    fn lock_for(&self, key: &str) -> Arc<AsyncMutex<()>> {
        self.locks.lock().entry(key.to_string()).or_insert_with(|| Arc::new(AsyncMutex::new(()))).clone()
    }

    fn state_dir(&self, key: &MindKey) -> PathBuf {
        self.home.join("state").join(key.composite())
    }

    fn pid_file(&self, key: &MindKey) -> PathBuf {
        self.state_dir(key).join("mind.pid")
    }

    /// Record `variant` as a known suffix of `base` in the base mind's
    /// registry entry (§3 "optional variants"). Resolved open question:
    /// variants are independent registry rows keyed by the composite name
    /// `base@variant` (see `start_mind`); this index exists only so
    /// callers can enumerate a base mind's variants.
    pub fn register_variant(&self, base: &str, variant: &str) -> Result<(), MindManagerError> {
        self.variants.lock().entry(base.to_string()).or_default().push(variant.to_string());
        Ok(())
    }

    /// Resolved open question — "variant identity" (removal while
    /// running): stop-on-removal. Call this once a variant's registry row
    /// has been deleted; if it was running, it is stopped rather than left
    /// orphaned.
    pub async fn handle_variant_removed(&self, composite: &str) -> Result<(), MindManagerError> {
        if self.is_running(composite) {
            self.stop_mind(composite).await?;
        }
        Ok(())
    }

    pub fn is_running(&self, name: &str) -> bool {
        self.processes.lock().contains_key(name)
    }

    pub fn get_running_minds(&self) -> Vec<String> {
        self.processes.lock().keys().cloned().collect()
    }

    pub fn port_of(&self, name: &str) -> Option<u16> {
        self.processes.lock().get(name).map(|p| p.port)
    }

    pub fn set_pending_context(&self, name: &str, context: PendingContext) {
        self.pending.lock().insert(name.to_string(), context);
    }

    /// `startMind(name)` (§4.5): resolve `base@variant`, reclaim orphans,
    /// spawn, wait for readiness, register the crash hook, mark running.
    pub async fn start_mind(self: &Arc<Self>, raw_name: &str) -> Result<(), MindManagerError> {
        let key = MindKey::parse(raw_name);
        let lock = self.lock_for(&key.composite());
        let _guard = lock.lock().await;

        if self.is_running(&key.composite()) {
            return Err(MindManagerError::AlreadyRunning(key.composite()));
        }

        let mind = self
            .registry
            .get(&key.composite())
            .ok_or_else(|| MindManagerError::UnknownMind(key.composite()))?;

        self.reclaim_orphans(&key, &mind).await;

        let state_dir = self.state_dir(&key);
        std::fs::create_dir_all(&state_dir).map_err(volute_adapters::SpawnError::Io)?;

        let run_as = self.isolation_enabled.then(|| volute_core::isolation_user(&key.base));
        if let Some(username) = &run_as {
            volute_adapters::chown_to_user(&state_dir, username).map_err(volute_adapters::SpawnError::Io)?;
            volute_adapters::chown_to_user(&mind.dir, username).map_err(volute_adapters::SpawnError::Io)?;
        }

        let envs = self.build_env(&key, &mind);
        let ready_needle = format!("{READY_NEEDLE_PREFIX}{}", mind.port);
        let spawned = spawn_and_wait_ready(
            &self.command.program,
            &self.command.args,
            &envs,
            &mind.dir,
            &ready_needle,
            SPAWN_READY_TIMEOUT,
            run_as.as_deref(),
        )
        .await?;

        write_pid_file(&self.pid_file(&key), spawned.pid).map_err(volute_adapters::SpawnError::Io)?;
        self.restart_tracker.reset(&key.composite())?;
        self.registry.set_running(&key.composite(), true)?;
        self.processes.lock().insert(key.composite(), ProcessRecord { pid: spawned.pid, port: mind.port });

        let this = Arc::clone(self);
        let composite = key.composite();
        spawned.spawn_reaper(composite.clone(), move |status| {
            this.handle_exit(composite, status.success());
        });

        self.activity.publish(ActivityEvent::MindStarted { mind: key.composite(), at: chrono::Utc::now() });
        self.deliver_pending_context(&key, mind.port).await;
        Ok(())
    }

    /// `stopMind(name)` (§4.5): SIGTERM the process group, SIGKILL after
    /// grace, reset restart counter, clear pending context, mark stopped.
    pub async fn stop_mind(&self, raw_name: &str) -> Result<(), MindManagerError> {
        let key = MindKey::parse(raw_name);
        let lock = self.lock_for(&key.composite());
        let _guard = lock.lock().await;
        self.stop_mind_locked(&key).await
    }

    async fn stop_mind_locked(&self, key: &MindKey) -> Result<(), MindManagerError> {
        let record = self.processes.lock().remove(&key.composite());
        if let Some(record) = record {
            kill_process_group(record.pid, STOP_GRACE).await.ok();
        }
        self.restart_tracker.reset(&key.composite())?;
        self.pending.lock().remove(&key.composite());
        self.registry.set_running(&key.composite(), false)?;
        self.activity.publish(ActivityEvent::MindStopped {
            mind: key.composite(),
            at: chrono::Utc::now(),
            reason: "stop".to_string(),
        });
        Ok(())
    }

    pub async fn restart_mind(self: &Arc<Self>, raw_name: &str) -> Result<(), MindManagerError> {
        self.stop_mind(raw_name).await?;
        self.start_mind(raw_name).await
    }

    /// `stopAll()` (§4.5): mark shutting down, stop every running mind
    /// concurrently.
    pub async fn stop_all(self: &Arc<Self>) {
        self.shutting_down.store(true, Ordering::SeqCst);
        let names = self.get_running_minds();
        let stops = names.into_iter().map(|name| {
            let this = Arc::clone(self);
            async move {
                if let Err(e) = this.stop_mind(&name).await {
                    warn!(mind = %name, error = %e, "failed to stop mind during stopAll");
                }
            }
        });
        futures_join_all(stops).await;
    }

    fn build_env(&self, key: &MindKey, mind: &Mind) -> Vec<(String, String)> {
        vec![
            ("VOLUTE_MIND_NAME".to_string(), key.composite()),
            ("VOLUTE_MIND_PORT".to_string(), mind.port.to_string()),
            ("VOLUTE_MIND_DIR".to_string(), mind.dir.display().to_string()),
            ("VOLUTE_STATE_DIR".to_string(), self.state_dir(key).display().to_string()),
        ]
    }

    async fn reclaim_orphans(&self, key: &MindKey, mind: &Mind) {
        let pid_file = self.pid_file(key);
        if reclaim_orphan(&pid_file, &self.command.program, Duration::from_millis(500)).await {
            info!(mind = %key.composite(), "reclaimed orphaned process from PID file");
        }
        if self.mind_client.health(mind.port).await {
            for pid in volute_adapters::find_port_owners(mind.port) {
                warn!(mind = %key.composite(), pid, port = mind.port, "killing unexpected process holding mind's port");
                let _ = kill_process_group(pid, Duration::from_millis(500)).await;
            }
        }
    }

    /// Crash handler (§4.5): on unexpected exit, consult RestartTracker
    /// and either restart after the returned delay or mark `running=false`.
    fn handle_exit(self: Arc<Self>, composite: String, clean: bool) {
        if self.shutting_down.load(Ordering::SeqCst) {
            return;
        }
        // A process removed from the table means stopMind already handled
        // this exit; nothing left to do.
        if self.processes.lock().remove(&composite).is_none() {
            return;
        }
        self.activity.publish(ActivityEvent::MindIdle { mind: composite.clone(), session: "*".into(), at: chrono::Utc::now() });
        self.activity.publish(ActivityEvent::MindStopped {
            mind: composite.clone(),
            at: chrono::Utc::now(),
            reason: if clean { "exit".into() } else { "crash".into() },
        });

        tokio::spawn(async move {
            let decision = match self.restart_tracker.record_crash(&composite) {
                Ok(d) => d,
                Err(e) => {
                    warn!(mind = %composite, error = %e, "failed to record crash");
                    return;
                }
            };
            if !decision.should_restart {
                let key = MindKey::parse(&composite);
                if let Err(e) = self.registry.set_running(&key.composite(), false) {
                    warn!(mind = %composite, error = %e, "failed to clear running flag after terminal crash");
                }
                return;
            }
            tokio::time::sleep(decision.delay).await;
            if self.shutting_down.load(Ordering::SeqCst) {
                return;
            }
            if let Err(e) = self.start_mind(&composite).await {
                warn!(mind = %composite, error = %e, "restart after crash failed");
            }
        });
    }

    async fn deliver_pending_context(&self, key: &MindKey, port: u16) {
        let context = self.pending.lock().remove(&key.composite());
        let Some(context) = context else { return };
        let inbound = InboundMessage {
            content: vec![volute_core::ContentPart::Text { text: context.render() }],
            channel: "system".to_string(),
            sender: None,
            platform: None,
            is_dm: false,
            channel_name: None,
            server_name: None,
            participant_count: None,
        };
        let payload = MessagePayload { inbound: &inbound, session: "system", auto_reply: false };
        if let Err(e) = self.mind_client.post_message(port, &payload).await {
            warn!(mind = %key.composite(), error = %e, "failed to deliver pending context");
        }
    }
}

async fn futures_join_all<F: std::future::Future<Output = ()> + Send + 'static>(futures: impl IntoIterator<Item = F>) {
    let handles: Vec<_> = futures.into_iter().map(tokio::spawn).collect();
    for handle in handles {
        let _ = handle.await;
    }
}
