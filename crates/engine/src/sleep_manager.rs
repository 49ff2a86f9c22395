// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Volute Contributors

//! SleepManager: schedules sleep/wake per mind, archives sessions, queues
//! messages for sleeping minds, and flushes them through DeliveryManager
//! on wake (§4.10).

use crate::cron_util::{fires_at_epoch_minute, parse_cron};
use crate::delivery_manager::DeliveryManager;
use crate::error::SleepError;
use crate::mind_manager::MindManager;
use crate::sleep_gate::SleepGate;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tracing::{info, warn};
use volute_core::{glob::glob_match, ActivityEvent, InboundMessage, SleepConfig};
use volute_storage::{DeliveryQueue, SleepStateStore};

const WAIT_FOR_IDLE_TIMEOUT: Duration = Duration::from_secs(120);
const SETTLE_DELAY: Duration = Duration::from_secs(3);

pub struct SleepManager {
    home: PathBuf,
    mind_manager: Arc<MindManager>,
    delivery_manager: Arc<DeliveryManager>,
    delivery_queue: Arc<DeliveryQueue>,
    state_store: Arc<SleepStateStore>,
    activity: Arc<volute_adapters::ActivityBus>,
    configs: Mutex<HashMap<String, SleepConfig>>,
    in_flight: Mutex<HashSet<String>>,
    return_to_sleep: Mutex<HashSet<String>>,
    /// Self-reference so the synchronous `SleepGate::request_wake` can
    /// spawn an owned async task without the daemon having to thread an
    /// `Arc<SleepManager>` through the trait-object seam.
    self_weak: Mutex<Weak<SleepManager>>,
}

impl SleepManager {
    pub fn new(
        home: PathBuf,
        mind_manager: Arc<MindManager>,
        delivery_manager: Arc<DeliveryManager>,
        delivery_queue: Arc<DeliveryQueue>,
        state_store: Arc<SleepStateStore>,
        activity: Arc<volute_adapters::ActivityBus>,
    ) -> Arc<Self> {
        Arc::new_cyclic(|weak| Self {
            home,
            mind_manager,
            delivery_manager,
            delivery_queue,
            state_store,
            activity,
            configs: Mutex::new(HashMap::new()),
            in_flight: Mutex::new(HashSet::new()),
            return_to_sleep: Mutex::new(HashSet::new()),
            self_weak: Mutex::new(weak.clone()),
        })
    }

    pub fn set_sleep_config(&self, mind: &str, config: SleepConfig) {
        self.configs.lock().insert(mind.to_string(), config);
    }

    fn sleep_config(&self, mind: &str) -> SleepConfig {
        self.configs.lock().get(mind).cloned().unwrap_or_default()
    }

    fn archive_dir(&self, mind: &str) -> PathBuf {
        self.home.join("state").join(mind).join("archive")
    }

    fn session_dir(&self, mind: &str) -> PathBuf {
        self.home.join("state").join(mind)
    }

    /// One tick of the per-minute evaluation (§4.10): for each configured
    /// mind, check whether its sleep or wake cron fires at `epoch_minute`.
    pub async fn tick(self: &Arc<Self>, epoch_minute: u64) {
        let minds: Vec<String> = self.configs.lock().keys().cloned().collect();
        for mind in minds {
            let config = self.sleep_config(&mind);
            let sleeping = self.state_store.get(&mind).sleeping;

            if !sleeping {
                if let Some(cron) = &config.sleep_cron {
                    if let Ok(schedule) = parse_cron(cron) {
                        if fires_at_epoch_minute(&schedule, epoch_minute) {
                            self.initiate_sleep(&mind).await;
                        }
                    }
                }
                continue;
            }

            let state = self.state_store.get(&mind);
            let now = chrono::Utc::now().timestamp().max(0) as u64;
            let due = state.voluntary_wake_at.into_iter().chain(state.scheduled_wake_at.into_iter()).max();
            if let Some(due) = due {
                if now >= due {
                    self.initiate_wake(&mind, None).await;
                    continue;
                }
            }
            if let Some(cron) = &config.wake_cron {
                if let Ok(schedule) = parse_cron(cron) {
                    if fires_at_epoch_minute(&schedule, epoch_minute) {
                        self.initiate_wake(&mind, None).await;
                    }
                }
            }
        }
    }

    fn begin(&self, mind: &str) -> bool {
        self.in_flight.lock().insert(mind.to_string())
    }

    fn end(&self, mind: &str) {
        self.in_flight.lock().remove(mind);
    }

    /// `initiateSleep(mind)` (§4.10). Idempotent no-op if already in
    /// flight for this mind.
    pub async fn initiate_sleep(self: &Arc<Self>, mind: &str) {
        if !self.begin(mind) {
            return;
        }
        let result = self.initiate_sleep_inner(mind).await;
        self.end(mind);
        if let Err(e) = result {
            warn!(mind, error = %e, "initiateSleep failed");
        }
    }

    async fn initiate_sleep_inner(&self, mind: &str) -> Result<(), SleepError> {
        let port = self.mind_manager.port_of(mind);
        if let Some(port) = port {
            let pre_sleep = pre_sleep_message();
            let client = volute_adapters::MindClient::new();
            let payload = volute_adapters::MessagePayload { inbound: &pre_sleep, session: "sleep", auto_reply: false };
            let _ = client.post_message(port, &payload).await;
        }

        self.wait_for_idle(mind, WAIT_FOR_IDLE_TIMEOUT).await;
        tokio::time::sleep(SETTLE_DELAY).await;
        self.archive_sessions(mind);

        self.mind_manager.stop_mind(mind).await?;

        let now = chrono::Utc::now().timestamp().max(0) as u64;
        let mut state = self.state_store.get(mind);
        state.begin_sleep(now, None);
        self.state_store.set(mind, state)?;
        info!(mind, "mind is now sleeping");
        Ok(())
    }

    async fn wait_for_idle(&self, mind: &str, timeout: Duration) {
        let mut rx = self.activity.subscribe();
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
            if remaining.is_zero() {
                return;
            }
            match tokio::time::timeout(remaining, rx.recv()).await {
                Ok(Ok(event)) if event.mind() == mind => {
                    if matches!(event, ActivityEvent::MindIdle { .. } | ActivityEvent::MindDone { .. }) {
                        return;
                    }
                }
                Ok(Ok(_)) => continue,
                Ok(Err(_)) | Err(_) => return,
            }
        }
    }

    fn archive_sessions(&self, mind: &str) {
        let session_dir = self.session_dir(mind);
        if !session_dir.exists() {
            return;
        }
        let stamp = chrono::Utc::now().format("%Y%m%dT%H%M%SZ").to_string();
        let dest = self.archive_dir(mind).join(&stamp);
        if let Err(e) = std::fs::create_dir_all(&dest) {
            warn!(mind, error = %e, "failed to create session archive directory");
            return;
        }
        let Ok(entries) = std::fs::read_dir(&session_dir) else { return };
        for entry in entries.flatten() {
            let name = entry.file_name();
            if name == "archive" {
                continue;
            }
            let _ = std::fs::rename(entry.path(), dest.join(name));
        }
    }

    /// `initiateWake(mind, trigger)` (§4.10). Idempotent no-op if already
    /// in flight for this mind.
    pub async fn initiate_wake(self: &Arc<Self>, mind: &str, trigger: Option<String>) {
        if !self.begin(mind) {
            return;
        }
        let result = self.initiate_wake_inner(mind, trigger).await;
        self.end(mind);
        if let Err(e) = result {
            warn!(mind, error = %e, "initiateWake failed");
        }
    }

    async fn initiate_wake_inner(&self, mind: &str, trigger: Option<String>) -> Result<(), SleepError> {
        self.mind_manager.start_mind(mind).await?;

        let wake_summary = self.render_wake_summary(mind)?;
        if let Some(port) = self.mind_manager.port_of(mind) {
            let client = volute_adapters::MindClient::new();
            let payload = volute_adapters::MessagePayload { inbound: &wake_summary, session: "sleep", auto_reply: false };
            let _ = client.post_message(port, &payload).await;
        }

        self.flush_queued_messages(mind).await?;

        let now = chrono::Utc::now().timestamp().max(0) as u64;
        let mut state = self.state_store.get(mind);
        let triggered = trigger.is_some();
        state.wake(trigger.as_deref(), now);
        self.state_store.set(mind, state)?;
        if triggered {
            self.return_to_sleep.lock().insert(mind.to_string());
        }
        info!(mind, "mind is now awake");
        Ok(())
    }

    /// §8 seed scenario 5: the wake summary must contain the literal
    /// substring `"<N> messages while you slept (<n1> on <channel1>, ...)"`.
    fn render_wake_summary(&self, mind: &str) -> Result<InboundMessage, SleepError> {
        let queued = self.delivery_queue.for_mind(mind)?;
        let total = queued.len();
        let mut counts: HashMap<String, usize> = HashMap::new();
        for m in &queued {
            *counts.entry(m.channel.clone()).or_default() += 1;
        }
        let mut lines = vec!["[system] Waking up.".to_string()];
        if total == 0 {
            lines.push("No messages arrived while asleep.".to_string());
        } else {
            let mut channels: Vec<_> = counts.into_iter().collect();
            channels.sort_by(|a, b| a.0.cmp(&b.0));
            let breakdown =
                channels.iter().map(|(channel, count)| format!("{count} on {channel}")).collect::<Vec<_>>().join(", ");
            lines.push(format!("{total} messages while you slept ({breakdown})"));
        }
        Ok(InboundMessage {
            content: vec![volute_core::ContentPart::Text { text: lines.join("\n") }],
            channel: "system:sleep".to_string(),
            sender: None,
            platform: None,
            is_dm: false,
            channel_name: None,
            server_name: None,
            participant_count: None,
        })
    }

    /// Flush queued messages through DeliveryManager in arrival order
    /// (§4.10, §8 ordering guarantee).
    async fn flush_queued_messages(&self, mind: &str) -> Result<(), SleepError> {
        let queued = self.delivery_queue.for_mind(mind)?;
        for item in queued {
            if let Err(e) = self.delivery_manager.route_and_deliver(mind, item.payload).await {
                warn!(mind, error = %e, "failed to flush queued message on wake");
            }
        }
        self.delivery_queue.clear_mind(mind)?;
        Ok(())
    }

    /// Call on every `mind_idle` event: if this mind was woken by a
    /// trigger and is due to return to sleep, do so now.
    pub async fn handle_mind_idle(self: &Arc<Self>, mind: &str) {
        if self.return_to_sleep.lock().remove(mind) {
            self.initiate_sleep(mind).await;
        }
    }

    fn default_wake_trigger(&self, message: &InboundMessage, mind_name: &str) -> Option<String> {
        if message.is_dm {
            return Some("dm".to_string());
        }
        if message.text().to_lowercase().contains(&format!("@{}", mind_name.to_lowercase())) {
            return Some("mention".to_string());
        }
        None
    }
}

fn pre_sleep_message() -> InboundMessage {
    InboundMessage {
        content: vec![volute_core::ContentPart::Text { text: "[system] Going to sleep.".to_string() }],
        channel: "system:sleep".to_string(),
        sender: None,
        platform: None,
        is_dm: false,
        channel_name: None,
        server_name: None,
        participant_count: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::delivery_manager::DeliveryManager;
    use crate::mind_manager::{MindCommand, MindManager};
    use volute_core::{ContentPart, QueueStatus, QueuedMessage};
    use volute_storage::Registry;

    fn test_sleep_manager() -> (Arc<SleepManager>, Arc<DeliveryQueue>, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let registry = Arc::new(Registry::load(dir.path().join("registry.json"), Default::default()).unwrap());
        let restart_tracker =
            Arc::new(volute_storage::RestartTracker::load(dir.path().join("crash-attempts.json"), Default::default()).unwrap());
        let activity = Arc::new(volute_adapters::ActivityBus::new());
        let mind_manager = Arc::new(MindManager::new(
            dir.path().to_path_buf(),
            MindCommand { program: "true".into(), args: vec![] },
            Arc::clone(&registry),
            restart_tracker,
            Arc::clone(&activity),
            false,
        ));
        let queue = Arc::new(DeliveryQueue::open_in_memory().unwrap());
        let delivery_manager = DeliveryManager::new(Arc::clone(&mind_manager), registry, Arc::clone(&queue), Arc::clone(&activity));
        let state_store = Arc::new(SleepStateStore::load(dir.path().join("sleep-state.json")).unwrap());
        let sleep_manager =
            SleepManager::new(dir.path().to_path_buf(), mind_manager, delivery_manager, Arc::clone(&queue), state_store, activity);
        (sleep_manager, queue, dir)
    }

    fn queued(id: &str, channel: &str) -> QueuedMessage {
        QueuedMessage {
            id: id.to_string(),
            mind: "alpha".to_string(),
            session: "discord".to_string(),
            channel: channel.to_string(),
            sender: Some("alice".to_string()),
            status: QueueStatus::SleepQueued,
            payload: InboundMessage {
                content: vec![ContentPart::Text { text: "hi".to_string() }],
                channel: channel.to_string(),
                sender: Some("alice".to_string()),
                platform: None,
                is_dm: false,
                channel_name: None,
                server_name: None,
                participant_count: None,
            },
        }
    }

    #[test]
    fn wake_summary_contains_the_seed_scenario_literal_substring() {
        let (sleep_manager, queue, _dir) = test_sleep_manager();
        queue.enqueue(&queued("m1", "discord:123")).unwrap();
        queue.enqueue(&queued("m2", "discord:123")).unwrap();
        queue.enqueue(&queued("m3", "discord:123")).unwrap();

        let summary = sleep_manager.render_wake_summary("alpha").unwrap();
        assert!(
            summary.text().contains("3 messages while you slept (3 on discord:123)"),
            "unexpected wake summary: {}",
            summary.text()
        );
    }

    #[test]
    fn wake_summary_with_no_queued_messages_says_so() {
        let (sleep_manager, _queue, _dir) = test_sleep_manager();
        let summary = sleep_manager.render_wake_summary("alpha").unwrap();
        assert!(summary.text().contains("No messages arrived while asleep."));
    }

    #[tokio::test]
    async fn handle_mind_idle_is_a_no_op_unless_the_mind_is_due_to_return_to_sleep() {
        let (sleep_manager, _queue, _dir) = test_sleep_manager();
        // Not in `return_to_sleep`: handle_mind_idle must not touch state.
        sleep_manager.handle_mind_idle("alpha").await;
        assert!(!sleep_manager.state_store.get("alpha").sleeping);

        sleep_manager.return_to_sleep.lock().insert("alpha".to_string());
        assert!(sleep_manager.return_to_sleep.lock().contains("alpha"));
    }
}

impl SleepGate for SleepManager {
    fn is_sleeping(&self, mind: &str) -> bool {
        self.state_store.get(mind).sleeping
    }

    fn check_wake_trigger(&self, mind: &str, message: &InboundMessage) -> Option<String> {
        if let Some(trigger) = self.default_wake_trigger(message, mind) {
            return Some(trigger);
        }
        let config = self.sleep_config(mind);
        for pattern in &config.wake_triggers {
            if glob_match(pattern, &message.channel) {
                return Some(format!("channel:{pattern}"));
            }
            if let Some(sender) = &message.sender {
                if glob_match(pattern, sender) {
                    return Some(format!("sender:{pattern}"));
                }
            }
        }
        None
    }

    fn request_wake(&self, mind: &str, trigger: Option<String>) {
        let Some(this) = self.self_weak.lock().upgrade() else { return };
        let mind = mind.to_string();
        tokio::spawn(async move {
            this.initiate_wake(&mind, trigger).await;
        });
    }
}
