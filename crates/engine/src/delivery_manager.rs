// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Volute Contributors

//! DeliveryManager: routes inbound messages through `DeliveryRouter`,
//! dispatches them immediately or through a per-`(mind, session)` batch
//! buffer, and consults the sleep gate before every delivery (§4.9).

use crate::error::DeliveryError;
use crate::router::{self, session_has_explicit_immediate};
use crate::sleep_gate::{AlwaysAwake, SleepGate};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::io::Write;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::warn;
use volute_adapters::{ActivityBus, MindClient, MessagePayload};
use volute_core::{
    new_id, BatchSpec, ContentPart, InboundMessage, QueueStatus, QueuedMessage, RouteDecision,
    RouteMode, RoutingConfig, SessionActivity, SessionConfig,
};
use volute_storage::{DeliveryQueue, Registry};

use crate::mind_manager::MindManager;

/// Outcome of `route_and_deliver`, mirroring the response shapes in §4.9
/// plus the durable `sleep-queued` case.
#[derive(Debug, Clone, PartialEq)]
pub enum RouteOutcome {
    NotRouted { reason: &'static str },
    File { path: String },
    Gated,
    Immediate { session: String },
    Batch { session: String },
    SleepQueued { session: String },
}

type SessionKey = (String, String);

#[derive(Clone)]
struct BufferedMessage {
    channel: String,
    sender: Option<String>,
    message: InboundMessage,
}

#[derive(Default)]
struct BatchBuffer {
    messages: Vec<BufferedMessage>,
    /// Bumped on every flush; timers capture this and only fire if it is
    /// still current, so any flush invalidates every outstanding timer.
    flush_generation: u64,
    /// Bumped on every debounce (re)arm; a debounce timer only fires if no
    /// later message rearmed it. MaxWait timers ignore this — they fire
    /// regardless of further arrivals (§4.9 point 3).
    debounce_generation: u64,
}

pub struct DeliveryManager {
    mind_manager: Arc<MindManager>,
    registry: Arc<Registry>,
    delivery_queue: Arc<DeliveryQueue>,
    activity: Arc<ActivityBus>,
    mind_client: MindClient,
    configs: Mutex<HashMap<String, RoutingConfig>>,
    sessions: Mutex<HashMap<SessionKey, SessionActivity>>,
    batches: Mutex<HashMap<SessionKey, BatchBuffer>>,
    sleep_gate: Mutex<Arc<dyn SleepGate>>,
}

impl DeliveryManager {
    pub fn new(
        mind_manager: Arc<MindManager>,
        registry: Arc<Registry>,
        delivery_queue: Arc<DeliveryQueue>,
        activity: Arc<ActivityBus>,
    ) -> Arc<Self> {
        Arc::new(Self {
            mind_manager,
            registry,
            delivery_queue,
            activity,
            mind_client: MindClient::new(),
            configs: Mutex::new(HashMap::new()),
            sessions: Mutex::new(HashMap::new()),
            batches: Mutex::new(HashMap::new()),
            sleep_gate: Mutex::new(Arc::new(AlwaysAwake)),
        })
    }

    /// Wired post-construction once a `SleepManager` exists (it needs a
    /// concrete `Arc<DeliveryManager>` to flush queued messages on wake,
    /// so it cannot be a constructor argument here; see `SleepGate`).
    pub fn set_sleep_gate(&self, gate: Arc<dyn SleepGate>) {
        *self.sleep_gate.lock() = gate;
    }

    pub fn set_routing_config(&self, mind: &str, config: RoutingConfig) {
        self.configs.lock().insert(mind.to_string(), config);
    }

    /// Reload `routes.json` for `mind` from `path`. Parse failures keep the
    /// stale in-memory copy and log a warning (§7 "config parse errors").
    pub fn reload_routing_config(&self, mind: &str, path: &std::path::Path) {
        match std::fs::read_to_string(path) {
            Ok(raw) => match serde_json::from_str::<RoutingConfig>(&raw) {
                Ok(config) => self.set_routing_config(mind, config),
                Err(e) => warn!(mind, path = %path.display(), error = %e, "routes.json parse failed, keeping stale config"),
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(mind, path = %path.display(), error = %e, "failed to read routes.json"),
        }
    }

    fn routing_config(&self, mind: &str) -> RoutingConfig {
        self.configs.lock().get(mind).cloned().unwrap_or_default()
    }

    pub fn is_session_busy(&self, mind: &str, session: &str) -> bool {
        self.sessions.lock().get(&(mind.to_string(), session.to_string())).is_some_and(|a| a.is_busy())
    }

    /// Pending batch-buffer message counts per session, for `getPending`.
    pub fn get_pending(&self, mind: &str) -> Vec<(String, usize)> {
        self.batches
            .lock()
            .iter()
            .filter(|((m, _), _)| m == mind)
            .map(|((_, session), buf)| (session.clone(), buf.messages.len()))
            .collect()
    }

    /// `sessionDone(mind, session)`: decrement `activeCount` (§4.9).
    pub fn session_done(&self, mind: &str, session: &str) {
        let went_idle = {
            let mut sessions = self.sessions.lock();
            let Some(activity) = sessions.get_mut(&(mind.to_string(), session.to_string())) else { return };
            activity.mark_done();
            !activity.is_busy()
        };
        if went_idle {
            self.activity.publish(volute_core::ActivityEvent::MindIdle {
                mind: mind.to_string(),
                session: session.to_string(),
                at: chrono::Utc::now(),
            });
        }
    }

    /// `routeAndDeliver(mind, message)` (§4.9).
    pub async fn route_and_deliver(
        self: &Arc<Self>,
        mind: &str,
        message: InboundMessage,
    ) -> Result<RouteOutcome, DeliveryError> {
        let config = self.routing_config(mind);
        let decision = router::route(&config, mind, &message);

        match decision {
            RouteDecision::NotRouted { reason } => Ok(RouteOutcome::NotRouted { reason }),
            RouteDecision::File { path } => {
                self.append_to_file(mind, &path, &message)?;
                Ok(RouteOutcome::File { path })
            }
            RouteDecision::ToMind { session, mode } => {
                self.deliver_to_mind(mind, &session, mode, &config, message).await
            }
        }
    }

    async fn deliver_to_mind(
        self: &Arc<Self>,
        mind: &str,
        session: &str,
        mode: RouteMode,
        config: &RoutingConfig,
        message: InboundMessage,
    ) -> Result<RouteOutcome, DeliveryError> {
        let gate = self.sleep_gate.lock().clone();
        if gate.is_sleeping(mind) {
            let trigger = gate.check_wake_trigger(mind, &message);
            self.queue_sleeping(mind, session, &message);
            if let Some(trigger) = trigger {
                gate.request_wake(mind, Some(trigger));
            }
            return Ok(RouteOutcome::SleepQueued { session: session.to_string() });
        }

        if mode == RouteMode::Gated {
            return Ok(RouteOutcome::Gated);
        }

        let session_config = config.sessions.get(session).cloned().unwrap_or_default();
        let immediate = mode == RouteMode::Immediate || session_has_explicit_immediate(config, session);

        if immediate {
            let channel = message.channel.clone();
            let sender = message.sender.clone();
            self.dispatch_immediate(mind, session, &channel, sender.as_deref(), message, &session_config).await?;
            return Ok(RouteOutcome::Immediate { session: session.to_string() });
        }

        self.handle_batch(mind, session, message, session_config);
        Ok(RouteOutcome::Batch { session: session.to_string() })
    }

    fn queue_sleeping(&self, mind: &str, session: &str, message: &InboundMessage) {
        let queued = QueuedMessage {
            id: new_id(),
            mind: mind.to_string(),
            session: session.to_string(),
            channel: message.channel.clone(),
            sender: message.sender.clone(),
            status: QueueStatus::SleepQueued,
            payload: message.clone(),
        };
        if let Err(e) = self.delivery_queue.enqueue(&queued) {
            warn!(mind, session, error = %e, "failed to persist sleep-queued message, dropping");
        }
    }

    fn append_to_file(&self, mind: &str, path: &str, message: &InboundMessage) -> Result<(), DeliveryError> {
        let Some(record) = self.registry.get(mind) else { return Err(DeliveryError::UnknownMind(mind.to_string())) };
        let full_path = record.dir.join(path);
        if let Some(parent) = full_path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        let line = format!("[{}] {}: {}\n", message.channel, message.sender.as_deref().unwrap_or("?"), message.text());
        match std::fs::OpenOptions::new().create(true).append(true).open(&full_path) {
            Ok(mut file) => {
                if let Err(e) = file.write_all(line.as_bytes()) {
                    warn!(mind, path, error = %e, "failed to append inbox file");
                }
            }
            Err(e) => warn!(mind, path, error = %e, "failed to open inbox file"),
        }
        Ok(())
    }

    async fn dispatch_immediate(
        &self,
        mind: &str,
        session: &str,
        channel: &str,
        sender: Option<&str>,
        mut message: InboundMessage,
        session_config: &SessionConfig,
    ) -> Result<(), DeliveryError> {
        let port = self.mind_manager.port_of(mind).ok_or_else(|| DeliveryError::UnknownMind(mind.to_string()))?;
        if let Some(instructions) = &session_config.instructions {
            message.content.insert(0, ContentPart::Text { text: format!("[Session instructions: {instructions}]") });
        }

        self.mark_dispatched(mind, session, channel, sender);
        let payload = MessagePayload { inbound: &message, session, auto_reply: session_config.auto_reply };
        match self.mind_client.post_message(port, &payload).await {
            Ok(()) => Ok(()),
            Err(e) => {
                // Delivery failures decrement optimistically so a failed
                // mind never holds the session busy forever (§4.9).
                self.session_done(mind, session);
                Err(e.into())
            }
        }
    }

    fn mark_dispatched(&self, mind: &str, session: &str, channel: &str, sender: Option<&str>) {
        let key = (mind.to_string(), session.to_string());
        {
            let mut sessions = self.sessions.lock();
            let activity = sessions.entry(key).or_default();
            activity.mark_dispatched(channel, sender, Instant::now());
        }
        self.activity.publish(volute_core::ActivityEvent::MindActive {
            mind: mind.to_string(),
            session: session.to_string(),
            at: chrono::Utc::now(),
        });
    }

    fn handle_batch(self: &Arc<Self>, mind: &str, session: &str, message: InboundMessage, session_config: SessionConfig) {
        let spec = session_config.batch_spec().unwrap_or_default();
        let key: SessionKey = (mind.to_string(), session.to_string());
        let channel = message.channel.clone();
        let sender = message.sender.clone();

        if self.should_interrupt(&key, &spec, &channel, sender.as_deref()) {
            let to_flush = {
                let mut batches = self.batches.lock();
                let buffer = batches.entry(key.clone()).or_default();
                buffer.messages.push(BufferedMessage { channel: channel.clone(), sender: sender.clone(), message });
                buffer.flush_generation += 1;
                std::mem::take(&mut buffer.messages)
            };
            self.mark_interrupt(&key);
            self.dispatch_batch(mind, session, to_flush, session_config);
            return;
        }

        let (triggered, was_empty) = {
            let mut batches = self.batches.lock();
            let buffer = batches.entry(key.clone()).or_default();
            let was_empty = buffer.messages.is_empty();
            let text = message.text().to_lowercase();
            buffer.messages.push(BufferedMessage { channel, sender, message });
            let triggered = !spec.triggers.is_empty() && spec.triggers.iter().any(|t| text.contains(&t.to_lowercase()));
            (triggered, was_empty)
        };

        if triggered || spec.is_pass_through() {
            let to_flush = {
                let mut batches = self.batches.lock();
                let buffer = batches.entry(key.clone()).or_default();
                buffer.flush_generation += 1;
                std::mem::take(&mut buffer.messages)
            };
            self.dispatch_batch(mind, session, to_flush, session_config);
            return;
        }

        if let Some(debounce) = spec.debounce {
            self.arm_debounce(mind, session, debounce, session_config.clone());
        }
        if was_empty {
            if let Some(max_wait) = spec.max_wait {
                self.arm_max_wait(mind, session, max_wait, session_config);
            }
        }
    }

    fn should_interrupt(&self, key: &SessionKey, spec: &BatchSpec, channel: &str, sender: Option<&str>) -> bool {
        let Some(sender) = sender else { return false };
        let sessions = self.sessions.lock();
        let Some(activity) = sessions.get(key) else { return false };
        if !activity.is_busy() {
            return false;
        }
        let Some(last_delivered_at) = activity.last_delivered_at else { return false };
        let now = Instant::now();
        let max_wait = Duration::from_secs_f64(spec.max_wait.unwrap_or(0.0).max(0.0));
        if now.duration_since(last_delivered_at) > max_wait {
            return false;
        }
        let debounce = Duration::from_secs_f64(spec.debounce.unwrap_or(0.0).max(0.0));
        if let Some(last_interrupt_at) = activity.last_interrupt_at {
            if now.duration_since(last_interrupt_at) <= debounce {
                return false;
            }
        }
        if activity.last_delivery_senders.contains(sender) {
            return false;
        }
        activity.last_delivery_channels.contains(channel)
    }

    fn mark_interrupt(&self, key: &SessionKey) {
        if let Some(activity) = self.sessions.lock().get_mut(key) {
            activity.last_interrupt_at = Some(Instant::now());
        }
    }

    fn arm_debounce(self: &Arc<Self>, mind: &str, session: &str, debounce_secs: f64, session_config: SessionConfig) {
        let key: SessionKey = (mind.to_string(), session.to_string());
        let (flush_gen, debounce_gen) = {
            let mut batches = self.batches.lock();
            let buffer = batches.entry(key.clone()).or_default();
            buffer.debounce_generation += 1;
            (buffer.flush_generation, buffer.debounce_generation)
        };
        let this = Arc::clone(self);
        let (mind, session) = (mind.to_string(), session.to_string());
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs_f64(debounce_secs.max(0.0))).await;
            this.fire_timer(&mind, &session, flush_gen, Some(debounce_gen), session_config);
        });
    }

    fn arm_max_wait(self: &Arc<Self>, mind: &str, session: &str, max_wait_secs: f64, session_config: SessionConfig) {
        let flush_gen = {
            let mut batches = self.batches.lock();
            batches.entry((mind.to_string(), session.to_string())).or_default().flush_generation
        };
        let this = Arc::clone(self);
        let (mind, session) = (mind.to_string(), session.to_string());
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs_f64(max_wait_secs.max(0.0))).await;
            this.fire_timer(&mind, &session, flush_gen, None, session_config);
        });
    }

    /// Fires a debounce (`expected_debounce_generation = Some`) or maxWait
    /// (`None`) timer. A debounce timer is stale if a later message rearmed
    /// it; a maxWait timer always flushes once due, unless the buffer was
    /// already flushed by something else in the meantime.
    fn fire_timer(
        self: &Arc<Self>,
        mind: &str,
        session: &str,
        expected_flush_generation: u64,
        expected_debounce_generation: Option<u64>,
        session_config: SessionConfig,
    ) {
        let key: SessionKey = (mind.to_string(), session.to_string());
        let to_flush = {
            let mut batches = self.batches.lock();
            let Some(buffer) = batches.get_mut(&key) else { return };
            if buffer.flush_generation != expected_flush_generation {
                return;
            }
            if let Some(expected) = expected_debounce_generation {
                if buffer.debounce_generation != expected {
                    return;
                }
            }
            buffer.flush_generation += 1;
            std::mem::take(&mut buffer.messages)
        };
        self.dispatch_batch(mind, session, to_flush, session_config);
    }

    /// Flush constructs a combined payload and dispatches it through the
    /// immediate path, using the last message's channel/sender and the
    /// session's `autoReply` (§4.9 "Flush").
    fn dispatch_batch(self: &Arc<Self>, mind: &str, session: &str, messages: Vec<BufferedMessage>, session_config: SessionConfig) {
        if messages.is_empty() {
            return;
        }
        let combined = build_batch_message(&messages);
        let channel = combined.channel.clone();
        let sender = combined.sender.clone();
        self.mark_dispatched(mind, session, &channel, sender.as_deref());

        let Some(port) = self.mind_manager.port_of(mind) else {
            warn!(mind, "dropping batch flush: mind not running");
            self.session_done(mind, session);
            return;
        };
        let mind_client = self.mind_client.clone();
        let auto_reply = session_config.auto_reply;
        let this = Arc::clone(self);
        let (mind, session) = (mind.to_string(), session.to_string());
        tokio::spawn(async move {
            let payload = MessagePayload { inbound: &combined, session: &session, auto_reply };
            if let Err(e) = mind_client.post_message(port, &payload).await {
                warn!(mind = %mind, session = %session, error = %e, "batch flush delivery failed");
                this.session_done(&mind, &session);
            }
        });
    }

    /// Flush every pending batch synchronously (`dispose()`, §4.9 closing).
    pub async fn dispose(&self) {
        let pending: Vec<(SessionKey, Vec<BufferedMessage>)> = {
            let mut batches = self.batches.lock();
            batches
                .iter_mut()
                .map(|(key, buffer)| {
                    buffer.flush_generation += 1;
                    (key.clone(), std::mem::take(&mut buffer.messages))
                })
                .collect()
        };
        for ((mind, session), messages) in pending {
            if messages.is_empty() {
                continue;
            }
            let combined = build_batch_message(&messages);
            if let Some(port) = self.mind_manager.port_of(&mind) {
                let payload = MessagePayload { inbound: &combined, session: &session, auto_reply: false };
                if let Err(e) = self.mind_client.post_message(port, &payload).await {
                    warn!(mind, session, error = %e, "dispose: batch flush failed");
                }
            }
        }
    }
}

fn build_batch_message(messages: &[BufferedMessage]) -> InboundMessage {
    let mut body = batch_header(messages);
    for m in messages {
        let sender = m.sender.as_deref().unwrap_or("unknown");
        body.push('\n');
        body.push_str(&format!("{sender}: {}", m.message.text()));
    }
    let last = &messages[messages.len() - 1];
    InboundMessage {
        content: vec![ContentPart::Text { text: body }],
        channel: last.channel.clone(),
        sender: last.sender.clone(),
        platform: last.message.platform.clone(),
        is_dm: last.message.is_dm,
        channel_name: last.message.channel_name.clone(),
        server_name: last.message.server_name.clone(),
        participant_count: last.message.participant_count,
    }
}

fn batch_header(messages: &[BufferedMessage]) -> String {
    let mut labels = Vec::new();
    for m in messages {
        let label = match &m.message.channel_name {
            Some(name) => format!("{} ( #{name} )", m.channel),
            None => m.channel.clone(),
        };
        if !labels.contains(&label) {
            labels.push(label);
        }
    }
    format!("[Batch: {}]", labels.join(", "))
}
