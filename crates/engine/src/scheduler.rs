// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Volute Contributors

//! Scheduler: a single process-wide 60s tick that fires cron-driven
//! message/script schedules into minds, idempotent across restarts (§4.7).

use crate::cron_util::{epoch_minute_for, fires_at_epoch_minute, parse_cron};
use crate::delivery_manager::DeliveryManager;
use cron::Schedule as CronSchedule;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;
use volute_core::{ContentPart, InboundMessage, Schedule, ScheduleTarget};
use volute_storage::{Registry, SchedulerState};

const TICK_INTERVAL: Duration = Duration::from_secs(60);

pub struct Scheduler {
    registry: Arc<Registry>,
    delivery_manager: Arc<DeliveryManager>,
    state: Arc<SchedulerState>,
    schedules: Mutex<HashMap<String, Vec<Schedule>>>,
    stopped: AtomicBool,
    isolation_enabled: bool,
}

impl Scheduler {
    pub fn new(
        registry: Arc<Registry>,
        delivery_manager: Arc<DeliveryManager>,
        state: Arc<SchedulerState>,
        isolation_enabled: bool,
    ) -> Arc<Self> {
        Arc::new(Self {
            registry,
            delivery_manager,
            state,
            schedules: Mutex::new(HashMap::new()),
            stopped: AtomicBool::new(false),
            isolation_enabled,
        })
    }

    /// `loadSchedules(mind)`: read schedules from `raw`, typically the
    /// mind's config file contents. A parse failure leaves the existing
    /// in-memory copy untouched (§4.7 "never silently drops schedules on
    /// a parse hiccup").
    pub fn load_schedules_from_str(&self, mind: &str, raw: &str) {
        match serde_json::from_str::<Vec<Schedule>>(raw) {
            Ok(schedules) => {
                self.schedules.lock().insert(mind.to_string(), schedules);
            }
            Err(e) => warn!(mind, error = %e, "failed to parse mind schedules, keeping stale copy"),
        }
    }

    pub fn unload_schedules(&self, mind: &str) {
        self.schedules.lock().remove(mind);
    }

    /// Spawn the 60s tick loop (§4.7 "single process-wide periodic tick").
    pub fn spawn(self: &Arc<Self>) {
        let this = Arc::clone(self);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(TICK_INTERVAL);
            loop {
                interval.tick().await;
                if this.stopped.load(Ordering::SeqCst) {
                    return;
                }
                this.tick(epoch_minute_for(chrono::Utc::now())).await;
            }
        });
    }

    pub fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
    }

    /// One tick (§4.7 points 1-3): parse-cache per mind's schedules, check
    /// each against `epoch_minute`, claim and fire.
    pub async fn tick(&self, epoch_minute: u64) {
        let snapshot: Vec<(String, Vec<Schedule>)> =
            self.schedules.lock().iter().map(|(mind, list)| (mind.clone(), list.clone())).collect();

        for (mind, list) in snapshot {
            let mut cache: HashMap<String, CronSchedule> = HashMap::new();
            for schedule in list.iter().filter(|s| s.enabled) {
                let parsed = match cache.get(&schedule.cron) {
                    Some(s) => s.clone(),
                    None => match parse_cron(&schedule.cron) {
                        Ok(s) => {
                            cache.insert(schedule.cron.clone(), s.clone());
                            s
                        }
                        Err(e) => {
                            warn!(mind = %mind, schedule = %schedule.id, error = %e, "invalid cron expression, skipping");
                            continue;
                        }
                    },
                };
                if !fires_at_epoch_minute(&parsed, epoch_minute) {
                    continue;
                }
                match self.state.try_claim(&mind, &schedule.id, epoch_minute) {
                    Ok(true) => self.fire(&mind, schedule).await,
                    Ok(false) => {}
                    Err(e) => warn!(mind = %mind, schedule = %schedule.id, error = %e, "failed to persist firing ledger"),
                }
            }
        }
    }

    async fn fire(&self, mind: &str, schedule: &Schedule) {
        match &schedule.target {
            ScheduleTarget::Message { message } => self.fire_message(mind, &schedule.id, message).await,
            ScheduleTarget::Script { script } => self.fire_script(mind, &schedule.id, script).await,
        }
    }

    /// §4.7 point 4.
    async fn fire_message(&self, mind: &str, schedule_id: &str, message: &str) {
        let inbound = system_message("system:scheduler", schedule_id, message);
        if let Err(e) = self.delivery_manager.route_and_deliver(mind, inbound).await {
            warn!(mind, schedule_id, error = %e, "failed to deliver scheduled message");
        }
    }

    /// §4.7 point 5.
    async fn fire_script(&self, mind: &str, schedule_id: &str, script: &str) {
        let Some(record) = self.registry.get(mind) else {
            warn!(mind, schedule_id, "skipping scheduled script: mind not found");
            return;
        };
        let cwd = record.dir.join("home");
        let run_as = self.isolation_enabled.then(|| volute_core::isolation_user(mind));
        let outcome =
            volute_adapters::run_script(script, &cwd, volute_adapters::DEFAULT_SCRIPT_TIMEOUT, run_as.as_deref()).await;
        let text = match outcome {
            volute_adapters::ScriptOutcome::NoOp => return,
            volute_adapters::ScriptOutcome::Message(text) => text,
            volute_adapters::ScriptOutcome::Error(e) => e,
        };
        let inbound = system_message("system:scheduler", schedule_id, &text);
        if let Err(e) = self.delivery_manager.route_and_deliver(mind, inbound).await {
            warn!(mind, schedule_id, error = %e, "failed to deliver scheduled script output");
        }
    }
}

fn system_message(channel: &str, sender: &str, text: &str) -> InboundMessage {
    InboundMessage {
        content: vec![ContentPart::Text { text: text.to_string() }],
        channel: channel.to_string(),
        sender: Some(sender.to_string()),
        platform: None,
        is_dm: false,
        channel_name: None,
        server_name: None,
        participant_count: None,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use volute_storage::DeliveryQueue;

    fn schedule(id: &str, cron: &str, message: &str) -> Schedule {
        Schedule { id: id.to_string(), cron: cron.to_string(), target: ScheduleTarget::Message { message: message.to_string() }, enabled: true }
    }

    fn test_scheduler() -> (Arc<Scheduler>, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let registry = Arc::new(Registry::load(dir.path().join("registry.json"), Default::default()).unwrap());
        let restart_tracker = Arc::new(volute_storage::RestartTracker::load(dir.path().join("crash-attempts.json"), Default::default()).unwrap());
        let activity = Arc::new(volute_adapters::ActivityBus::new());
        let mind_manager = crate::mind_manager::MindManager::new(
            dir.path().to_path_buf(),
            crate::mind_manager::MindCommand { program: "true".into(), args: vec![] },
            Arc::clone(&registry),
            restart_tracker,
            Arc::clone(&activity),
            false,
        );
        let queue = Arc::new(DeliveryQueue::open_in_memory().unwrap());
        let delivery_manager = DeliveryManager::new(Arc::new(mind_manager), Arc::clone(&registry), queue, activity);
        let state = Arc::new(SchedulerState::load(dir.path().join("scheduler-state.json")).unwrap());
        (Scheduler::new(registry, delivery_manager, state, false), dir)
    }

    #[tokio::test]
    async fn schedule_fires_at_most_once_per_epoch_minute() {
        let (scheduler, _dir) = test_scheduler();
        scheduler.load_schedules_from_str("alpha", &serde_json::to_string(&vec![schedule("daily", "*/1 * * * *", "hi")]).unwrap());

        scheduler.tick(1_000_000).await;
        scheduler.tick(1_000_000).await;

        let claimed_again = scheduler.state.try_claim("alpha", "daily", 1_000_000).unwrap();
        assert!(!claimed_again);
    }

    #[test]
    fn parse_failure_keeps_stale_schedules() {
        let (scheduler, _dir) = test_scheduler();
        scheduler.load_schedules_from_str("alpha", &serde_json::to_string(&vec![schedule("daily", "*/1 * * * *", "hi")]).unwrap());
        scheduler.load_schedules_from_str("alpha", "not json");
        assert_eq!(scheduler.schedules.lock().get("alpha").map(|v| v.len()), Some(1));
    }
}
