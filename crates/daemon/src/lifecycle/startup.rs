// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Volute Contributors

//! Startup sequencing: acquire the exclusive lock before anything else
//! touches disk, bind the listener last, clean up anything this attempt
//! created if a later step fails.

use std::fs::OpenOptions;
use std::sync::Arc;

use fs2::FileExt;
use tokio::net::TcpListener;
use tracing::{info, warn};

use volute_adapters::{ActivityBus, MindClient, WebhookForwarder};
use volute_core::RestartPolicy;
use volute_engine::{ConnectorManager, DeliveryManager, MindCommand, MindManager, Scheduler, SleepManager};
use volute_storage::{DeliveryQueue, PortRange, Registry, RestartTracker, SchedulerState, SleepStateStore};

use super::{Config, DaemonState, LifecycleError};
use crate::api::AppState;
use crate::config::DaemonIdentity;
use crate::logging::LogBroadcaster;

pub struct StartupResult {
    pub state: DaemonState,
    pub listener: TcpListener,
}

/// Bring up the daemon: on any failure except a lock contention, roll
/// back anything this attempt created before returning the error.
pub async fn startup(
    config: Config,
    log_broadcaster: LogBroadcaster,
) -> Result<StartupResult, LifecycleError> {
    match startup_inner(&config, log_broadcaster).await {
        Ok(result) => Ok(result),
        Err(e) => {
            if !matches!(e, LifecycleError::LockFailed(_)) {
                cleanup_on_failure(&config);
            }
            Err(e)
        }
    }
}

async fn startup_inner(
    config: &Config,
    log_broadcaster: LogBroadcaster,
) -> Result<StartupResult, LifecycleError> {
    std::fs::create_dir_all(&config.home)?;

    let lock_path = config.home.join("daemon.lock");
    let lock_file = OpenOptions::new().create(true).write(true).open(&lock_path)?;
    lock_file.try_lock_exclusive().map_err(LifecycleError::LockFailed)?;
    volute_adapters::write_pid_file(&config.pid_path, std::process::id())?;

    std::fs::create_dir_all(&config.minds_dir)?;
    std::fs::create_dir_all(&config.mind_state_dir)?;

    let port = crate::env::port();
    let token = crate::env::auth_token().unwrap_or_else(volute_core::new_id);

    let registry = Arc::new(Registry::load(&config.registry_path, PortRange::default())?);
    let restart_tracker =
        Arc::new(RestartTracker::load(&config.crash_attempts_path, RestartPolicy::default())?);
    let scheduler_state = Arc::new(SchedulerState::load(&config.scheduler_state_path)?);
    let sleep_state = Arc::new(SleepStateStore::load(&config.sleep_state_path)?);
    let delivery_queue = Arc::new(DeliveryQueue::open(&config.delivery_queue_path)?);

    let activity = Arc::new(ActivityBus::new());
    if let Some((url, token)) = crate::env::webhook_config() {
        info!(url = %url, "forwarding activity bus events to webhook");
        WebhookForwarder::spawn(&activity, url, token);
    }

    let (program, args) = crate::env::mind_command();
    let mind_command = MindCommand { program, args };
    let isolation_enabled = crate::env::isolation_enabled();
    let mind_manager = Arc::new(MindManager::new(
        config.home.clone(),
        mind_command,
        Arc::clone(&registry),
        Arc::clone(&restart_tracker),
        Arc::clone(&activity),
        isolation_enabled,
    ));

    let delivery_manager = DeliveryManager::new(
        Arc::clone(&mind_manager),
        Arc::clone(&registry),
        Arc::clone(&delivery_queue),
        Arc::clone(&activity),
    );

    let sleep_manager = SleepManager::new(
        config.home.clone(),
        Arc::clone(&mind_manager),
        Arc::clone(&delivery_manager),
        Arc::clone(&delivery_queue),
        Arc::clone(&sleep_state),
        Arc::clone(&activity),
    );
    delivery_manager.set_sleep_gate(Arc::clone(&sleep_manager) as Arc<dyn volute_engine::SleepGate>);

    // Return-to-sleep hook (§4.10): a triggered wake that goes idle again
    // gets put back to sleep. `handle_mind_idle` is a no-op for minds that
    // weren't triggered-woken, so every idle event can flow through it.
    {
        let sleep_manager = Arc::clone(&sleep_manager);
        let mut idle_events = activity.subscribe();
        tokio::spawn(async move {
            loop {
                match idle_events.recv().await {
                    Ok(volute_core::ActivityEvent::MindIdle { mind, .. }) => {
                        sleep_manager.handle_mind_idle(&mind).await;
                    }
                    Ok(_) => continue,
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                }
            }
        });
    }

    let scheduler =
        Scheduler::new(Arc::clone(&registry), Arc::clone(&delivery_manager), scheduler_state, isolation_enabled);
    scheduler.spawn();

    let connector_manager = ConnectorManager::new(config.home.clone(), port, token.clone());

    let identity = DaemonIdentity { port, hostname: hostname(), token: token.clone() };
    std::fs::write(&config.identity_path, serde_json::to_vec_pretty(&identity)?)?;

    let app = Arc::new(AppState {
        config: config.clone(),
        token,
        registry,
        restart_tracker,
        mind_manager,
        delivery_manager,
        connector_manager,
        scheduler,
        sleep_manager: Arc::clone(&sleep_manager),
        activity,
        mind_client: MindClient::new(),
        log_broadcaster,
    });

    // `start_mind` reclaims any orphaned process for this mind before
    // spawning, so previously-running minds just need a plain restart here.
    for mind in app.registry.list().into_iter().filter(|m| m.running) {
        if let Err(e) = app.mind_manager.start_mind(&mind.name).await {
            warn!(mind = %mind.name, error = %e, "failed to restart mind on daemon startup");
            continue;
        }
        crate::api::apply_mind_config(&app, &mind.name).await;
    }

    let sleep_ticker = {
        let sleep_manager = Arc::clone(&sleep_manager);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(std::time::Duration::from_secs(60));
            loop {
                interval.tick().await;
                let epoch_minute = std::time::SystemTime::now()
                    .duration_since(std::time::UNIX_EPOCH)
                    .map(|d| d.as_secs() / 60)
                    .unwrap_or(0);
                sleep_manager.tick(epoch_minute).await;
            }
        })
    };

    let listener = match TcpListener::bind(("127.0.0.1", port)).await {
        Ok(listener) => listener,
        Err(e) => return Err(LifecycleError::BindFailed(port, e)),
    };
    let bound_port = listener.local_addr().map(|a| a.port()).unwrap_or(port);
    if bound_port != port {
        info!(bound_port, "daemon bound to OS-assigned port");
    }

    let state = DaemonState::new(config.clone(), lock_file, app, sleep_ticker);

    Ok(StartupResult { state, listener })
}

fn hostname() -> String {
    std::env::var("HOSTNAME").unwrap_or_else(|_| "localhost".to_string())
}

/// Remove anything this startup attempt may have created before failing.
/// Safe to call even if nothing was created yet.
fn cleanup_on_failure(config: &Config) {
    let _ = std::fs::remove_file(&config.pid_path);
    let _ = std::fs::remove_file(&config.identity_path);
}
