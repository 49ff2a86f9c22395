// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Volute Contributors

//! `voluted`: the Volute supervisor daemon entry point.

mod api;
mod auth;
mod config;
mod env;
mod lifecycle;
mod logging;

use tracing::{error, info};

#[tokio::main]
async fn main() {
    std::process::exit(run().await);
}

async fn run() -> i32 {
    let cfg = match lifecycle::Config::load() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("failed to resolve daemon home: {e}");
            return 1;
        }
    };

    if let Err(e) = std::fs::create_dir_all(&cfg.home) {
        eprintln!("failed to create daemon home {}: {e}", cfg.home.display());
        return 1;
    }

    let log_broadcaster = match logging::init(&cfg.log_path, &env::log_directive()) {
        Ok(broadcaster) => broadcaster,
        Err(e) => {
            eprintln!("failed to initialize logging: {e}");
            return 1;
        }
    };

    let startup_result = match lifecycle::startup(cfg, log_broadcaster).await {
        Ok(result) => result,
        Err(e) => {
            error!(error = %e, "daemon startup failed");
            return 1;
        }
    };

    let lifecycle::StartupResult { state, listener } = startup_result;
    let addr = match listener.local_addr() {
        Ok(addr) => addr,
        Err(e) => {
            error!(error = %e, "failed to read bound address");
            return 1;
        }
    };
    info!(%addr, "daemon listening");

    let app = std::sync::Arc::clone(&state.app);
    let router = api::router(app);
    let state = std::sync::Arc::new(tokio::sync::Mutex::new(state));

    let shutdown_state = std::sync::Arc::clone(&state);
    let serve_result =
        axum::serve(listener, router).with_graceful_shutdown(shutdown_signal(shutdown_state)).await;

    if let Err(e) = serve_result {
        error!(error = %e, "http server exited with error");
        return 1;
    }

    0
}

/// Wait for SIGINT/SIGTERM, then run the ordered shutdown. This future
/// only resolves once per process, so the shutdown it triggers can only
/// ever run once.
async fn shutdown_signal(state: std::sync::Arc<tokio::sync::Mutex<lifecycle::DaemonState>>) {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        let mut sigterm = match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(sigterm) => sigterm,
            Err(_) => return,
        };
        sigterm.recv().await;
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("received SIGINT, shutting down"),
        _ = terminate => info!("received SIGTERM, shutting down"),
    }

    state.lock().await.shutdown().await;
}
