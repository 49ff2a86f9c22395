// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Volute Contributors

//! Fake mind child process used by the workspace integration specs.
//!
//! Implements just enough of the mind child HTTP API (§6) for
//! `volute-engine`'s spawn-and-wait-ready handshake and `MindClient` calls
//! to succeed: it prints the ready needle on stdout, then serves
//! `/health`, `/message`, and `/typing`. Every `/message` body is appended
//! to `<VOLUTE_MIND_DIR>/messages.log`, one JSON object per line, so specs
//! can assert on what the daemon actually delivered.

use std::io::Write;
use std::sync::Arc;

use axum::extract::State;
use axum::routing::{get, post};
use axum::{Json, Router};
use tokio::net::TcpListener;

struct AppState {
    log_path: Option<std::path::PathBuf>,
}

#[tokio::main]
async fn main() {
    let port: u16 = std::env::var("VOLUTE_MIND_PORT")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(0);
    let log_path =
        std::env::var("VOLUTE_MIND_DIR").ok().map(|dir| std::path::PathBuf::from(dir).join("messages.log"));

    let listener = match TcpListener::bind(("127.0.0.1", port)).await {
        Ok(listener) => listener,
        Err(e) => {
            eprintln!("stub mind: failed to bind port {port}: {e}");
            std::process::exit(1);
        }
    };
    let bound = listener.local_addr().map(|a| a.port()).unwrap_or(port);

    let state = Arc::new(AppState { log_path });
    let router = Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/message", post(receive_message))
        .route("/typing", post(|| async { "ok" }))
        .with_state(state);

    println!("listening on :{bound}");
    std::io::stdout().flush().ok();

    if let Err(e) = axum::serve(listener, router).await {
        eprintln!("stub mind: server exited: {e}");
        std::process::exit(1);
    }
}

async fn receive_message(State(state): State<Arc<AppState>>, Json(body): Json<serde_json::Value>) -> &'static str {
    if let Some(path) = &state.log_path {
        if let Ok(mut file) = std::fs::OpenOptions::new().create(true).append(true).open(path) {
            let _ = writeln!(file, "{body}");
        }
    }
    "ok"
}
