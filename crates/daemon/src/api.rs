// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Volute Contributors

//! HTTP API surface (§6): one axum router bearer-token gated against
//! `daemon.json`, mounted over the engine components.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Path as AxumPath, State};
use axum::http::StatusCode;
use axum::middleware;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use futures_util::Stream;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt;
use tower_http::trace::TraceLayer;
use tracing::warn;

use volute_adapters::{ActivityBus, MindClient};
use volute_core::InboundMessage;
use volute_engine::{ConnectorManager, DeliveryManager, MindManager, Scheduler, SleepManager};
use volute_storage::{Registry, RestartTracker};

use crate::auth::require_bearer_token;
use crate::lifecycle::Config;
use crate::logging::LogBroadcaster;

pub struct AppState {
    pub config: Config,
    pub token: String,
    pub registry: Arc<Registry>,
    pub restart_tracker: Arc<RestartTracker>,
    pub mind_manager: Arc<MindManager>,
    pub delivery_manager: Arc<DeliveryManager>,
    pub connector_manager: Arc<ConnectorManager>,
    pub scheduler: Arc<Scheduler>,
    pub sleep_manager: Arc<SleepManager>,
    pub activity: Arc<ActivityBus>,
    pub mind_client: MindClient,
    pub log_broadcaster: LogBroadcaster,
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/minds/{name}/message", post(post_message))
        .route("/api/minds/{name}/start", post(start_mind))
        .route("/api/minds/{name}/stop", post(stop_mind))
        .route("/api/minds/{name}/restart", post(restart_mind))
        .route(
            "/api/minds/{name}/connectors/{kind}",
            post(start_connector).delete(stop_connector),
        )
        .route("/api/minds/{name}/typing", post(post_typing))
        .route("/api/system/logs", get(stream_logs))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_bearer_token))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn err_response(status: StatusCode, error: impl ToString) -> Response {
    (status, Json(json!({ "error": error.to_string() }))).into_response()
}

async fn post_message(
    State(state): State<Arc<AppState>>,
    AxumPath(name): AxumPath<String>,
    Json(message): Json<InboundMessage>,
) -> Response {
    match state.delivery_manager.route_and_deliver(&name, message).await {
        Ok(outcome) => Json(json!({ "ok": true, "outcome": format!("{outcome:?}") })).into_response(),
        Err(e) => err_response(StatusCode::BAD_REQUEST, e),
    }
}

/// Reload a mind's `volute.json` and `routes.json`, start configured
/// connectors, load its schedules, and apply its sleep config. Shared by
/// `/start` and `/restart` since restarting a mind process does not itself
/// redo any of this setup.
pub(crate) async fn apply_mind_config(state: &AppState, name: &str) {
    let routes_path = state.config.routes_path(name);
    if routes_path.exists() {
        state.delivery_manager.reload_routing_config(name, &routes_path);
    }

    let volute_config_path = state.config.volute_config_path(name);
    match crate::config::MindConfig::load(&volute_config_path) {
        Ok(Some(config)) => {
            state.sleep_manager.set_sleep_config(name, config.sleep);

            match serde_json::to_string(&config.schedules) {
                Ok(schedules) => state.scheduler.load_schedules_from_str(name, &schedules),
                Err(e) => warn!(mind = %name, error = %e, "failed to serialize schedules"),
            }

            let Some(mind) = state.registry.get(name) else { return };
            for (kind, connector) in config.connectors {
                let extra_env: Vec<(String, String)> = connector.env.into_iter().collect();
                let result = state.connector_manager.start(
                    name,
                    &kind,
                    volute_engine::ConnectorCommand {
                        program: connector.program,
                        args: connector.args,
                    },
                    &mind.dir,
                    mind.port,
                    &extra_env,
                );
                if let Err(e) = result {
                    warn!(mind = %name, connector = %kind, error = %e, "failed to start connector");
                }
            }
        }
        Ok(None) => {}
        Err(e) => warn!(mind = %name, error = %e, "failed to load volute.json"),
    }
}

async fn start_mind(State(state): State<Arc<AppState>>, AxumPath(name): AxumPath<String>) -> Response {
    match state.mind_manager.start_mind(&name).await {
        Ok(()) => {
            apply_mind_config(&state, &name).await;
            Json(json!({ "ok": true })).into_response()
        }
        Err(e) => err_response(StatusCode::BAD_REQUEST, e),
    }
}

async fn stop_mind(State(state): State<Arc<AppState>>, AxumPath(name): AxumPath<String>) -> Response {
    for kind in state.connector_manager.running_for(&name) {
        state.connector_manager.stop(&name, &kind).await;
    }
    state.scheduler.unload_schedules(&name);

    match state.mind_manager.stop_mind(&name).await {
        Ok(()) => Json(json!({ "ok": true })).into_response(),
        Err(e) => err_response(StatusCode::BAD_REQUEST, e),
    }
}

async fn restart_mind(State(state): State<Arc<AppState>>, AxumPath(name): AxumPath<String>) -> Response {
    match state.mind_manager.restart_mind(&name).await {
        Ok(()) => {
            apply_mind_config(&state, &name).await;
            Json(json!({ "ok": true })).into_response()
        }
        Err(e) => err_response(StatusCode::BAD_REQUEST, e),
    }
}

#[derive(Deserialize)]
struct ConnectorRequest {
    program: Option<String>,
    #[serde(default)]
    args: Vec<String>,
    #[serde(default)]
    env: std::collections::HashMap<String, String>,
}

async fn start_connector(
    State(state): State<Arc<AppState>>,
    AxumPath((name, kind)): AxumPath<(String, String)>,
    body: Option<Json<ConnectorRequest>>,
) -> Response {
    let Some(mind) = state.registry.get(&name) else {
        return err_response(StatusCode::NOT_FOUND, "unknown mind");
    };

    let request = body.map(|Json(r)| r);
    let program = request.as_ref().and_then(|r| r.program.clone());
    let Some(program) = program.or_else(|| default_connector_program(&state, &name, &kind)) else {
        return err_response(StatusCode::BAD_REQUEST, "missing connector program");
    };
    let args = request.as_ref().map(|r| r.args.clone()).unwrap_or_default();
    let env: Vec<(String, String)> = request.map(|r| r.env.into_iter().collect()).unwrap_or_default();

    let result = state.connector_manager.start(
        &name,
        &kind,
        volute_engine::ConnectorCommand { program, args },
        &mind.dir,
        mind.port,
        &env,
    );
    match result {
        Ok(()) => Json(json!({ "ok": true })).into_response(),
        Err(e) => err_response(StatusCode::BAD_REQUEST, e.to_string()),
    }
}

fn default_connector_program(state: &AppState, name: &str, kind: &str) -> Option<String> {
    let config = crate::config::MindConfig::load(&state.config.volute_config_path(name)).ok()??;
    config.connectors.get(kind).map(|c| c.program.clone())
}

async fn stop_connector(
    State(state): State<Arc<AppState>>,
    AxumPath((name, kind)): AxumPath<(String, String)>,
) -> Response {
    state.connector_manager.stop(&name, &kind).await;
    Json(json!({ "ok": true })).into_response()
}

#[derive(Deserialize)]
struct TypingRequest {
    channel: String,
}

async fn post_typing(
    State(state): State<Arc<AppState>>,
    AxumPath(name): AxumPath<String>,
    Json(body): Json<TypingRequest>,
) -> Response {
    let Some(port) = state.mind_manager.port_of(&name) else {
        return err_response(StatusCode::NOT_FOUND, "mind is not running");
    };
    match state.mind_client.post_typing(port, &body.channel).await {
        Ok(()) => Json(json!({ "ok": true })).into_response(),
        Err(e) => err_response(StatusCode::BAD_GATEWAY, e),
    }
}

#[derive(Serialize)]
struct LogLine {
    line: String,
}

async fn stream_logs(
    State(state): State<Arc<AppState>>,
) -> Sse<impl Stream<Item = Result<Event, std::convert::Infallible>>> {
    let rx = state.log_broadcaster.subscribe();
    let stream = BroadcastStream::new(rx).filter_map(|line| match line {
        Ok(line) => Event::default().json_data(LogLine { line }).ok().map(Ok),
        Err(_) => None,
    });
    Sse::new(stream).keep_alive(KeepAlive::new().interval(Duration::from_secs(15)))
}
