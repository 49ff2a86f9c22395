//! Daemon lifecycle specs
//!
//! Verify daemon startup publishes a reachable `daemon.json`, the HTTP
//! API rejects unauthenticated and wrongly-authenticated requests, and
//! mind start/stop round-trips through the registry.

use crate::harness::{wait_for, DaemonHarness, WAIT_MAX_MS};

#[tokio::test]
async fn daemon_json_reflects_bound_port_and_accepts_its_own_token() {
    let harness = DaemonHarness::start();
    assert!(harness.port > 0, "daemon should have bound a real port");

    let response = harness.post_no_body("/api/minds/nope/start").await;
    // Unknown mind, but the token was accepted -- proves auth succeeded.
    assert_ne!(response.status(), reqwest::StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn requests_without_a_bearer_token_are_rejected() {
    let harness = DaemonHarness::start();
    let client = reqwest::Client::new();
    let response = client
        .post(format!("{}/api/minds/nope/start", harness.base_url))
        .send()
        .await
        .expect("request to daemon");
    assert_eq!(response.status(), reqwest::StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn requests_with_the_wrong_bearer_token_are_rejected() {
    let harness = DaemonHarness::start();
    let client = reqwest::Client::new();
    let response = client
        .post(format!("{}/api/minds/nope/start", harness.base_url))
        .bearer_auth("not-the-token")
        .send()
        .await
        .expect("request to daemon");
    assert_eq!(response.status(), reqwest::StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn starting_an_unknown_mind_fails_without_touching_anything() {
    let harness = DaemonHarness::start();
    let response = harness.post_no_body("/api/minds/ghost/start").await;
    assert_eq!(response.status(), reqwest::StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn start_stop_round_trip_flips_registry_running_state() {
    let harness = DaemonHarness::start();
    harness.register_mind("alfred");

    let start = harness.post_no_body("/api/minds/alfred/start").await;
    assert!(start.status().is_success(), "start should succeed: {:?}", start.status());

    let registry_path = harness.dir.path().join("registry.json");
    let running = wait_for(WAIT_MAX_MS, || {
        let raw = std::fs::read_to_string(&registry_path).unwrap_or_default();
        raw.contains("\"running\": true") || raw.contains("\"running\":true")
    });
    assert!(running, "registry should mark the mind running after start");

    let stop = harness.post_no_body("/api/minds/alfred/stop").await;
    assert!(stop.status().is_success());

    let stopped = wait_for(WAIT_MAX_MS, || {
        let raw = std::fs::read_to_string(&registry_path).unwrap_or_default();
        raw.contains("\"running\": false") || raw.contains("\"running\":false")
    });
    assert!(stopped, "registry should mark the mind stopped after stop");
}

#[tokio::test]
async fn restarting_a_running_mind_keeps_it_running() {
    let harness = DaemonHarness::start();
    harness.register_mind("recovery");

    let start = harness.post_no_body("/api/minds/recovery/start").await;
    assert!(start.status().is_success());

    let restart = harness.post_no_body("/api/minds/recovery/restart").await;
    assert!(restart.status().is_success(), "restart should succeed: {:?}", restart.status());
}
