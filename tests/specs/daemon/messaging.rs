//! Message routing and typing-forward specs
//!
//! Verify that a started mind actually receives immediate-mode messages
//! on its child HTTP API, and that `/typing` is forwarded the same way.

use crate::harness::{read_lines, wait_for, DaemonHarness, WAIT_MAX_MS};

const IMMEDIATE_ROUTES: &str = r#"{
    "rules": [],
    "sessions": {},
    "default": "main",
    "gateUnmatched": false
}"#;

async fn start_mind_with_immediate_routing(harness: &DaemonHarness, name: &str) {
    harness.register_mind(name);
    std::fs::write(harness.mind_home_dir(name).join("routes.json"), IMMEDIATE_ROUTES)
        .expect("write routes.json");

    let start = harness.post_no_body(&format!("/api/minds/{name}/start")).await;
    assert!(start.status().is_success(), "start should succeed: {:?}", start.status());
}

#[tokio::test]
async fn immediate_message_reaches_the_mind_child_api() {
    let harness = DaemonHarness::start();
    start_mind_with_immediate_routing(&harness, "alfred").await;

    let body = serde_json::json!({
        "content": [{ "type": "text", "text": "hello there" }],
        "channel": "general",
    });
    let response = harness.post("/api/minds/alfred/message", body).await;
    assert!(response.status().is_success(), "message post should succeed: {:?}", response.status());

    let log_path = harness.mind_log_path("alfred");
    let delivered = wait_for(WAIT_MAX_MS, || !read_lines(&log_path).is_empty());
    assert!(delivered, "stub mind should have received the message");

    let lines = read_lines(&log_path);
    assert_eq!(lines.len(), 1);
    assert!(lines[0].contains("hello there"));
    assert!(lines[0].contains("\"channel\":\"general\""));
}

#[tokio::test]
async fn message_to_a_stopped_mind_is_rejected() {
    let harness = DaemonHarness::start();
    harness.register_mind("dormant");

    let body = serde_json::json!({
        "content": [{ "type": "text", "text": "anyone home" }],
        "channel": "general",
    });
    let response = harness.post("/api/minds/dormant/message", body).await;
    assert_eq!(response.status(), reqwest::StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn typing_indicator_is_forwarded_to_a_running_mind() {
    let harness = DaemonHarness::start();
    start_mind_with_immediate_routing(&harness, "typist").await;

    let body = serde_json::json!({ "channel": "general" });
    let response = harness.post("/api/minds/typist/typing", body).await;
    assert!(response.status().is_success(), "typing forward should succeed: {:?}", response.status());
}

#[tokio::test]
async fn typing_indicator_to_a_stopped_mind_is_not_found() {
    let harness = DaemonHarness::start();
    harness.register_mind("sleeping");

    let body = serde_json::json!({ "channel": "general" });
    let response = harness.post("/api/minds/sleeping/typing", body).await;
    assert_eq!(response.status(), reqwest::StatusCode::NOT_FOUND);
}
