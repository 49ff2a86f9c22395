//! Connector start/stop specs
//!
//! Verify `/api/minds/{name}/connectors/{kind}` spawns and tears down a
//! connector subprocess for a running mind.

use crate::harness::DaemonHarness;

#[tokio::test]
async fn connector_start_and_stop_round_trip() {
    let harness = DaemonHarness::start();
    harness.register_mind("connected");

    let start_mind = harness.post_no_body("/api/minds/connected/start").await;
    assert!(start_mind.status().is_success(), "mind start should succeed: {:?}", start_mind.status());

    let body = serde_json::json!({ "program": "sleep", "args": ["5"] });
    let start_connector = harness.post("/api/minds/connected/connectors/discord", body).await;
    assert!(
        start_connector.status().is_success(),
        "connector start should succeed: {:?}",
        start_connector.status()
    );

    let stop_connector = harness.delete("/api/minds/connected/connectors/discord").await;
    assert!(stop_connector.status().is_success(), "connector stop should succeed");
}

#[tokio::test]
async fn connector_start_without_a_program_is_rejected() {
    let harness = DaemonHarness::start();
    harness.register_mind("unconnected");

    let start_mind = harness.post_no_body("/api/minds/unconnected/start").await;
    assert!(start_mind.status().is_success());

    let response = harness.post("/api/minds/unconnected/connectors/discord", serde_json::json!({})).await;
    assert_eq!(response.status(), reqwest::StatusCode::BAD_REQUEST);
}
