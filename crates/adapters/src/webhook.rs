// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Volute Contributors

//! Optional webhook forwarder: subscribes to the activity bus and POSTs
//! every event to an external URL with bearer-token auth (§4.2). Runs
//! detached so a slow or unreachable endpoint never backs up the bus.

use crate::activity_bus::ActivityBus;
use std::time::Duration;

pub struct WebhookForwarder;

impl WebhookForwarder {
    /// Spawn the forwarder task. Returns immediately; the task runs until
    /// the bus (and every other sender clone) is dropped.
    pub fn spawn(bus: &ActivityBus, url: String, token: String) {
        let mut rx = bus.subscribe();
        tokio::spawn(async move {
            let http = reqwest::Client::builder().timeout(Duration::from_secs(10)).build().unwrap_or_default();
            loop {
                match rx.recv().await {
                    Ok(event) => {
                        let result = http.post(&url).bearer_auth(&token).json(&event).send().await;
                        match result {
                            Ok(resp) if !resp.status().is_success() => {
                                tracing::warn!(status = %resp.status(), url = %url, "webhook forward rejected");
                            }
                            Err(e) => {
                                tracing::warn!(error = %e, url = %url, "webhook forward failed");
                            }
                            Ok(_) => {}
                        }
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "webhook forwarder lagged behind activity bus");
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                }
            }
        });
    }
}
