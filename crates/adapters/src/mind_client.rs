// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Volute Contributors

//! HTTP client for a mind's local child API (§6 "Mind child HTTP API").

use crate::error::MindClientError;
use serde::Serialize;
use std::time::Duration;
use volute_core::InboundMessage;

#[derive(Debug, Clone, Serialize)]
pub struct MessagePayload<'a> {
    #[serde(flatten)]
    pub inbound: &'a InboundMessage,
    pub session: &'a str,
    #[serde(rename = "autoReply")]
    pub auto_reply: bool,
}

#[derive(Clone)]
pub struct MindClient {
    http: reqwest::Client,
}

impl MindClient {
    pub fn new() -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_default();
        Self { http }
    }

    fn base_url(port: u16) -> String {
        format!("http://127.0.0.1:{port}")
    }

    /// POST `/message` to the mind on `port`. The daemon consumes this
    /// only for system-bootstrap messages (§4.5); connectors consume the
    /// streamed response directly and are out of core scope.
    pub async fn post_message(&self, port: u16, payload: &MessagePayload<'_>) -> Result<(), MindClientError> {
        let url = format!("{}/message", Self::base_url(port));
        let response = self.http.post(&url).json(payload).send().await?;
        if !response.status().is_success() {
            return Err(MindClientError::Status(response.status()));
        }
        Ok(())
    }

    /// POST a forwarded typing indicator to the mind (§6 `/typing`).
    pub async fn post_typing(&self, port: u16, channel: &str) -> Result<(), MindClientError> {
        let url = format!("{}/typing", Self::base_url(port));
        let response = self.http.post(&url).json(&serde_json::json!({ "channel": channel })).send().await?;
        if !response.status().is_success() {
            return Err(MindClientError::Status(response.status()));
        }
        Ok(())
    }

    /// `GET /health`, true on any 2xx (§6).
    pub async fn health(&self, port: u16) -> bool {
        let url = format!("{}/health", Self::base_url(port));
        matches!(self.http.get(&url).timeout(Duration::from_secs(2)).send().await, Ok(r) if r.status().is_success())
    }
}

impl Default for MindClient {
    fn default() -> Self {
        Self::new()
    }
}
