// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Volute Contributors

//! Routing configuration types (`routes.json`, §6) and the pure routing
//! decision returned by `DeliveryRouter` (§4.8).

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// One entry in `rules`: matched in declaration order against the inbound
/// channel, case-insensitively, via glob (`*`, `?`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutingRule {
    pub channel: String,
    #[serde(default)]
    pub session: Option<String>,
    #[serde(default)]
    pub destination: Option<Destination>,
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default)]
    pub mode: Option<RuleMode>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Destination {
    Mind,
    File,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleMode {
    Mention,
    All,
}

/// Debounce/max-wait/trigger configuration for batch delivery.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct BatchSpec {
    #[serde(default)]
    pub debounce: Option<f64>,
    #[serde(default, rename = "maxWait")]
    pub max_wait: Option<f64>,
    #[serde(default)]
    pub triggers: Vec<String>,
}

impl BatchSpec {
    /// A batch spec with no debounce, max-wait, or triggers behaves as a
    /// pass-through: flush immediately (§4.9 point 4).
    pub fn is_pass_through(&self) -> bool {
        self.debounce.is_none() && self.max_wait.is_none() && self.triggers.is_empty()
    }
}

/// A session's delivery mode: either a bare keyword or a structured batch
/// spec, per the `routes.json` schema (`"immediate" | "batch" | BatchSpec`).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum Delivery {
    Keyword(DeliveryMode),
    Batch(BatchDelivery),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryMode {
    Immediate,
    Batch,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BatchDelivery {
    pub mode: DeliveryMode,
    #[serde(flatten)]
    pub spec: BatchSpec,
}

/// Per-session configuration under `sessions`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionConfig {
    #[serde(default)]
    pub delivery: Option<Delivery>,
    #[serde(default)]
    pub instructions: Option<String>,
    #[serde(default, rename = "autoReply")]
    pub auto_reply: bool,
}

impl SessionConfig {
    /// Resolve this session's effective batch spec, if delivery is
    /// configured as batch. `None` means immediate delivery (§4.8 "Mode
    /// resolution").
    pub fn batch_spec(&self) -> Option<BatchSpec> {
        match &self.delivery {
            Some(Delivery::Keyword(DeliveryMode::Batch)) => Some(BatchSpec::default()),
            Some(Delivery::Keyword(DeliveryMode::Immediate)) => None,
            Some(Delivery::Batch(b)) if b.mode == DeliveryMode::Batch => Some(b.spec.clone()),
            Some(Delivery::Batch(_)) => None,
            None => None,
        }
    }
}

/// The full per-mind `routes.json` document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutingConfig {
    #[serde(default)]
    pub rules: Vec<RoutingRule>,
    #[serde(default)]
    pub sessions: HashMap<String, SessionConfig>,
    pub default: String,
    #[serde(default = "default_gate_unmatched")]
    #[serde(rename = "gateUnmatched")]
    pub gate_unmatched: bool,
}

fn default_gate_unmatched() -> bool {
    true
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self { rules: Vec::new(), sessions: HashMap::new(), default: "main".to_string(), gate_unmatched: true }
    }
}

/// Outcome of `DeliveryRouter::route` (§4.8), pure-in-config.
#[derive(Debug, Clone, PartialEq)]
pub enum RouteDecision {
    NotRouted { reason: &'static str },
    File { path: String },
    ToMind { session: String, mode: RouteMode },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteMode {
    Immediate,
    Batch,
    Gated,
}
