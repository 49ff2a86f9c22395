// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Volute Contributors

//! `DeliveryRouter`: a pure function from `(routing config, message)` to a
//! routing decision (§4.8). No state, no I/O — safe to call repeatedly
//! and in tests without a runtime.

use volute_core::{
    glob::glob_match, new_id, short_id, Delivery, DeliveryMode, Destination, InboundMessage,
    RouteDecision, RouteMode, RoutingConfig, RoutingRule, RuleMode,
};

/// Route `message` addressed to `mind_name` through `config` (§4.8).
/// Pure-in-config: the same `(config, message)` pair always yields the
/// same decision (§8 law), except for the `$new` session which mints a
/// fresh name per call by design.
pub fn route(config: &RoutingConfig, mind_name: &str, message: &InboundMessage) -> RouteDecision {
    let matched = config.rules.iter().find(|rule| glob_match(&rule.channel, &message.channel));

    let Some(rule) = matched else {
        return if config.gate_unmatched {
            RouteDecision::ToMind { session: config.default.clone(), mode: RouteMode::Gated }
        } else {
            let mode = resolve_mode(config, &config.default);
            RouteDecision::ToMind { session: config.default.clone(), mode }
        };
    };

    if let Some(RuleMode::Mention) = rule.mode {
        if !mentions(&message.text(), mind_name) {
            return RouteDecision::NotRouted { reason: "mention-filtered" };
        }
    }

    if rule.destination == Some(Destination::File) {
        let path = rule.path.clone().unwrap_or_else(|| "inbox/messages.md".to_string());
        return RouteDecision::File { path };
    }

    let session = resolve_session(rule, config);
    let mode = resolve_mode(config, &session);
    RouteDecision::ToMind { session, mode }
}

fn resolve_session(rule: &RoutingRule, config: &RoutingConfig) -> String {
    match rule.session.as_deref() {
        Some("$new") => format!("new-{}", short_id(&new_id())),
        Some(named) => named.to_string(),
        None => config.default.clone(),
    }
}

fn resolve_mode(config: &RoutingConfig, session: &str) -> RouteMode {
    match config.sessions.get(session).and_then(|s| s.batch_spec()) {
        Some(_) => RouteMode::Batch,
        None => RouteMode::Immediate,
    }
}

/// Explicit `"immediate"` bypasses batching even if a `BatchSpec` is
/// configured (§4.8 "Mode resolution").
pub fn session_has_explicit_immediate(config: &RoutingConfig, session: &str) -> bool {
    matches!(config.sessions.get(session).and_then(|s| s.delivery.as_ref()), Some(Delivery::Keyword(DeliveryMode::Immediate)))
}

fn mentions(text: &str, mind_name: &str) -> bool {
    let text = text.to_lowercase();
    let name = mind_name.to_lowercase();
    text.contains(&format!("@{name}")) || text.contains(&name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use volute_core::{BatchDelivery, BatchSpec, ContentPart, SessionConfig};

    fn text_message(channel: &str, sender: &str, text: &str) -> InboundMessage {
        InboundMessage {
            content: vec![ContentPart::Text { text: text.to_string() }],
            channel: channel.to_string(),
            sender: Some(sender.to_string()),
            platform: None,
            is_dm: false,
            channel_name: None,
            server_name: None,
            participant_count: None,
        }
    }

    #[test]
    fn wildcard_rule_routes_to_session() {
        let config = RoutingConfig {
            rules: vec![RoutingRule {
                channel: "discord:*".into(),
                session: Some("discord".into()),
                destination: None,
                path: None,
                mode: None,
            }],
            sessions: HashMap::new(),
            default: "main".into(),
            gate_unmatched: true,
        };
        let msg = text_message("discord:123", "alice", "hi");
        let decision = route(&config, "alpha", &msg);
        assert_eq!(decision, RouteDecision::ToMind { session: "discord".into(), mode: RouteMode::Immediate });
    }

    #[test]
    fn mention_mode_filters_unmentioned_messages() {
        let config = RoutingConfig {
            rules: vec![RoutingRule {
                channel: "discord:*".into(),
                session: Some("discord".into()),
                destination: None,
                path: None,
                mode: Some(RuleMode::Mention),
            }],
            sessions: HashMap::new(),
            default: "main".into(),
            gate_unmatched: true,
        };
        let msg = text_message("discord:123", "alice", "just chatting");
        assert_eq!(route(&config, "alpha", &msg), RouteDecision::NotRouted { reason: "mention-filtered" });

        let mentioning = text_message("discord:123", "alice", "hey @alpha");
        assert!(matches!(route(&config, "alpha", &mentioning), RouteDecision::ToMind { .. }));
    }

    #[test]
    fn unmatched_channel_is_gated_by_default() {
        let config = RoutingConfig { rules: vec![], sessions: HashMap::new(), default: "main".into(), gate_unmatched: true };
        let msg = text_message("unknown:1", "alice", "hi");
        assert_eq!(route(&config, "alpha", &msg), RouteDecision::ToMind { session: "main".into(), mode: RouteMode::Gated });
    }

    #[test]
    fn unmatched_channel_falls_through_to_default_when_not_gated() {
        let config = RoutingConfig { rules: vec![], sessions: HashMap::new(), default: "main".into(), gate_unmatched: false };
        let msg = text_message("unknown:1", "alice", "hi");
        assert_eq!(route(&config, "alpha", &msg), RouteDecision::ToMind { session: "main".into(), mode: RouteMode::Immediate });
    }

    #[test]
    fn file_destination_routes_to_path() {
        let config = RoutingConfig {
            rules: vec![RoutingRule {
                channel: "logs:*".into(),
                session: None,
                destination: Some(Destination::File),
                path: Some("inbox/logs.md".into()),
                mode: None,
            }],
            sessions: HashMap::new(),
            default: "main".into(),
            gate_unmatched: true,
        };
        let msg = text_message("logs:1", "system", "entry");
        assert_eq!(route(&config, "alpha", &msg), RouteDecision::File { path: "inbox/logs.md".into() });
    }

    #[test]
    fn new_session_token_mints_distinct_names_per_call() {
        let config = RoutingConfig {
            rules: vec![RoutingRule {
                channel: "dm:*".into(),
                session: Some("$new".into()),
                destination: None,
                path: None,
                mode: None,
            }],
            sessions: HashMap::new(),
            default: "main".into(),
            gate_unmatched: true,
        };
        let msg = text_message("dm:1", "alice", "hi");
        let first = route(&config, "alpha", &msg);
        let second = route(&config, "alpha", &msg);
        assert_ne!(first, second);
    }

    #[test]
    fn batch_session_config_upgrades_mode() {
        let mut sessions = HashMap::new();
        sessions.insert(
            "discord".to_string(),
            SessionConfig {
                delivery: Some(Delivery::Batch(BatchDelivery {
                    mode: DeliveryMode::Batch,
                    spec: BatchSpec { debounce: Some(60.0), max_wait: None, triggers: vec![] },
                })),
                instructions: None,
                auto_reply: false,
            },
        );
        let config = RoutingConfig {
            rules: vec![RoutingRule {
                channel: "discord:*".into(),
                session: Some("discord".into()),
                destination: None,
                path: None,
                mode: None,
            }],
            sessions,
            default: "main".into(),
            gate_unmatched: true,
        };
        let msg = text_message("discord:1", "alice", "hi");
        assert_eq!(route(&config, "alpha", &msg), RouteDecision::ToMind { session: "discord".into(), mode: RouteMode::Batch });
    }
}
