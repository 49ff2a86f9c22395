// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Volute Contributors

//! Inbound message shapes (§6 message body schema) and the durable
//! delivery queue record used while a mind is asleep (§3 "Delivery queue").

use serde::{Deserialize, Serialize};

/// One part of an inbound message's content array.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    Text { text: String },
    Image { url: String },
}

/// An inbound message as delivered by a connector, prior to routing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboundMessage {
    pub content: Vec<ContentPart>,
    pub channel: String,
    #[serde(default)]
    pub sender: Option<String>,
    #[serde(default)]
    pub platform: Option<String>,
    #[serde(default, rename = "isDM")]
    pub is_dm: bool,
    #[serde(default, rename = "channelName")]
    pub channel_name: Option<String>,
    #[serde(default, rename = "serverName")]
    pub server_name: Option<String>,
    #[serde(default, rename = "participantCount")]
    pub participant_count: Option<u32>,
}

impl InboundMessage {
    /// Concatenate every text part, ignoring images, for mention matching
    /// and batch-trigger scanning (§4.8, §4.9).
    pub fn text(&self) -> String {
        self.content
            .iter()
            .filter_map(|part| match part {
                ContentPart::Text { text } => Some(text.as_str()),
                ContentPart::Image { .. } => None,
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Queue status of a held message, persisted in the durable
/// `delivery_queue` table while a mind sleeps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum QueueStatus {
    SleepQueued,
    Delivered,
    Discarded,
}

/// A message held in the durable delivery queue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueuedMessage {
    pub id: String,
    pub mind: String,
    pub session: String,
    pub channel: String,
    #[serde(default)]
    pub sender: Option<String>,
    pub status: QueueStatus,
    pub payload: InboundMessage,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_joins_only_text_parts() {
        let msg = InboundMessage {
            content: vec![
                ContentPart::Text { text: "hello".into() },
                ContentPart::Image { url: "http://x/y.png".into() },
                ContentPart::Text { text: "world".into() },
            ],
            channel: "discord:1".into(),
            sender: None,
            platform: None,
            is_dm: false,
            channel_name: None,
            server_name: None,
            participant_count: None,
        };
        assert_eq!(msg.text(), "hello\nworld");
    }

    #[test]
    fn queue_status_round_trips_as_kebab_case() {
        let json = serde_json::to_string(&QueueStatus::SleepQueued).unwrap();
        assert_eq!(json, "\"sleep-queued\"");
    }
}
