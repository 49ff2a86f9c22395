// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Volute Contributors

//! Activity bus event types (§4.2).
//!
//! `ActivityEvent` is published synchronously by MindManager, Scheduler, and
//! DeliveryManager and fanned out to subscribers (daemon SSE stream,
//! optional webhook forwarder). Publishing must never block on a slow
//! subscriber.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ActivityEvent {
    MindStarted { mind: String, at: DateTime<Utc> },
    MindStopped { mind: String, at: DateTime<Utc>, reason: String },
    MindActive { mind: String, session: String, at: DateTime<Utc> },
    MindIdle { mind: String, session: String, at: DateTime<Utc> },
    MindDone { mind: String, session: String, at: DateTime<Utc> },
    ScheduleChanged { mind: String, schedule_id: String, at: DateTime<Utc> },
}

impl ActivityEvent {
    pub fn mind(&self) -> &str {
        match self {
            ActivityEvent::MindStarted { mind, .. }
            | ActivityEvent::MindStopped { mind, .. }
            | ActivityEvent::MindActive { mind, .. }
            | ActivityEvent::MindIdle { mind, .. }
            | ActivityEvent::MindDone { mind, .. }
            | ActivityEvent::ScheduleChanged { mind, .. } => mind,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_with_type_tag() {
        let ev = ActivityEvent::MindStarted { mind: "alpha".into(), at: Utc::now() };
        let json = serde_json::to_value(&ev).unwrap();
        assert_eq!(json["type"], "mind_started");
        assert_eq!(json["mind"], "alpha");
    }

    #[test]
    fn mind_accessor_covers_all_variants() {
        let ev = ActivityEvent::ScheduleChanged {
            mind: "beta".into(),
            schedule_id: "s1".into(),
            at: Utc::now(),
        };
        assert_eq!(ev.mind(), "beta");
    }
}
