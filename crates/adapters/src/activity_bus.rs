// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Volute Contributors

//! In-process activity pub/sub (§4.2).
//!
//! Backed by `tokio::sync::broadcast` rather than callback lists: publish
//! is a non-blocking channel send (a lagging subscriber drops old events
//! instead of stalling the publisher), and `subscribe()` returning an
//! owned `Receiver` is the unsubscribe handle — dropping it detaches.

use tokio::sync::broadcast;
use volute_core::ActivityEvent;

const DEFAULT_CAPACITY: usize = 256;

#[derive(Clone)]
pub struct ActivityBus {
    tx: broadcast::Sender<ActivityEvent>,
}

impl ActivityBus {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Publish an event. Never blocks: with no subscribers this is a
    /// no-op; publish failures are not fatal to the caller (§4.2).
    pub fn publish(&self, event: ActivityEvent) {
        if self.tx.send(event).is_err() {
            tracing::trace!("activity bus publish with no subscribers");
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ActivityEvent> {
        self.tx.subscribe()
    }
}

impl Default for ActivityBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use volute_core::ActivityEvent;

    #[tokio::test]
    async fn subscribers_receive_events_in_publish_order() {
        let bus = ActivityBus::new();
        let mut rx = bus.subscribe();

        bus.publish(ActivityEvent::MindStarted { mind: "alpha".into(), at: chrono::Utc::now() });
        bus.publish(ActivityEvent::MindStopped {
            mind: "alpha".into(),
            at: chrono::Utc::now(),
            reason: "stop".into(),
        });

        let first = rx.recv().await.unwrap();
        let second = rx.recv().await.unwrap();
        assert!(matches!(first, ActivityEvent::MindStarted { .. }));
        assert!(matches!(second, ActivityEvent::MindStopped { .. }));
    }

    #[test]
    fn publish_with_no_subscribers_does_not_panic() {
        let bus = ActivityBus::new();
        bus.publish(ActivityEvent::MindStarted { mind: "alpha".into(), at: chrono::Utc::now() });
    }
}
