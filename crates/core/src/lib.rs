// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Volute Contributors

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! volute-core: shared data model for the Volute supervisor.
//!
//! This crate is pure — no filesystem, network, or process I/O. It defines
//! the types every other crate agrees on: mind records, routing
//! configuration, schedules, session activity, sleep state, and the
//! activity-event sum type.

pub mod clock;
pub mod delivery;
pub mod event;
pub mod glob;
pub mod id;
pub mod mind;
pub mod restart;
pub mod routing;
pub mod schedule;
pub mod session;
pub mod sleep;

pub use clock::{Clock, FakeClock, SystemClock};
pub use delivery::{ContentPart, InboundMessage, QueuedMessage, QueueStatus};
pub use event::ActivityEvent;
pub use id::{new_id, short_id};
pub use mind::{isolation_user, Mind, MindKey, Stage};
pub use restart::{RestartDecision, RestartPolicy};
pub use routing::{
    BatchDelivery, BatchSpec, Delivery, DeliveryMode, Destination, RouteDecision, RouteMode,
    RoutingConfig, RoutingRule, RuleMode, SessionConfig,
};
pub use schedule::{Schedule, ScheduleTarget};
pub use session::SessionActivity;
pub use sleep::{SleepConfig, SleepState};
