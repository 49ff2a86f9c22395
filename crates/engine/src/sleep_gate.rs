// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Volute Contributors

//! The seam between DeliveryManager and SleepManager (§4.9 "Sleep
//! integration"). DeliveryManager depends on this trait rather than the
//! concrete `SleepManager` type so the two can be wired together after
//! both are constructed, without a cyclic module dependency: SleepManager
//! needs a concrete `Arc<DeliveryManager>` to flush queued messages on
//! wake, so it cannot itself be a DeliveryManager field at construction
//! time.

use volute_core::InboundMessage;

pub trait SleepGate: Send + Sync {
    fn is_sleeping(&self, mind: &str) -> bool;

    /// Default triggers are DMs and @mentions; additional globs come from
    /// config (§4.10 `checkWakeTrigger`).
    fn check_wake_trigger(&self, mind: &str, message: &InboundMessage) -> Option<String>;

    fn request_wake(&self, mind: &str, trigger: Option<String>);
}

/// No-op gate: nothing is ever asleep. Used as the default before a
/// `SleepManager` is wired in (e.g. in unit tests for DeliveryManager).
pub struct AlwaysAwake;

impl SleepGate for AlwaysAwake {
    fn is_sleeping(&self, _mind: &str) -> bool {
        false
    }

    fn check_wake_trigger(&self, _mind: &str, _message: &InboundMessage) -> Option<String> {
        None
    }

    fn request_wake(&self, _mind: &str, _trigger: Option<String>) {}
}
