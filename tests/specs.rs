// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Volute Contributors

//! Workspace-level black-box specs: drive the real `voluted` binary over
//! HTTP against an isolated state directory, the way an operator or
//! connector would.

#[path = "support/harness.rs"]
mod harness;

mod specs {
    mod daemon {
        #[path = "connectors.rs"]
        mod connectors;
        #[path = "lifecycle.rs"]
        mod lifecycle;
        #[path = "messaging.rs"]
        mod messaging;
    }
}
