// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Server-directed actions.
//!
//! A ping (poll or push) yields at most one action per cycle. The empty
//! string on the wire means "carry on"; a job assignment is implicit in
//! the presence of a job record alongside the action.

use serde::{Deserialize, Serialize};

/// A directive from the server.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    /// Continue as-is (wire spelling: empty string).
    #[default]
    #[serde(rename = "")]
    Continue,
    /// Hold work solicitation without disconnecting.
    Pause,
    /// Stop this worker.
    Disconnect,
    /// Explicit no-work marker from the push stream.
    Idle,
}

impl Action {
    pub fn is_pause(&self) -> bool {
        matches!(self, Action::Pause)
    }

    pub fn is_disconnect(&self) -> bool {
        matches!(self, Action::Disconnect)
    }
}

crate::simple_display! {
    Action {
        Continue => "",
        Pause => "pause",
        Disconnect => "disconnect",
        Idle => "idle",
    }
}

#[cfg(test)]
#[path = "action_tests.rs"]
mod tests;
