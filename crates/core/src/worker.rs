// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Worker state taxonomy.

use serde::{Deserialize, Serialize};

/// What a single worker is doing right now.
///
/// Invariant: `Busy` iff a current job id is set.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerPhase {
    #[default]
    Idle,
    Busy,
}

crate::simple_display! {
    WorkerPhase {
        Idle => "idle",
        Busy => "busy",
    }
}

/// Pool-level liveness classification.
///
/// Workers start `Initializing` (never explicitly marked), move between
/// `Busy` and `Idle` while running, and end `Dead`. Dead is absorbing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerHealth {
    Initializing,
    Busy,
    Idle,
    Dead,
}

crate::simple_display! {
    WorkerHealth {
        Initializing => "initializing",
        Busy => "busy",
        Idle => "idle",
        Dead => "dead",
    }
}
