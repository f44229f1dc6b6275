// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Job record and server-side job state.

use crate::id::JobId;
use crate::signal::SignalReason;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Default per-chunk limit when the server does not supply one.
pub const DEFAULT_CHUNK_BYTES: u64 = 100 * 1024;

/// The command a job executes, with everything the agent validates
/// before letting it near the executor.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepDescriptor {
    #[serde(default)]
    pub command: String,
    #[serde(default)]
    pub plugins: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repository: Option<String>,
    /// Keyed digest over the canonical step payload, present when the
    /// pipeline was signed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
}

/// One unit of work, owned by exactly one job runner between
/// accept/acquire and finish.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    #[serde(default)]
    pub token: String,
    #[serde(default)]
    pub env: HashMap<String, String>,
    #[serde(default)]
    pub step: StepDescriptor,
    #[serde(default = "default_chunk_bytes")]
    pub chunks_max_size_bytes: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub runnable_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exit_status: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signal: Option<String>,
    #[serde(default)]
    pub signal_reason: SignalReason,
    #[serde(default)]
    pub chunks_failed_count: u64,
}

fn default_chunk_bytes() -> u64 {
    DEFAULT_CHUNK_BYTES
}

/// Server-side job lifecycle state, polled to detect cancellation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Pending,
    Scheduled,
    Running,
    Canceling,
    Canceled,
    Finished,
}

impl JobState {
    /// True when the server wants the running job stopped.
    pub fn wants_cancel(&self) -> bool {
        matches!(self, JobState::Canceling | JobState::Canceled)
    }
}

crate::simple_display! {
    JobState {
        Pending => "pending",
        Scheduled => "scheduled",
        Running => "running",
        Canceling => "canceling",
        Canceled => "canceled",
        Finished => "finished",
    }
}

crate::builder! {
    pub struct JobBuilder => Job {
        into {
            id: JobId = "job-1",
            token: String = "job-token",
        }
        set {
            env: HashMap<String, String> = HashMap::new(),
            step: StepDescriptor = StepDescriptor::default(),
            chunks_max_size_bytes: u64 = DEFAULT_CHUNK_BYTES,
            runnable_at: Option<DateTime<Utc>> = None,
            started_at: Option<DateTime<Utc>> = None,
            finished_at: Option<DateTime<Utc>> = None,
            exit_status: Option<i32> = None,
            signal: Option<String> = None,
            signal_reason: SignalReason = SignalReason::None,
            chunks_failed_count: u64 = 0,
        }
    }
}

#[cfg(test)]
#[path = "job_tests.rs"]
mod tests;
