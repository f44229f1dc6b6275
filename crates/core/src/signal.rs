// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Signal-reason taxonomy reported on job finish.

use serde::{Deserialize, Serialize};

/// Why a job ended the way it did, surfaced to the server on `finish`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalReason {
    /// Normal exit.
    #[default]
    #[serde(rename = "")]
    None,
    /// Pre-run validation or the pre-bootstrap hook rejected the job.
    AgentRefused,
    /// The step signature did not verify.
    SignatureRejected,
    /// The executor never ran.
    ProcessRunError,
    /// Server-initiated cancellation.
    Cancel,
    /// Agent-initiated graceful shutdown mid-job.
    AgentStop,
}

crate::simple_display! {
    SignalReason {
        None => "",
        AgentRefused => "agent_refused",
        SignatureRejected => "signature_rejected",
        ProcessRunError => "process_run_error",
        Cancel => "cancel",
        AgentStop => "agent_stop",
    }
}

#[cfg(test)]
#[path = "signal_tests.rs"]
mod tests;
