// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Agent registration record.

use crate::id::AgentId;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// What the server hands back from `register`.
///
/// Immutable after registration except for `endpoint` and
/// `request_headers`, which a later ping response may rewrite.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentRegistration {
    pub uuid: AgentId,
    pub name: String,
    pub access_token: String,
    #[serde(default = "default_interval")]
    pub ping_interval: u64,
    #[serde(default = "default_interval")]
    pub heartbeat_interval: u64,
    #[serde(default = "default_interval")]
    pub job_status_interval: u64,
    pub endpoint: String,
    #[serde(default)]
    pub request_headers: HashMap<String, String>,
}

fn default_interval() -> u64 {
    1
}

impl AgentRegistration {
    /// Clamp the server-supplied intervals to the protocol minimum of one
    /// second. A zero interval would turn the ping loop into a busy spin.
    pub fn normalized(mut self) -> Self {
        self.ping_interval = self.ping_interval.max(1);
        self.heartbeat_interval = self.heartbeat_interval.max(1);
        self.job_status_interval = self.job_status_interval.max(1);
        self
    }
}

crate::builder! {
    pub struct AgentRegistrationBuilder => AgentRegistration {
        into {
            uuid: AgentId = "fakeuuid",
            name: String = "test-agent",
            access_token: String = "llamas",
            endpoint: String = "http://127.0.0.1:0",
        }
        set {
            ping_interval: u64 = 1,
            heartbeat_interval: u64 = 60,
            job_status_interval: u64 = 1,
            request_headers: HashMap<String, String> = HashMap::new(),
        }
    }
}

#[cfg(test)]
#[path = "agent_tests.rs"]
mod tests;
