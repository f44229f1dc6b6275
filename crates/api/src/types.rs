// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Wire DTOs for the REST surface.

use navvy_core::{Action, Job, JobState};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Body of `POST /ping`'s response.
///
/// `endpoint` and `request_headers`, when present, redirect the agent;
/// callers must probe-validate an endpoint change before adopting it.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PingResponse {
    #[serde(default)]
    pub action: Action,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub job: Option<Job>,
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default)]
    pub request_headers: Option<HashMap<String, String>>,
}

/// One heartbeat round trip.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Heartbeat {
    pub sent_at: String,
    #[serde(default)]
    pub received_at: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct JobStateResponse {
    pub state: JobState,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DisconnectResponse {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub connection_state: String,
}

/// Fields the agent submits at registration time.
#[derive(Debug, Clone, Serialize)]
pub struct RegisterRequest {
    pub name: String,
    pub hostname: String,
    pub version: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
}

#[cfg(test)]
#[path = "types_tests.rs"]
mod tests;
