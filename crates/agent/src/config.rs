// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Agent configuration.
//!
//! Loaded from TOML (plus env overrides) by the CLI; everything here has
//! a default so a bare `[agent]` table with a token and endpoint runs.

use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// Which work-solicitation transports a worker runs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TransportMode {
    /// Push stream preferred, poll fallback.
    #[default]
    Both,
    /// Push stream only; stream failure is fatal to the worker.
    StreamOnly,
    /// Poll only.
    NoStream,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Registration token for the orchestration server.
    pub token: String,
    pub endpoint: String,
    pub name: String,
    pub tags: Vec<String>,
    /// How many workers (each its own registered agent) to run.
    pub spawn: usize,
    pub transport: TransportMode,

    /// Command the job runner executes; the job env file path is
    /// appended via `NAVVY_ENV_FILE`.
    pub bootstrap_command: Vec<String>,
    /// Optional hook binary run before the executor.
    pub pre_bootstrap_hook: Option<PathBuf>,

    /// Take exactly this job, run it, exit.
    pub acquire_job: Option<String>,
    pub disconnect_after_job: bool,
    /// Zero disables idle termination.
    #[serde(with = "duration_field")]
    pub disconnect_after_idle_timeout: Duration,
    /// Zero disables the uptime cap.
    #[serde(with = "duration_field")]
    pub disconnect_after_uptime: Duration,

    #[serde(with = "duration_field")]
    pub cancel_grace_period: Duration,
    /// Worker count for the log-chunk uploader pool.
    pub chunk_upload_concurrency: usize,
    /// Total log cap; past it the server may drop chunks.
    pub max_log_bytes: u64,

    /// Step signature verification key; unsigned steps are refused when
    /// set.
    pub verification_key: Option<String>,
    pub allowed_repositories: Vec<String>,
    pub allowed_plugins: Vec<String>,
    /// Glob-style patterns a job env key must match (empty = allow all).
    pub allowed_env: Vec<String>,

    /// Health/metrics listen address; None disables the server.
    pub health_addr: Option<String>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            token: String::new(),
            endpoint: "https://agent.navvy.dev/v3".to_string(),
            name: hostname_or("agent"),
            tags: Vec::new(),
            spawn: 1,
            transport: TransportMode::Both,
            bootstrap_command: vec!["navvy-bootstrap".to_string()],
            pre_bootstrap_hook: None,
            acquire_job: None,
            disconnect_after_job: false,
            disconnect_after_idle_timeout: Duration::ZERO,
            disconnect_after_uptime: Duration::ZERO,
            cancel_grace_period: Duration::from_secs(10),
            chunk_upload_concurrency: 3,
            max_log_bytes: 1024 * 1024 * 1024,
            verification_key: None,
            allowed_repositories: Vec::new(),
            allowed_plugins: Vec::new(),
            allowed_env: Vec::new(),
            health_addr: None,
        }
    }
}

fn hostname_or(fallback: &str) -> String {
    std::env::var("HOSTNAME").unwrap_or_else(|_| fallback.to_string())
}

/// Serde adapter: duration fields take integer seconds or "30s"-style
/// strings.
mod duration_field {
    use navvy_core::parse_duration;
    use serde::{Deserialize, Deserializer};
    use std::time::Duration;

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Seconds(u64),
        Text(String),
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        match Raw::deserialize(d)? {
            Raw::Seconds(secs) => Ok(Duration::from_secs(secs)),
            Raw::Text(text) => parse_duration(&text).map_err(serde::de::Error::custom),
        }
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
