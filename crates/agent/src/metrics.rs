// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-process metrics registry.
//!
//! Injected by the supervisor so nothing in the control plane touches
//! global state; the HTTP surface renders it at `GET /metrics`.

use prometheus::{Encoder, IntCounter, IntGauge, Registry, TextEncoder};

// Metric constructors only fail on malformed names; ours are static.
#[allow(clippy::expect_used)]
fn counter(name: &str, help: &str) -> IntCounter {
    IntCounter::new(name, help).expect("static metric name")
}

#[allow(clippy::expect_used)]
fn gauge(name: &str, help: &str) -> IntGauge {
    IntGauge::new(name, help).expect("static metric name")
}

#[derive(Clone)]
pub struct AgentMetrics {
    registry: Registry,
    pub jobs_started: IntCounter,
    pub jobs_finished: IntCounter,
    pub chunks_uploaded: IntCounter,
    pub chunks_failed: IntCounter,
    pub busy_workers: IntGauge,
}

impl AgentMetrics {
    pub fn new() -> Self {
        let registry = Registry::new();
        let jobs_started = counter("navvy_jobs_started_total", "Jobs handed to the runner");
        let jobs_finished = counter("navvy_jobs_finished_total", "Jobs reported finished");
        let chunks_uploaded = counter("navvy_log_chunks_uploaded_total", "Log chunks delivered");
        let chunks_failed = counter("navvy_log_chunks_failed_total", "Log chunk upload failures");
        let busy_workers = gauge("navvy_busy_workers", "Workers currently running a job");

        for metric in [&jobs_started, &jobs_finished, &chunks_uploaded, &chunks_failed] {
            let _ = registry.register(Box::new(metric.clone()));
        }
        let _ = registry.register(Box::new(busy_workers.clone()));

        Self { registry, jobs_started, jobs_finished, chunks_uploaded, chunks_failed, busy_workers }
    }

    /// Standard Prometheus text exposition.
    pub fn render(&self) -> String {
        let mut buf = Vec::new();
        let encoder = TextEncoder::new();
        if encoder.encode(&self.registry.gather(), &mut buf).is_err() {
            return String::new();
        }
        String::from_utf8(buf).unwrap_or_default()
    }
}

impl Default for AgentMetrics {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
#[path = "metrics_tests.rs"]
mod tests;
