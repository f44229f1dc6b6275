// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn counters_show_up_in_the_exposition() {
    let metrics = AgentMetrics::new();
    metrics.jobs_started.inc();
    metrics.jobs_finished.inc();
    metrics.busy_workers.set(2);

    let text = metrics.render();
    assert!(text.contains("navvy_jobs_started_total 1"));
    assert!(text.contains("navvy_jobs_finished_total 1"));
    assert!(text.contains("navvy_busy_workers 2"));
}

#[test]
fn clones_share_the_registry() {
    let metrics = AgentMetrics::new();
    let clone = metrics.clone();
    clone.chunks_failed.inc();
    assert!(metrics.render().contains("navvy_log_chunks_failed_total 1"));
}
