// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The action handler: sole consumer of action messages and sole
//! mutator of the worker's busy/idle state.

use super::{ActionMessage, ActionOutcome, WorkerInner};
use crate::error::AgentError;
use crate::runner::{JobRunner, RunnerConfig};
use navvy_api::ControlApi;
use navvy_core::{Job, WorkerPhase};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;

pub(crate) async fn run<A: ControlApi + 'static>(
    inner: Arc<WorkerInner<A>>,
    mut rx: mpsc::Receiver<ActionMessage>,
) -> Result<(), AgentError> {
    let mut last_action_time = Instant::now();

    loop {
        let msg = tokio::select! {
            msg = rx.recv() => match msg {
                Some(msg) => msg,
                None => return Ok(()),
            },
            _ = inner.graceful.cancelled() => return Ok(()),
        };

        let mut outcome = ActionOutcome::default();

        // A health marker from the push transport: the stream has
        // yielded the toggle and polling takes over. Nothing runs, and
        // pause/termination bookkeeping stays untouched.
        if msg.unhealthy {
            tracing::debug!(worker = %inner.id, "push transport unhealthy; falling back to polling");
            let _ = msg.done.send(outcome);
            continue;
        }

        // Pause defers every post-action policy, including a pending
        // disconnect-after-job.
        if msg.action.is_pause() {
            inner.state.lock().paused = true;
            tracing::info!(worker = %inner.id, "paused by server");
            let _ = msg.done.send(outcome);
            continue;
        }
        {
            let mut state = inner.state.lock();
            if state.paused {
                tracing::info!(worker = %inner.id, "resuming from pause");
                state.paused = false;
            }
        }

        if msg.action.is_disconnect() {
            let _ = msg.done.send(outcome);
            inner.stop_gracefully();
            return Ok(());
        }

        if let Some(job) = msg.job {
            let job_started = Instant::now();
            last_action_time = Instant::now();
            match run_assigned_job(&inner, job).await {
                Ok(ran) => {
                    outcome.ran_job = ran;
                    if ran {
                        tracing::info!(
                            worker = %inner.id,
                            elapsed = %navvy_core::format_elapsed(job_started.elapsed().as_secs()),
                            "job complete"
                        );
                    }
                }
                Err(err) => {
                    // Job trouble never unwinds the worker.
                    tracing::warn!(worker = %inner.id, error = %err, "job did not complete cleanly");
                }
            }
        }

        let stop = termination_due(&inner, last_action_time);
        let _ = msg.done.send(outcome);

        if stop || (inner.config.disconnect_after_job && outcome.ran_job) {
            inner.stop_gracefully();
            return Ok(());
        }
    }
}

/// Post-action termination policies, other than disconnect-after-job,
/// which needs the action's outcome.
fn termination_due<A: ControlApi + 'static>(
    inner: &Arc<WorkerInner<A>>,
    last_action_time: Instant,
) -> bool {
    if inner.config.acquire_job.is_some() {
        // This worker existed to take one job.
        return true;
    }

    let idle_timeout = inner.config.disconnect_after_idle_timeout;
    if !idle_timeout.is_zero() && last_action_time.elapsed() > idle_timeout {
        inner.monitor.mark_idle(&inner.id);
        if inner.monitor.should_exit() {
            tracing::info!(worker = %inner.id, "pool idle timeout reached");
            return true;
        }
    }

    let max_uptime = inner.config.disconnect_after_uptime;
    if !max_uptime.is_zero() && inner.boot_time.elapsed() > max_uptime {
        tracing::info!(worker = %inner.id, "uptime cap reached");
        return true;
    }

    false
}

/// Accept and run one assigned job. Returns whether the job ran to a
/// reported finish.
pub(crate) async fn run_assigned_job<A: ControlApi + 'static>(
    inner: &Arc<WorkerInner<A>>,
    job: Job,
) -> Result<bool, AgentError> {
    let job = match inner.api.accept_job(&job, &inner.graceful).await {
        Ok(job) => job,
        Err(err) => {
            tracing::warn!(worker = %inner.id, job = %job.id, error = %err, "could not accept job");
            return Ok(false);
        }
    };
    run_claimed_job(inner, job).await
}

/// Run a job that is already claimed (accepted or acquired).
pub(crate) async fn run_claimed_job<A: ControlApi + 'static>(
    inner: &Arc<WorkerInner<A>>,
    job: Job,
) -> Result<bool, AgentError> {
    tracing::info!(worker = %inner.id, job = %job.id, "running job");
    inner.monitor.mark_busy(&inner.id);
    {
        let mut state = inner.state.lock();
        state.phase = WorkerPhase::Busy;
        state.current_job_id = Some(job.id.clone());
    }
    inner.metrics.busy_workers.inc();

    let runner = JobRunner::new(
        Arc::clone(&inner.api),
        Arc::clone(&inner.executor),
        Arc::clone(&inner.validator),
        RunnerConfig::from_agent(
            &inner.config,
            Duration::from_secs(inner.registration.job_status_interval),
        ),
        inner.metrics.clone(),
        job,
    );
    *inner.current_runner.lock() = Some(Arc::clone(&runner));

    let result = runner.run(&inner.ungraceful).await;

    *inner.current_runner.lock() = None;
    inner.metrics.busy_workers.dec();
    {
        let mut state = inner.state.lock();
        state.phase = WorkerPhase::Idle;
        state.current_job_id = None;
    }
    inner.monitor.mark_idle(&inner.id);

    match result {
        Ok(()) => Ok(true),
        Err(err) => {
            tracing::warn!(worker = %inner.id, error = %err, "job finished with an error");
            Ok(false)
        }
    }
}
