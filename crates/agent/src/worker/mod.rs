// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! One worker: a registered agent identity plus the loops that drive it.
//!
//! Four tasks cooperate per worker. Heartbeat runs independently. The
//! push (stream) and poll (ping) loops both produce action messages but
//! are mutually excluded by a single-token toggle; the action handler is
//! the lone consumer and the only code that mutates busy/idle state.

mod actions;
mod heartbeat;
mod ping;
mod stream;

use crate::config::{AgentConfig, TransportMode};
use crate::error::AgentError;
use crate::executor::Executor;
use crate::metrics::AgentMetrics;
use crate::monitor::IdleMonitor;
use crate::runner::JobRunner;
use crate::validate::Validator;
use navvy_api::ControlApi;
use navvy_core::{Action, AgentRegistration, Job, JobId, WorkerId, WorkerPhase};
use parking_lot::Mutex;
use rand::Rng;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

/// One action delivered to the handler, with a completion channel the
/// producer awaits so at most one action is in flight per worker.
pub(crate) struct ActionMessage {
    pub action: Action,
    pub job: Option<Job>,
    /// Push-transport health marker: the stream saw an error or closed.
    pub unhealthy: bool,
    pub done: oneshot::Sender<ActionOutcome>,
}

#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct ActionOutcome {
    pub ran_job: bool,
}

/// Single-token mutual exclusion between the push and poll producers.
#[derive(Clone)]
pub(crate) struct Toggle {
    tx: mpsc::Sender<()>,
    rx: Arc<tokio::sync::Mutex<mpsc::Receiver<()>>>,
}

impl Toggle {
    pub(crate) fn new() -> Self {
        let (tx, rx) = mpsc::channel(1);
        // Seed the single token.
        let _ = tx.try_send(());
        Self { tx, rx: Arc::new(tokio::sync::Mutex::new(rx)) }
    }

    /// Wait until the token is available and take it.
    pub(crate) async fn acquire(&self) {
        let _ = self.rx.lock().await.recv().await;
    }

    pub(crate) fn release(&self) {
        let _ = self.tx.try_send(());
    }
}

/// Uniform jitter in `[0, interval)`, used to decorrelate agents.
pub(crate) fn jitter_within(interval: Duration) -> Duration {
    let ms = interval.as_millis() as u64;
    if ms == 0 {
        return Duration::ZERO;
    }
    Duration::from_millis(rand::thread_rng().gen_range(0..ms))
}

#[derive(Default)]
pub(crate) struct WorkerState {
    pub phase: WorkerPhase,
    pub current_job_id: Option<JobId>,
    pub last_ping_at: Option<Instant>,
    pub last_heartbeat_at: Option<Instant>,
    pub last_heartbeat_error: Option<String>,
    pub paused: bool,
}

/// Read-only snapshot for the HTTP status surface.
#[derive(Debug, Clone, serde::Serialize)]
pub struct WorkerSnapshot {
    pub id: String,
    pub spawn_index: usize,
    pub status: String,
    pub current_job_id: Option<String>,
    pub last_heartbeat_error: Option<String>,
}

pub struct WorkerDeps<A: ControlApi + 'static> {
    pub api: Arc<A>,
    pub executor: Arc<dyn Executor>,
    pub validator: Arc<Validator>,
    pub monitor: IdleMonitor,
    pub metrics: AgentMetrics,
    pub config: Arc<AgentConfig>,
}

pub(crate) struct WorkerInner<A: ControlApi + 'static> {
    pub id: WorkerId,
    pub spawn_index: usize,
    pub api: Arc<A>,
    pub executor: Arc<dyn Executor>,
    pub validator: Arc<Validator>,
    pub monitor: IdleMonitor,
    pub metrics: AgentMetrics,
    pub config: Arc<AgentConfig>,
    pub registration: AgentRegistration,
    pub state: Mutex<WorkerState>,
    /// Canceled on graceful stop: loops wind down, a running job
    /// completes first.
    pub graceful: CancellationToken,
    /// Canceled on ungraceful stop: the running job is canceled too.
    pub ungraceful: CancellationToken,
    pub current_runner: Mutex<Option<Arc<JobRunner<A>>>>,
    pub boot_time: Instant,
}

impl<A: ControlApi + 'static> WorkerInner<A> {
    pub(crate) fn stop_gracefully(&self) {
        if self.graceful.is_cancelled() {
            tracing::warn!(worker = %self.id, "already stopping");
            return;
        }
        tracing::info!(worker = %self.id, "stopping gracefully");
        self.graceful.cancel();
    }

    pub(crate) fn stop_ungracefully(&self) {
        if let Some(runner) = self.current_runner.lock().as_ref() {
            runner.cancel_and_stop();
        }
        self.ungraceful.cancel();
        self.graceful.cancel();
    }
}

pub struct Worker<A: ControlApi + 'static> {
    inner: Arc<WorkerInner<A>>,
}

impl<A: ControlApi + 'static> Clone for Worker<A> {
    fn clone(&self) -> Self {
        Self { inner: Arc::clone(&self.inner) }
    }
}

impl<A: ControlApi + 'static> Worker<A> {
    pub fn new(deps: WorkerDeps<A>, registration: AgentRegistration, spawn_index: usize) -> Self {
        Self {
            inner: Arc::new(WorkerInner {
                id: WorkerId::new(registration.name.clone()),
                spawn_index,
                api: deps.api,
                executor: deps.executor,
                validator: deps.validator,
                monitor: deps.monitor,
                metrics: deps.metrics,
                config: deps.config,
                registration,
                state: Mutex::new(WorkerState::default()),
                graceful: CancellationToken::new(),
                ungraceful: CancellationToken::new(),
                current_runner: Mutex::new(None),
                boot_time: Instant::now(),
            }),
        }
    }

    pub fn id(&self) -> WorkerId {
        self.inner.id.clone()
    }

    pub fn snapshot(&self) -> WorkerSnapshot {
        let state = self.inner.state.lock();
        WorkerSnapshot {
            id: self.inner.registration.uuid.as_str().to_string(),
            spawn_index: self.inner.spawn_index,
            status: state.phase.to_string(),
            current_job_id: state.current_job_id.as_ref().map(|id| id.as_str().to_string()),
            last_heartbeat_error: state.last_heartbeat_error.clone(),
        }
    }

    pub fn heartbeat_healthy(&self) -> bool {
        self.inner.state.lock().last_heartbeat_error.is_none()
    }

    pub fn stop_gracefully(&self) {
        self.inner.stop_gracefully();
    }

    pub fn stop_ungracefully(&self) {
        self.inner.stop_ungracefully();
    }

    /// Acquire-mode entry: claim one specific job, run it, disconnect.
    pub async fn acquire_and_run_job(&self, job_id: &JobId) -> Result<(), AgentError> {
        let inner = &self.inner;
        let cancel = inner.ungraceful.clone();
        let job = inner.api.acquire_job(job_id, &cancel).await?;

        // Acquired jobs are already claimed; no accept round trip.
        let result = actions::run_claimed_job(inner, job).await;
        inner.monitor.mark_dead(&inner.id);

        let _ = inner.api.disconnect(&CancellationToken::new()).await;
        result.map(|_| ())
    }

    /// Run the worker's loops until a stop policy, a server directive,
    /// or an unrecoverable error ends it.
    pub async fn run(&self) -> Result<(), AgentError> {
        if let Some(job_id) = self.inner.config.acquire_job.clone() {
            return self.acquire_and_run_job(&JobId::new(job_id)).await;
        }

        let inner = Arc::clone(&self.inner);
        let (action_tx, action_rx) = mpsc::channel::<ActionMessage>(1);
        let toggle = Toggle::new();

        let mut tasks: JoinSet<Result<(), AgentError>> = JoinSet::new();

        tasks.spawn(heartbeat::run(Arc::clone(&inner)));
        tasks.spawn(actions::run(Arc::clone(&inner), action_rx));

        match inner.config.transport {
            TransportMode::Both => {
                tasks.spawn(ping::run(Arc::clone(&inner), action_tx.clone(), toggle.clone()));
                tasks.spawn(stream::run(Arc::clone(&inner), action_tx, toggle));
            }
            TransportMode::StreamOnly => {
                tasks.spawn(stream::run(Arc::clone(&inner), action_tx, toggle));
            }
            TransportMode::NoStream => {
                tasks.spawn(ping::run(Arc::clone(&inner), action_tx, toggle));
            }
        }

        let mut first_error: Option<AgentError> = None;
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(Ok(())) => {}
                Ok(Err(err)) => {
                    if first_error.is_none() {
                        first_error = Some(err);
                    }
                    // One fatal loop takes the rest of the worker down.
                    inner.stop_ungracefully();
                }
                Err(join_err) => {
                    tracing::error!(worker = %inner.id, error = %join_err, "worker task panicked");
                }
            }
        }

        inner.monitor.mark_dead(&inner.id);
        let _ = inner.api.disconnect(&CancellationToken::new()).await;

        match first_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
#[path = "../worker_tests/mod.rs"]
mod tests;
