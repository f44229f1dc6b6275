// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-job runner.
//!
//! Owns exactly one job from start to finish: reports it started,
//! validates it, spawns the executor, fans output into the streamers,
//! polls for server-side cancellation, and reports it finished exactly
//! once — even when the executor never ran.

use crate::config::AgentConfig;
use crate::error::AgentError;
use crate::executor::{Executor, ExitOutcome, RunningJob};
use crate::headertimes::{HeaderTimesStreamer, TimesUploader};
use crate::hook;
use crate::logstream::{LogStreamer, LogStreamerConfig, Uploader};
use crate::metrics::AgentMetrics;
use crate::output::OutputBuffer;
use crate::validate::Validator;
use chrono::Utc;
use navvy_api::ControlApi;
use navvy_core::{Job, SignalReason};
use parking_lot::Mutex;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

/// Upload retries stop trying after this long, even for the
/// retry-forever operations.
const UPLOAD_DEADLINE: Duration = Duration::from_secs(48 * 3600);

/// How often the log pump copies accumulated output into the streamer.
const PUMP_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Debug, Clone)]
pub struct RunnerConfig {
    pub cancel_grace_period: Duration,
    pub job_status_interval: Duration,
    pub chunk_upload_concurrency: usize,
    pub max_log_bytes: u64,
    pub pre_bootstrap_hook: Option<PathBuf>,
}

impl RunnerConfig {
    pub fn from_agent(config: &AgentConfig, job_status_interval: Duration) -> Self {
        Self {
            cancel_grace_period: config.cancel_grace_period,
            job_status_interval,
            chunk_upload_concurrency: config.chunk_upload_concurrency,
            max_log_bytes: config.max_log_bytes,
            pre_bootstrap_hook: config.pre_bootstrap_hook.clone(),
        }
    }
}

#[derive(Default)]
struct CancelState {
    requested: bool,
    /// Agent-initiated (as opposed to server-initiated) cancellation.
    stopped: bool,
}

enum Ended {
    Natural(ExitOutcome),
    CancelRequested,
    HardStop,
}

pub struct JobRunner<A: ControlApi + 'static> {
    api: Arc<A>,
    executor: Arc<dyn Executor>,
    validator: Arc<Validator>,
    config: RunnerConfig,
    metrics: AgentMetrics,
    job: Mutex<Job>,
    output: OutputBuffer,
    cancel_state: Mutex<CancelState>,
    cancel_flag: watch::Sender<bool>,
    finished: AtomicBool,
}

impl<A: ControlApi + 'static> JobRunner<A> {
    pub fn new(
        api: Arc<A>,
        executor: Arc<dyn Executor>,
        validator: Arc<Validator>,
        config: RunnerConfig,
        metrics: AgentMetrics,
        job: Job,
    ) -> Arc<Self> {
        Arc::new(Self {
            api,
            executor,
            validator,
            config,
            metrics,
            job: Mutex::new(job),
            output: OutputBuffer::new(),
            cancel_state: Mutex::new(CancelState::default()),
            cancel_flag: watch::Sender::new(false),
            finished: AtomicBool::new(false),
        })
    }

    pub fn job_id(&self) -> navvy_core::JobId {
        self.job.lock().id.clone()
    }

    /// Server- or poller-initiated cancellation. Idempotent: the first
    /// call wins, later calls are no-ops.
    pub fn cancel(&self) {
        let mut state = self.cancel_state.lock();
        if state.requested {
            return;
        }
        state.requested = true;
        drop(state);
        tracing::info!(job = %self.job_id(), "canceling job");
        self.cancel_flag.send_replace(true);
    }

    /// Agent-initiated cancellation: the job is reported with
    /// `agent_stop` instead of `cancel`.
    pub fn cancel_and_stop(&self) {
        self.cancel_state.lock().stopped = true;
        self.cancel();
    }

    /// Run the job to completion. On return the job has been reported
    /// finished server-side (unless even retry-forever gave up).
    pub async fn run(self: &Arc<Self>, cancel: &CancellationToken) -> Result<(), AgentError> {
        // Uploads outlive a canceled job but not process exit, gated by
        // a long outer deadline.
        let upload_cancel = cancel.child_token();
        {
            let guard = upload_cancel.clone();
            tokio::spawn(async move {
                tokio::select! {
                    _ = tokio::time::sleep(UPLOAD_DEADLINE) => guard.cancel(),
                    _ = guard.cancelled() => {}
                }
            });
        }

        let streamer = Arc::new(LogStreamer::start(
            LogStreamerConfig {
                max_chunk_bytes: self.job.lock().chunks_max_size_bytes,
                max_total_bytes: self.config.max_log_bytes,
                concurrency: self.config.chunk_upload_concurrency,
                queue_depth: 16,
            },
            self.chunk_uploader(&upload_cancel),
        ));
        let header_times = Arc::new(HeaderTimesStreamer::start(self.times_uploader(&upload_cancel)));

        self.metrics.jobs_started.inc();
        let result = self
            .run_inner(cancel, &upload_cancel, Arc::clone(&streamer), Arc::clone(&header_times))
            .await;

        // Cleanup always runs: flush output, drain the streamers,
        // remove the env file, and report finished.
        self.flush_output(&streamer, &header_times, &upload_cancel).await;
        header_times.stop().await;
        streamer.stop().await;
        self.job.lock().chunks_failed_count = streamer.failed_chunks();

        let env_file = self.env_file_path();
        let _ = tokio::fs::remove_file(&env_file).await;

        let finish_result = self.finish_once(&upload_cancel).await;
        upload_cancel.cancel();
        self.metrics.jobs_finished.inc();

        result.and(finish_result)
    }

    async fn run_inner(
        self: &Arc<Self>,
        cancel: &CancellationToken,
        upload_cancel: &CancellationToken,
        streamer: Arc<LogStreamer>,
        header_times: Arc<HeaderTimesStreamer>,
    ) -> Result<(), AgentError> {
        let job_snapshot = {
            let mut job = self.job.lock();
            job.started_at = Some(Utc::now());
            job.clone()
        };

        if let Err(err) = self.api.start_job(&job_snapshot, cancel).await {
            tracing::error!(job = %job_snapshot.id, error = %err, "could not start job server-side");
            self.record_refusal(-1, SignalReason::ProcessRunError);
            return Ok(());
        }

        // Pre-run validation. Refusals still finish the job normally.
        if let Err(refusal) = self.validator.check(&job_snapshot) {
            tracing::warn!(job = %job_snapshot.id, reason = %refusal.reason, "refusing job: {}", refusal.message);
            let _ = self.output.write(format!("{}\n", refusal.message).as_bytes());
            self.record_refusal(-1, refusal.reason);
            return Ok(());
        }

        if let Some(hook_path) = &self.config.pre_bootstrap_hook {
            match hook::run_pre_bootstrap(hook_path, &job_snapshot.env).await {
                Ok(0) => {}
                Ok(code) => {
                    let _ = self
                        .output
                        .write(format!("pre-bootstrap hook exited with {}\n", code).as_bytes());
                    self.record_refusal(-1, SignalReason::AgentRefused);
                    return Ok(());
                }
                Err(err) => {
                    tracing::error!(job = %job_snapshot.id, error = %err, "pre-bootstrap hook failed to run");
                    self.record_refusal(-1, SignalReason::AgentRefused);
                    return Ok(());
                }
            }
        }

        let env_file = self.env_file_path();
        if let Err(err) = write_env_file(&env_file, &job_snapshot).await {
            tracing::error!(job = %job_snapshot.id, error = %err, "could not write job env file");
            self.record_refusal(-1, SignalReason::ProcessRunError);
            return Ok(());
        }

        let mut handle = match self
            .executor
            .start(&job_snapshot, &env_file, self.output.clone())
            .await
        {
            Ok(handle) => handle,
            Err(err) => {
                tracing::error!(job = %job_snapshot.id, error = %err, "executor failed to spawn");
                self.record_refusal(-1, SignalReason::ProcessRunError);
                return Ok(());
            }
        };

        // The executor is live: pump logs and poll for cancellation
        // until it ends.
        let helpers = CancellationToken::new();
        let pump = tokio::spawn(log_pump(
            self.output.clone(),
            Arc::clone(&streamer),
            Arc::clone(&header_times),
            helpers.clone(),
            upload_cancel.clone(),
        ));
        let poller = tokio::spawn(cancel_poller(
            Arc::clone(self),
            self.config.job_status_interval,
            helpers.clone(),
        ));

        let ended = {
            let requested = self.cancel_flag.subscribe();
            tokio::select! {
                outcome = handle.wait() => Ended::Natural(outcome),
                _ = wait_for_flag(requested) => Ended::CancelRequested,
                _ = cancel.cancelled() => Ended::HardStop,
            }
        };

        let outcome = match ended {
            Ended::Natural(outcome) => outcome,
            Ended::CancelRequested => self.wind_down(&mut handle).await,
            Ended::HardStop => {
                self.cancel_state.lock().stopped = true;
                self.cancel();
                self.wind_down(&mut handle).await
            }
        };

        helpers.cancel();
        let _ = pump.await;
        let _ = poller.await;

        {
            let state = self.cancel_state.lock();
            let mut job = self.job.lock();
            job.exit_status = Some(outcome.exit_status);
            job.signal = outcome.signal;
            if state.requested {
                job.signal_reason =
                    if state.stopped { SignalReason::AgentStop } else { SignalReason::Cancel };
            }
        }
        Ok(())
    }

    /// Interrupt, give the executor the grace period, then terminate.
    async fn wind_down(&self, handle: &mut Box<dyn RunningJob>) -> ExitOutcome {
        handle.interrupt().await;
        let waited = tokio::select! {
            outcome = handle.wait() => Some(outcome),
            _ = tokio::time::sleep(self.config.cancel_grace_period) => None,
        };
        match waited {
            Some(outcome) => outcome,
            None => {
                tracing::warn!(job = %self.job_id(), "grace period expired, terminating executor");
                handle.terminate().await;
                handle.wait().await
            }
        }
    }

    fn record_refusal(&self, exit_status: i32, reason: SignalReason) {
        let mut job = self.job.lock();
        job.exit_status = Some(exit_status);
        job.signal_reason = reason;
    }

    async fn flush_output(
        &self,
        streamer: &LogStreamer,
        header_times: &HeaderTimesStreamer,
        upload_cancel: &CancellationToken,
    ) {
        let remaining = self.output.drain_new();
        if !remaining.is_empty() {
            header_times.scan(&String::from_utf8_lossy(&remaining));
            let _ = streamer.process(&remaining, upload_cancel).await;
        }
    }

    async fn finish_once(&self, upload_cancel: &CancellationToken) -> Result<(), AgentError> {
        if self.finished.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        let job = {
            let mut job = self.job.lock();
            job.finished_at = Some(Utc::now());
            job.clone()
        };
        match self.api.finish_job(&job, upload_cancel).await {
            Ok(()) => Ok(()),
            Err(err) if err.status() == Some(422) => {
                // The server no longer wants this verdict; nothing to do.
                tracing::warn!(job = %job.id, "finish rejected with 422, moving on");
                Ok(())
            }
            Err(err) => Err(err.into()),
        }
    }

    fn env_file_path(&self) -> PathBuf {
        std::env::temp_dir().join(format!("job-env-{}", self.job_id()))
    }

    fn chunk_uploader(&self, upload_cancel: &CancellationToken) -> Uploader {
        let api = Arc::clone(&self.api);
        let job_id = self.job_id();
        let metrics = self.metrics.clone();
        let cancel = upload_cancel.clone();
        Arc::new(move |chunk| {
            let api = Arc::clone(&api);
            let job_id = job_id.clone();
            let metrics = metrics.clone();
            let cancel = cancel.clone();
            Box::pin(async move {
                match api.upload_chunk(&job_id, &chunk, &cancel).await {
                    Ok(()) => {
                        metrics.chunks_uploaded.inc();
                        Ok(())
                    }
                    Err(err) => {
                        metrics.chunks_failed.inc();
                        Err(err)
                    }
                }
            })
        })
    }

    fn times_uploader(&self, upload_cancel: &CancellationToken) -> TimesUploader {
        let api = Arc::clone(&self.api);
        let job_id = self.job_id();
        let cancel = upload_cancel.clone();
        Arc::new(move |times| {
            let api = Arc::clone(&api);
            let job_id = job_id.clone();
            let cancel = cancel.clone();
            Box::pin(async move { api.upload_header_times(&job_id, &times, &cancel).await })
        })
    }

    /// The finished job record, for observers.
    pub fn job(&self) -> Job {
        self.job.lock().clone()
    }
}

async fn wait_for_flag(mut rx: watch::Receiver<bool>) {
    loop {
        if *rx.borrow_and_update() {
            return;
        }
        if rx.changed().await.is_err() {
            futures_util::future::pending::<()>().await;
        }
    }
}

/// Copy accumulated output into the streamers every second. On the
/// first streamer failure, close the buffer so the executor's next
/// write fails like a broken pipe.
async fn log_pump(
    output: OutputBuffer,
    streamer: Arc<LogStreamer>,
    header_times: Arc<HeaderTimesStreamer>,
    done: CancellationToken,
    upload_cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = tokio::time::sleep(PUMP_INTERVAL) => {}
            _ = done.cancelled() => return,
        }
        let bytes = output.drain_new();
        if bytes.is_empty() {
            continue;
        }
        header_times.scan(&String::from_utf8_lossy(&bytes));
        if streamer.process(&bytes, &upload_cancel).await.is_err() {
            tracing::warn!("log delivery failed; closing job output");
            output.close();
            return;
        }
    }
}

/// Poll the server for a cancellation verdict while the job runs.
async fn cancel_poller<A: ControlApi + 'static>(
    runner: Arc<JobRunner<A>>,
    interval: Duration,
    done: CancellationToken,
) {
    let job_id = runner.job_id();
    loop {
        tokio::select! {
            _ = tokio::time::sleep(interval) => {}
            _ = done.cancelled() => return,
        }
        match runner.api.job_state(&job_id, &done).await {
            Ok(state) if state.wants_cancel() => {
                runner.cancel();
                return;
            }
            Ok(_) => {}
            Err(err) => {
                tracing::debug!(job = %job_id, error = %err, "job state poll failed");
            }
        }
    }
}

async fn write_env_file(path: &std::path::Path, job: &Job) -> std::io::Result<()> {
    let mut contents = String::new();
    let mut keys: Vec<_> = job.env.keys().collect();
    keys.sort();
    for key in keys {
        if let Some(value) = job.env.get(key) {
            contents.push_str(&format!("{}={}\n", key, value));
        }
    }
    tokio::fs::write(path, contents).await
}

#[cfg(test)]
#[path = "runner_tests.rs"]
mod tests;
