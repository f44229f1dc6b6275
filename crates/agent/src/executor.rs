// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Executor seam.
//!
//! The runner drives jobs through this trait; the production
//! implementation spawns the configured bootstrap command, and tests
//! script outcomes with `FakeExecutor`. How the bootstrap internally
//! runs build steps is outside the agent's concern.

use crate::output::OutputBuffer;
use async_trait::async_trait;
use navvy_core::Job;
use std::path::Path;
#[cfg(any(test, feature = "test-support"))]
use std::time::Duration;
use thiserror::Error;
use tokio::io::AsyncReadExt;
use tokio::process::Command;

#[derive(Debug, Error)]
pub enum ExecutorError {
    #[error("failed to spawn executor: {0}")]
    Spawn(String),
}

/// How the executor process ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExitOutcome {
    pub exit_status: i32,
    pub signal: Option<String>,
}

impl ExitOutcome {
    pub fn success() -> Self {
        Self { exit_status: 0, signal: None }
    }
}

/// A spawned job. `wait` is cancel-safe: the runner drops the wait
/// future to deliver signals and then waits again.
#[async_trait]
pub trait RunningJob: Send {
    async fn wait(&mut self) -> ExitOutcome;
    async fn interrupt(&mut self);
    async fn terminate(&mut self);
}

#[async_trait]
pub trait Executor: Send + Sync {
    async fn start(
        &self,
        job: &Job,
        env_file: &Path,
        output: OutputBuffer,
    ) -> Result<Box<dyn RunningJob>, ExecutorError>;
}

// ---------------------------------------------------------------------------
// Process executor
// ---------------------------------------------------------------------------

/// Runs the configured bootstrap command as a subprocess, with the job
/// env applied and the env file path exported.
pub struct ProcessExecutor {
    command: Vec<String>,
}

impl ProcessExecutor {
    pub fn new(command: Vec<String>) -> Self {
        Self { command }
    }
}

#[async_trait]
impl Executor for ProcessExecutor {
    async fn start(
        &self,
        job: &Job,
        env_file: &Path,
        output: OutputBuffer,
    ) -> Result<Box<dyn RunningJob>, ExecutorError> {
        let program = self
            .command
            .first()
            .ok_or_else(|| ExecutorError::Spawn("empty bootstrap command".to_string()))?;

        let mut child = Command::new(program)
            .args(&self.command[1..])
            .envs(&job.env)
            .env("NAVVY_JOB_ID", job.id.as_str())
            .env("NAVVY_ENV_FILE", env_file)
            .stdin(std::process::Stdio::null())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| ExecutorError::Spawn(format!("{}: {}", program, e)))?;

        if let Some(stdout) = child.stdout.take() {
            tokio::spawn(pump_into(stdout, output.clone()));
        }
        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(pump_into(stderr, output));
        }

        Ok(Box::new(ProcessRun { child }))
    }
}

/// Copy a child pipe into the shared buffer. Stops when the pipe hits
/// EOF or the buffer is closed (which backs pressure onto the child the
/// way a broken pipe would).
async fn pump_into(mut pipe: impl tokio::io::AsyncRead + Unpin, output: OutputBuffer) {
    let mut buf = [0u8; 8192];
    loop {
        match pipe.read(&mut buf).await {
            Ok(0) | Err(_) => break,
            Ok(n) => {
                if output.write(&buf[..n]).is_err() {
                    break;
                }
            }
        }
    }
}

struct ProcessRun {
    child: tokio::process::Child,
}

impl ProcessRun {
    fn signal(&self, signal: nix::sys::signal::Signal) {
        if let Some(pid) = self.child.id() {
            let _ = nix::sys::signal::kill(nix::unistd::Pid::from_raw(pid as i32), signal);
        }
    }
}

#[async_trait]
impl RunningJob for ProcessRun {
    async fn wait(&mut self) -> ExitOutcome {
        match self.child.wait().await {
            Ok(status) => {
                if let Some(code) = status.code() {
                    ExitOutcome { exit_status: code, signal: None }
                } else {
                    use std::os::unix::process::ExitStatusExt;
                    ExitOutcome {
                        exit_status: -1,
                        signal: status.signal().map(signal_name),
                    }
                }
            }
            Err(err) => {
                tracing::warn!(error = %err, "waiting on executor failed");
                ExitOutcome { exit_status: -1, signal: None }
            }
        }
    }

    async fn interrupt(&mut self) {
        self.signal(nix::sys::signal::Signal::SIGINT);
    }

    async fn terminate(&mut self) {
        self.signal(nix::sys::signal::Signal::SIGKILL);
    }
}

fn signal_name(signal: i32) -> String {
    match signal {
        2 => "SIGINT".to_string(),
        9 => "SIGKILL".to_string(),
        15 => "SIGTERM".to_string(),
        other => format!("signal {}", other),
    }
}

// ---------------------------------------------------------------------------
// Fake executor (test-support)
// ---------------------------------------------------------------------------

/// Scripted behavior for one fake job run.
#[cfg(any(test, feature = "test-support"))]
#[derive(Debug, Clone)]
pub struct FakeRun {
    pub output: String,
    pub exit_status: i32,
    pub run_for: Duration,
    /// Ignore the natural deadline and only end on a signal.
    pub hang_until_signal: bool,
    /// Whether SIGINT ends the run (false exercises the grace-period
    /// terminate path).
    pub obey_interrupt: bool,
}

#[cfg(any(test, feature = "test-support"))]
impl Default for FakeRun {
    fn default() -> Self {
        Self {
            output: String::new(),
            exit_status: 0,
            run_for: Duration::ZERO,
            hang_until_signal: false,
            obey_interrupt: true,
        }
    }
}

#[cfg(any(test, feature = "test-support"))]
pub struct FakeExecutor {
    script: parking_lot::Mutex<std::collections::VecDeque<FakeRun>>,
    events: std::sync::Arc<parking_lot::Mutex<Vec<String>>>,
}

#[cfg(any(test, feature = "test-support"))]
impl Default for FakeExecutor {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(any(test, feature = "test-support"))]
impl FakeExecutor {
    pub fn new() -> Self {
        Self {
            script: parking_lot::Mutex::new(std::collections::VecDeque::new()),
            events: std::sync::Arc::new(parking_lot::Mutex::new(Vec::new())),
        }
    }

    pub fn script_run(&self, run: FakeRun) {
        self.script.lock().push_back(run);
    }

    /// Start/interrupt/terminate events in arrival order, tagged with
    /// the job id.
    pub fn events(&self) -> Vec<String> {
        self.events.lock().clone()
    }
}

#[cfg(any(test, feature = "test-support"))]
#[async_trait]
impl Executor for FakeExecutor {
    async fn start(
        &self,
        job: &Job,
        _env_file: &Path,
        output: OutputBuffer,
    ) -> Result<Box<dyn RunningJob>, ExecutorError> {
        let run = self.script.lock().pop_front().unwrap_or_default();
        self.events.lock().push(format!("start:{}", job.id));
        let _ = output.write(run.output.as_bytes());

        let deadline = tokio::time::Instant::now() + run.run_for;
        let (signal_tx, signal_rx) = tokio::sync::watch::channel(0u8);
        Ok(Box::new(FakeRunning {
            run,
            job_id: job.id.as_str().to_string(),
            deadline,
            events: std::sync::Arc::clone(&self.events),
            signal_tx,
            signal_rx,
        }))
    }
}

#[cfg(any(test, feature = "test-support"))]
struct FakeRunning {
    run: FakeRun,
    job_id: String,
    deadline: tokio::time::Instant,
    events: std::sync::Arc<parking_lot::Mutex<Vec<String>>>,
    signal_tx: tokio::sync::watch::Sender<u8>,
    signal_rx: tokio::sync::watch::Receiver<u8>,
}

#[cfg(any(test, feature = "test-support"))]
#[async_trait]
impl RunningJob for FakeRunning {
    async fn wait(&mut self) -> ExitOutcome {
        loop {
            let level = *self.signal_rx.borrow();
            if level >= 2 {
                return ExitOutcome { exit_status: -1, signal: Some("SIGKILL".to_string()) };
            }
            if level == 1 && self.run.obey_interrupt {
                return ExitOutcome { exit_status: 130, signal: Some("SIGINT".to_string()) };
            }
            tokio::select! {
                _ = tokio::time::sleep_until(self.deadline), if !self.run.hang_until_signal => {
                    return ExitOutcome {
                        exit_status: self.run.exit_status,
                        signal: None,
                    };
                }
                changed = self.signal_rx.changed() => {
                    if changed.is_err() {
                        return ExitOutcome { exit_status: -1, signal: None };
                    }
                }
            }
        }
    }

    async fn interrupt(&mut self) {
        self.events.lock().push(format!("interrupt:{}", self.job_id));
        let _ = self.signal_tx.send(1);
    }

    async fn terminate(&mut self) {
        self.events.lock().push(format!("terminate:{}", self.job_id));
        let _ = self.signal_tx.send(2);
    }
}
