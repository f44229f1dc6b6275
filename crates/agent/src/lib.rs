// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! navvy-agent: the worker control plane.
//!
//! A pool owns N workers. Each worker couples three cooperating loops —
//! heartbeat, work solicitation (push and poll, mutually excluded by a
//! single-token toggle), and action dispatch — around one invariant: at
//! most one job per worker at a time.

pub mod config;
pub mod error;
pub mod executor;
pub mod headertimes;
pub mod hook;
pub mod logstream;
pub mod metrics;
pub mod monitor;
pub mod output;
pub mod pool;
pub mod runner;
pub mod server;
pub mod validate;
pub mod worker;

pub use config::{AgentConfig, TransportMode};
pub use error::AgentError;
pub use executor::{ExitOutcome, Executor, ProcessExecutor, RunningJob};
#[cfg(any(test, feature = "test-support"))]
pub use executor::{FakeExecutor, FakeRun};
pub use headertimes::HeaderTimesStreamer;
pub use logstream::{LogStreamer, LogStreamerConfig};
pub use metrics::AgentMetrics;
pub use monitor::IdleMonitor;
pub use output::OutputBuffer;
pub use pool::{ApiFactory, Pool};
pub use runner::{JobRunner, RunnerConfig};
pub use validate::Validator;
pub use worker::{Worker, WorkerDeps, WorkerSnapshot};
