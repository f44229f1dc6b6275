// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The operation surface the worker control plane consumes.
//!
//! `HttpClient` is the production implementation; `FakeApi` (behind
//! `test-support`) scripts outcomes for control-plane tests.

use crate::client::RegistrationTemplate;
use crate::error::ApiError;
use crate::stream::StreamEvent;
use crate::types::{Heartbeat, PingResponse};
use async_trait::async_trait;
use futures_util::Stream;
use navvy_core::{AgentRegistration, Chunk, Job, JobId, JobState};
use std::collections::{BTreeMap, HashMap};
use std::pin::Pin;
use tokio_util::sync::CancellationToken;

/// A finite sequence of push-ping events. Ends on server close or error;
/// reconnecting means requesting a new stream.
pub type EventStream = Pin<Box<dyn Stream<Item = Result<StreamEvent, ApiError>> + Send>>;

/// Typed access to the build-orchestration server.
///
/// Retry policy lives behind each operation (finish and chunk upload
/// retry indefinitely, disconnect is best-effort, ping not at all), so
/// callers only ever see terminal outcomes.
#[async_trait]
pub trait ControlApi: Send + Sync {
    /// Register this agent and obtain its record.
    async fn register(
        &self,
        template: &RegistrationTemplate,
        cancel: &CancellationToken,
    ) -> Result<AgentRegistration, ApiError>;

    /// Current endpoint of the binding.
    fn endpoint(&self) -> String;

    /// Swap endpoint and/or request headers. `Some(empty map)` removes
    /// previously-set headers; `None` leaves the component untouched.
    fn rebind(&self, endpoint: Option<&str>, headers: Option<&HashMap<String, String>>);

    /// Poll-mode work solicitation.
    async fn ping(&self, cancel: &CancellationToken) -> Result<PingResponse, ApiError>;

    /// Ping against an explicit endpoint without touching the binding.
    /// Used to probe a server-directed redirect before adopting it.
    async fn ping_at(
        &self,
        endpoint: &str,
        cancel: &CancellationToken,
    ) -> Result<PingResponse, ApiError>;

    /// Open the push-ping stream.
    async fn stream_pings(&self, cancel: &CancellationToken) -> Result<EventStream, ApiError>;

    async fn heartbeat(&self, cancel: &CancellationToken) -> Result<Heartbeat, ApiError>;

    /// Claim a specific job (CLI acquire mode). Distinguishes
    /// `AcquisitionRejected` (422) and `Locked` (423 + Retry-After).
    async fn acquire_job(
        &self,
        job_id: &JobId,
        cancel: &CancellationToken,
    ) -> Result<Job, ApiError>;

    /// Accept a ping-assigned job.
    async fn accept_job(&self, job: &Job, cancel: &CancellationToken) -> Result<Job, ApiError>;

    async fn start_job(&self, job: &Job, cancel: &CancellationToken) -> Result<(), ApiError>;

    /// Report final job state. Retries until it lands, except on 422.
    async fn finish_job(&self, job: &Job, cancel: &CancellationToken) -> Result<(), ApiError>;

    /// Upload one log chunk. Retries until it lands, except on 4xx.
    async fn upload_chunk(
        &self,
        job_id: &JobId,
        chunk: &Chunk,
        cancel: &CancellationToken,
    ) -> Result<(), ApiError>;

    async fn upload_header_times(
        &self,
        job_id: &JobId,
        times: &BTreeMap<u64, String>,
        cancel: &CancellationToken,
    ) -> Result<(), ApiError>;

    /// Server-side job state, polled to detect cancellation.
    async fn job_state(
        &self,
        job_id: &JobId,
        cancel: &CancellationToken,
    ) -> Result<JobState, ApiError>;

    /// Best-effort goodbye.
    async fn disconnect(&self, cancel: &CancellationToken) -> Result<(), ApiError>;
}
