// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Scripted in-memory `ControlApi` for control-plane tests.
//!
//! Every operation pops from a per-operation script queue and falls back
//! to a benign default when the queue is empty, so tests only script
//! what they assert on. A journal records every call in arrival order.

use crate::api::{ControlApi, EventStream};
use crate::client::RegistrationTemplate;
use crate::error::ApiError;
use crate::stream::StreamEvent;
use crate::types::{Heartbeat, PingResponse};
use async_trait::async_trait;
use navvy_core::{AgentRegistration, Chunk, Job, JobId, JobState};
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap, VecDeque};
use tokio_util::sync::CancellationToken;

#[derive(Default)]
struct Scripts {
    ping: VecDeque<Result<PingResponse, ApiError>>,
    ping_at: HashMap<String, VecDeque<Result<PingResponse, ApiError>>>,
    heartbeat: VecDeque<Result<Heartbeat, ApiError>>,
    acquire: VecDeque<Result<Job, ApiError>>,
    finish: VecDeque<Result<(), ApiError>>,
    job_state: VecDeque<JobState>,
    /// Each connect pops one script; an exhausted queue yields a
    /// transport error, pushing the worker onto the poll loop.
    streams: VecDeque<Vec<Result<StreamEvent, ApiError>>>,
    fail_chunks: u32,
}

#[derive(Default)]
struct Journal {
    calls: Vec<String>,
    rebinds: Vec<(Option<String>, Option<HashMap<String, String>>)>,
    finished: Vec<Job>,
    chunks: Vec<(JobId, Chunk)>,
    header_times: Vec<(JobId, BTreeMap<u64, String>)>,
    disconnects: u32,
}

pub struct FakeApi {
    endpoint: Mutex<String>,
    scripts: Mutex<Scripts>,
    journal: Mutex<Journal>,
}

impl Default for FakeApi {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeApi {
    pub fn new() -> Self {
        Self {
            endpoint: Mutex::new("https://fake.example.com".to_string()),
            scripts: Mutex::new(Scripts::default()),
            journal: Mutex::new(Journal::default()),
        }
    }

    // -- scripting ----------------------------------------------------

    pub fn script_ping(&self, response: Result<PingResponse, ApiError>) {
        self.scripts.lock().ping.push_back(response);
    }

    /// Convenience: a ping that assigns the given job.
    pub fn script_job_ping(&self, job: Job) {
        self.script_ping(Ok(PingResponse { job: Some(job), ..PingResponse::default() }));
    }

    pub fn script_ping_at(&self, endpoint: &str, response: Result<PingResponse, ApiError>) {
        self.scripts.lock().ping_at.entry(endpoint.to_string()).or_default().push_back(response);
    }

    pub fn script_heartbeat(&self, response: Result<Heartbeat, ApiError>) {
        self.scripts.lock().heartbeat.push_back(response);
    }

    pub fn script_acquire(&self, response: Result<Job, ApiError>) {
        self.scripts.lock().acquire.push_back(response);
    }

    pub fn script_finish(&self, response: Result<(), ApiError>) {
        self.scripts.lock().finish.push_back(response);
    }

    pub fn script_job_state(&self, state: JobState) {
        self.scripts.lock().job_state.push_back(state);
    }

    pub fn script_stream(&self, events: Vec<Result<StreamEvent, ApiError>>) {
        self.scripts.lock().streams.push_back(events);
    }

    /// Make the next `n` chunk uploads fail.
    pub fn fail_next_chunks(&self, n: u32) {
        self.scripts.lock().fail_chunks = n;
    }

    // -- observation --------------------------------------------------

    pub fn calls(&self) -> Vec<String> {
        self.journal.lock().calls.clone()
    }

    pub fn finished_jobs(&self) -> Vec<Job> {
        self.journal.lock().finished.clone()
    }

    pub fn uploaded_chunks(&self) -> Vec<(JobId, Chunk)> {
        self.journal.lock().chunks.clone()
    }

    pub fn uploaded_header_times(&self) -> Vec<(JobId, BTreeMap<u64, String>)> {
        self.journal.lock().header_times.clone()
    }

    pub fn rebinds(&self) -> Vec<(Option<String>, Option<HashMap<String, String>>)> {
        self.journal.lock().rebinds.clone()
    }

    pub fn disconnect_count(&self) -> u32 {
        self.journal.lock().disconnects
    }

    fn record(&self, call: impl Into<String>) {
        self.journal.lock().calls.push(call.into());
    }
}

#[async_trait]
impl ControlApi for FakeApi {
    async fn register(
        &self,
        template: &RegistrationTemplate,
        _cancel: &CancellationToken,
    ) -> Result<AgentRegistration, ApiError> {
        self.record(format!("register:{}", template.name));
        Ok(AgentRegistration::builder()
            .uuid(format!("uuid-{}", template.name))
            .name(template.name.clone())
            .endpoint(self.endpoint.lock().clone())
            .ping_interval(0)
            .build())
    }

    fn endpoint(&self) -> String {
        self.endpoint.lock().clone()
    }

    fn rebind(&self, endpoint: Option<&str>, headers: Option<&HashMap<String, String>>) {
        if let Some(endpoint) = endpoint {
            *self.endpoint.lock() = endpoint.to_string();
        }
        self.journal
            .lock()
            .rebinds
            .push((endpoint.map(String::from), headers.cloned()));
    }

    async fn ping(&self, _cancel: &CancellationToken) -> Result<PingResponse, ApiError> {
        self.record(format!("ping:{}", self.endpoint.lock()));
        self.scripts.lock().ping.pop_front().unwrap_or_else(|| Ok(PingResponse::default()))
    }

    async fn ping_at(
        &self,
        endpoint: &str,
        _cancel: &CancellationToken,
    ) -> Result<PingResponse, ApiError> {
        self.record(format!("ping_at:{}", endpoint));
        self.scripts
            .lock()
            .ping_at
            .get_mut(endpoint)
            .and_then(|q| q.pop_front())
            .unwrap_or_else(|| Ok(PingResponse::default()))
    }

    async fn stream_pings(&self, _cancel: &CancellationToken) -> Result<EventStream, ApiError> {
        self.record("stream_pings");
        match self.scripts.lock().streams.pop_front() {
            Some(events) => Ok(Box::pin(futures_util::stream::iter(events))),
            None => Err(ApiError::transport("stream-pings", "no stream scripted")),
        }
    }

    async fn heartbeat(&self, _cancel: &CancellationToken) -> Result<Heartbeat, ApiError> {
        self.record("heartbeat");
        self.scripts.lock().heartbeat.pop_front().unwrap_or_else(|| {
            Ok(Heartbeat { sent_at: "now".to_string(), received_at: Some("now".to_string()) })
        })
    }

    async fn acquire_job(
        &self,
        job_id: &JobId,
        _cancel: &CancellationToken,
    ) -> Result<Job, ApiError> {
        self.record(format!("acquire:{}", job_id));
        self.scripts
            .lock()
            .acquire
            .pop_front()
            .unwrap_or_else(|| Ok(Job::builder().id(job_id.as_str()).build()))
    }

    async fn accept_job(&self, job: &Job, _cancel: &CancellationToken) -> Result<Job, ApiError> {
        self.record(format!("accept:{}", job.id));
        Ok(job.clone())
    }

    async fn start_job(&self, job: &Job, _cancel: &CancellationToken) -> Result<(), ApiError> {
        self.record(format!("start:{}", job.id));
        Ok(())
    }

    async fn finish_job(&self, job: &Job, _cancel: &CancellationToken) -> Result<(), ApiError> {
        self.record(format!("finish:{}", job.id));
        self.journal.lock().finished.push(job.clone());
        self.scripts.lock().finish.pop_front().unwrap_or(Ok(()))
    }

    async fn upload_chunk(
        &self,
        job_id: &JobId,
        chunk: &Chunk,
        _cancel: &CancellationToken,
    ) -> Result<(), ApiError> {
        {
            let mut scripts = self.scripts.lock();
            if scripts.fail_chunks > 0 {
                scripts.fail_chunks -= 1;
                return Err(ApiError::transport("upload-chunk", "scripted failure"));
            }
        }
        self.journal.lock().chunks.push((job_id.clone(), chunk.clone()));
        Ok(())
    }

    async fn upload_header_times(
        &self,
        job_id: &JobId,
        times: &BTreeMap<u64, String>,
        _cancel: &CancellationToken,
    ) -> Result<(), ApiError> {
        self.journal.lock().header_times.push((job_id.clone(), times.clone()));
        Ok(())
    }

    async fn job_state(
        &self,
        job_id: &JobId,
        _cancel: &CancellationToken,
    ) -> Result<JobState, ApiError> {
        self.record(format!("job_state:{}", job_id));
        Ok(self.scripts.lock().job_state.pop_front().unwrap_or(JobState::Running))
    }

    async fn disconnect(&self, _cancel: &CancellationToken) -> Result<(), ApiError> {
        self.record("disconnect");
        self.journal.lock().disconnects += 1;
        Ok(())
    }
}
