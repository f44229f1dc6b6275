// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Production HTTP client for the orchestration server.

use crate::api::{ControlApi, EventStream};
use crate::error::ApiError;
use crate::retry::Retrier;
use crate::stream::PingStream;
use crate::types::{
    DisconnectResponse, Heartbeat, JobStateResponse, PingResponse, RegisterRequest,
};
use async_trait::async_trait;
use chrono::Utc;
use navvy_core::{AgentRegistration, Chunk, Job, JobId, JobState};
use parking_lot::RwLock;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, AUTHORIZATION};
use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use std::collections::{BTreeMap, HashMap};
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

/// Claim protocol headers (server wire compatibility).
const LOCK_ACQUIRE_HEADER: &str = "X-Buildkite-Lock-Acquire-Job";
const BACKOFF_SEQUENCE_HEADER: &str = "X-Buildkite-Backoff-Sequence";
const TIMEOUT_HEADER: &str = "Buildkite-Timeout-Milliseconds";

/// How many 423 rounds the claim protocol tolerates before surfacing
/// `Locked`. Retry-After doubles per round, so this spans ~63s.
const MAX_LOCKED_ROUNDS: u32 = 6;

/// Overall deadline for acquiring a specific job.
const ACQUIRE_DEADLINE: Duration = Duration::from_secs(300);

/// What the agent announces at registration.
#[derive(Debug, Clone)]
pub struct RegistrationTemplate {
    pub name: String,
    pub hostname: String,
    pub version: String,
    pub tags: Vec<String>,
}

/// The current endpoint/credential binding. Swapped atomically on a
/// validated redirect, reverted on probe failure.
#[derive(Debug, Clone)]
struct Binding {
    endpoint: String,
    token: String,
    request_headers: HashMap<String, String>,
}

/// One client per worker. All operations snapshot the binding at call
/// time, so an in-flight request is unaffected by a concurrent rebind.
pub struct HttpClient {
    http: reqwest::Client,
    binding: RwLock<Binding>,
    agent_uuid: RwLock<String>,
}

impl HttpClient {
    pub fn new(endpoint: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            binding: RwLock::new(Binding {
                endpoint: trim_endpoint(endpoint.into()),
                token: token.into(),
                request_headers: HashMap::new(),
            }),
            agent_uuid: RwLock::new(String::new()),
        }
    }

    /// Adopt a registration: from here on, requests authenticate with the
    /// agent's access token against its assigned endpoint.
    pub fn adopt(&self, registration: &AgentRegistration) {
        let mut binding = self.binding.write();
        binding.endpoint = trim_endpoint(registration.endpoint.clone());
        binding.token = registration.access_token.clone();
        binding.request_headers = registration.request_headers.clone();
        *self.agent_uuid.write() = registration.uuid.as_str().to_string();
    }

    fn snapshot(&self) -> Binding {
        self.binding.read().clone()
    }

    fn headers_for(&self, binding: &Binding) -> Result<HeaderMap, ApiError> {
        let mut headers = HeaderMap::new();
        let auth = HeaderValue::from_str(&format!("Token {}", binding.token))
            .map_err(|e| ApiError::malformed("auth", e))?;
        headers.insert(AUTHORIZATION, auth);
        for (key, value) in &binding.request_headers {
            let name = HeaderName::from_bytes(key.as_bytes())
                .map_err(|e| ApiError::malformed("request-headers", e))?;
            let value = HeaderValue::from_str(value)
                .map_err(|e| ApiError::malformed("request-headers", e))?;
            headers.insert(name, value);
        }
        Ok(headers)
    }

    /// Send one request and classify the response. The JSON body, if any,
    /// is returned raw for the caller to parse.
    async fn send(
        &self,
        action: &'static str,
        method: Method,
        url: String,
        body: Option<serde_json::Value>,
        extra: HeaderMap,
        timeout: Option<Duration>,
        cancel: &CancellationToken,
    ) -> Result<String, ApiError> {
        let binding = self.snapshot();
        let mut headers = self.headers_for(&binding)?;
        headers.extend(extra);
        if let Some(t) = timeout {
            if let (Ok(name), Ok(v)) = (
                HeaderName::from_bytes(TIMEOUT_HEADER.as_bytes()),
                HeaderValue::from_str(&t.as_millis().to_string()),
            ) {
                headers.insert(name, v);
            }
        }

        let mut request = self.http.request(method, url).headers(headers);
        if let Some(body) = body {
            request = request.json(&body);
        }
        if let Some(t) = timeout {
            request = request.timeout(t);
        }

        let response = tokio::select! {
            r = request.send() => r.map_err(|e| ApiError::transport(action, e))?,
            _ = cancel.cancelled() => return Err(ApiError::Canceled { action }),
        };

        let status = response.status();
        let retry_after = parse_retry_after(response.headers());
        let text = tokio::select! {
            t = response.text() => t.map_err(|e| ApiError::transport(action, e))?,
            _ = cancel.cancelled() => return Err(ApiError::Canceled { action }),
        };

        if status.is_success() {
            return Ok(text);
        }
        if status == StatusCode::LOCKED {
            return Err(ApiError::Locked {
                retry_after: retry_after.unwrap_or(Duration::from_secs(1)),
            });
        }
        Err(ApiError::Status { action, status: status.as_u16(), body: text.trim().to_string() })
    }

    async fn send_json<T: DeserializeOwned>(
        &self,
        action: &'static str,
        method: Method,
        url: String,
        body: Option<serde_json::Value>,
        extra: HeaderMap,
        timeout: Option<Duration>,
        cancel: &CancellationToken,
    ) -> Result<T, ApiError> {
        let text = self.send(action, method, url, body, extra, timeout, cancel).await?;
        serde_json::from_str(&text).map_err(|e| ApiError::malformed(action, e))
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.snapshot().endpoint, path)
    }

    async fn ping_endpoint(
        &self,
        endpoint: &str,
        cancel: &CancellationToken,
    ) -> Result<PingResponse, ApiError> {
        self.send_json(
            "ping",
            Method::POST,
            format!("{}/ping", trim_endpoint(endpoint.to_string())),
            None,
            HeaderMap::new(),
            None,
            cancel,
        )
        .await
    }
}

fn trim_endpoint(endpoint: String) -> String {
    endpoint.trim_end_matches('/').to_string()
}

/// `Retry-After` arrives as float seconds.
fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
    let raw = headers.get("Retry-After")?.to_str().ok()?;
    let secs: f64 = raw.trim().parse().ok()?;
    if secs.is_sign_negative() || !secs.is_finite() {
        return None;
    }
    Some(Duration::from_secs_f64(secs))
}

#[async_trait]
impl ControlApi for HttpClient {
    async fn register(
        &self,
        template: &RegistrationTemplate,
        cancel: &CancellationToken,
    ) -> Result<AgentRegistration, ApiError> {
        let body = serde_json::to_value(RegisterRequest {
            name: template.name.clone(),
            hostname: template.hostname.clone(),
            version: template.version.clone(),
            tags: template.tags.clone(),
        })
        .map_err(|e| ApiError::malformed("register", e))?;

        let retrier = Retrier::exponential(10, Duration::from_secs(1), Duration::from_secs(30));
        let registration: AgentRegistration = retrier
            .run(cancel, "register", |_| {
                self.send_json(
                    "register",
                    Method::POST,
                    self.url("register"),
                    Some(body.clone()),
                    HeaderMap::new(),
                    None,
                    cancel,
                )
            })
            .await?;
        let registration = registration.normalized();
        self.adopt(&registration);
        Ok(registration)
    }

    fn endpoint(&self) -> String {
        self.snapshot().endpoint
    }

    fn rebind(&self, endpoint: Option<&str>, headers: Option<&HashMap<String, String>>) {
        let mut binding = self.binding.write();
        if let Some(endpoint) = endpoint {
            binding.endpoint = trim_endpoint(endpoint.to_string());
        }
        if let Some(headers) = headers {
            binding.request_headers = headers.clone();
        }
    }

    async fn ping(&self, cancel: &CancellationToken) -> Result<PingResponse, ApiError> {
        let endpoint = self.snapshot().endpoint;
        self.ping_endpoint(&endpoint, cancel).await
    }

    async fn ping_at(
        &self,
        endpoint: &str,
        cancel: &CancellationToken,
    ) -> Result<PingResponse, ApiError> {
        self.ping_endpoint(endpoint, cancel).await
    }

    async fn stream_pings(&self, cancel: &CancellationToken) -> Result<EventStream, ApiError> {
        let binding = self.snapshot();
        let uuid = self.agent_uuid.read().clone();
        let stream = tokio::select! {
            s = PingStream::connect(&binding.endpoint, &uuid, &binding.token) => s?,
            _ = cancel.cancelled() => return Err(ApiError::Canceled { action: "stream-pings" }),
        };
        Ok(Box::pin(futures_util::stream::unfold(stream, |mut s| async move {
            let event = s.next_event().await?;
            Some((event, s))
        })))
    }

    async fn heartbeat(&self, cancel: &CancellationToken) -> Result<Heartbeat, ApiError> {
        let retrier = Retrier::constant(10, Duration::from_secs(5));
        retrier
            .run(cancel, "heartbeat", |_| async {
                let sent_at = Utc::now().to_rfc3339();
                self.send_json(
                    "heartbeat",
                    Method::POST,
                    self.url("heartbeat"),
                    Some(serde_json::json!({ "sent_at": sent_at })),
                    HeaderMap::new(),
                    None,
                    cancel,
                )
                .await
            })
            .await
    }

    async fn acquire_job(
        &self,
        job_id: &JobId,
        cancel: &CancellationToken,
    ) -> Result<Job, ApiError> {
        let deadline = Instant::now() + ACQUIRE_DEADLINE;
        let mut locked_rounds: u32 = 0;
        let mut backoff_sequence: u32 = 0;

        loop {
            let mut extra = HeaderMap::new();
            if let Ok(name) = HeaderName::from_bytes(LOCK_ACQUIRE_HEADER.as_bytes()) {
                extra.insert(name, HeaderValue::from_static("1"));
            }
            if let (Ok(name), Ok(v)) = (
                HeaderName::from_bytes(BACKOFF_SEQUENCE_HEADER.as_bytes()),
                HeaderValue::from_str(&backoff_sequence.to_string()),
            ) {
                extra.insert(name, v);
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(ApiError::transport("acquire", "acquire deadline exhausted"));
            }

            let result: Result<Job, ApiError> = self
                .send_json(
                    "acquire",
                    Method::POST,
                    self.url(&format!("jobs/{}/acquire", job_id)),
                    None,
                    extra,
                    Some(remaining),
                    cancel,
                )
                .await;

            let err = match result {
                Ok(job) => return Ok(job),
                Err(err) => err,
            };

            match err {
                ApiError::Status { status: 422, .. } => return Err(ApiError::AcquisitionRejected),
                ApiError::Locked { retry_after } => {
                    if locked_rounds >= MAX_LOCKED_ROUNDS {
                        return Err(ApiError::Locked { retry_after });
                    }
                    locked_rounds += 1;
                    backoff_sequence += 1;
                    tracing::warn!(
                        job = %job_id,
                        delay_secs = retry_after.as_secs_f64(),
                        "job locked, waiting for server-directed retry"
                    );
                    tokio::select! {
                        _ = tokio::time::sleep(retry_after) => {}
                        _ = cancel.cancelled() => {
                            return Err(ApiError::Canceled { action: "acquire" })
                        }
                    }
                }
                err if err.retryable() => {
                    tokio::select! {
                        _ = tokio::time::sleep(Duration::from_secs(5)) => {}
                        _ = cancel.cancelled() => {
                            return Err(ApiError::Canceled { action: "acquire" })
                        }
                    }
                }
                err => return Err(err),
            }
        }
    }

    async fn accept_job(&self, job: &Job, cancel: &CancellationToken) -> Result<Job, ApiError> {
        let retrier = Retrier::constant(10, Duration::from_secs(5));
        retrier
            .run(cancel, "accept", |_| {
                self.send_json(
                    "accept",
                    Method::POST,
                    self.url(&format!("jobs/{}/accept", job.id)),
                    None,
                    HeaderMap::new(),
                    None,
                    cancel,
                )
            })
            .await
    }

    async fn start_job(&self, job: &Job, cancel: &CancellationToken) -> Result<(), ApiError> {
        let retrier = Retrier::constant(10, Duration::from_secs(5));
        retrier
            .run(cancel, "start", |_| async {
                self.send(
                    "start",
                    Method::POST,
                    self.url(&format!("jobs/{}/start", job.id)),
                    Some(serde_json::json!({
                        "started_at": job.started_at.map(|t| t.to_rfc3339()),
                    })),
                    HeaderMap::new(),
                    None,
                    cancel,
                )
                .await
                .map(|_| ())
            })
            .await
    }

    async fn finish_job(&self, job: &Job, cancel: &CancellationToken) -> Result<(), ApiError> {
        let retrier = Retrier::forever(Duration::from_secs(5));
        retrier
            .run(cancel, "finish", |_| async {
                self.send(
                    "finish",
                    Method::POST,
                    self.url(&format!("jobs/{}/finish", job.id)),
                    Some(serde_json::json!({
                        "exit_status": job.exit_status,
                        "signal": job.signal,
                        "signal_reason": job.signal_reason,
                        "finished_at": job.finished_at.map(|t| t.to_rfc3339()),
                        "chunks_failed_count": job.chunks_failed_count,
                    })),
                    HeaderMap::new(),
                    None,
                    cancel,
                )
                .await
                .map(|_| ())
            })
            .await
    }

    async fn upload_chunk(
        &self,
        job_id: &JobId,
        chunk: &Chunk,
        cancel: &CancellationToken,
    ) -> Result<(), ApiError> {
        let retrier = Retrier::forever(Duration::from_secs(5));
        let url = format!(
            "{}?sequence={}&offset={}",
            self.url(&format!("jobs/{}/chunks", job_id)),
            chunk.sequence,
            chunk.offset,
        );
        retrier
            .run(cancel, "upload-chunk", |_| {
                let url = url.clone();
                let data = chunk.data.clone();
                async move {
                    let binding = self.snapshot();
                    let headers = self.headers_for(&binding)?;
                    let response = tokio::select! {
                        r = self
                            .http
                            .post(url)
                            .headers(headers)
                            .header("Content-Type", "application/octet-stream")
                            .body(data)
                            .send() => r.map_err(|e| ApiError::transport("upload-chunk", e))?,
                        _ = cancel.cancelled() => {
                            return Err(ApiError::Canceled { action: "upload-chunk" })
                        }
                    };
                    let status = response.status();
                    if status.is_success() {
                        return Ok(());
                    }
                    let body = response.text().await.unwrap_or_default();
                    Err(ApiError::Status {
                        action: "upload-chunk",
                        status: status.as_u16(),
                        body: body.trim().to_string(),
                    })
                }
            })
            .await
    }

    async fn upload_header_times(
        &self,
        job_id: &JobId,
        times: &BTreeMap<u64, String>,
        cancel: &CancellationToken,
    ) -> Result<(), ApiError> {
        let retrier = Retrier::constant(10, Duration::from_secs(5));
        let body = serde_json::json!({ "header_times": times });
        retrier
            .run(cancel, "header-times", |_| {
                let body = body.clone();
                async move {
                    self.send(
                        "header-times",
                        Method::POST,
                        self.url(&format!("jobs/{}/header_times", job_id)),
                        Some(body),
                        HeaderMap::new(),
                        None,
                        cancel,
                    )
                    .await
                    .map(|_| ())
                }
            })
            .await
    }

    async fn job_state(
        &self,
        job_id: &JobId,
        cancel: &CancellationToken,
    ) -> Result<JobState, ApiError> {
        let response: JobStateResponse = self
            .send_json(
                "job-state",
                Method::GET,
                self.url(&format!("jobs/{}", job_id)),
                None,
                HeaderMap::new(),
                None,
                cancel,
            )
            .await?;
        Ok(response.state)
    }

    async fn disconnect(&self, cancel: &CancellationToken) -> Result<(), ApiError> {
        tracing::info!("Disconnecting...");
        let retrier = Retrier::constant(4, Duration::from_secs(1));
        let response: DisconnectResponse = retrier
            .run(cancel, "disconnect", |_| {
                self.send_json(
                    "disconnect",
                    Method::POST,
                    self.url("disconnect"),
                    None,
                    HeaderMap::new(),
                    None,
                    cancel,
                )
            })
            .await?;
        tracing::info!(connection_state = %response.connection_state, "Disconnected");
        Ok(())
    }
}

#[cfg(test)]
#[path = "client_tests.rs"]
mod tests;
