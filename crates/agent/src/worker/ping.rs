// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Poll-mode work solicitation.
//!
//! One ping per cycle, one action per ping. Jitter decorrelates a fleet
//! of agents; after a job completes, the interval wait is skipped once
//! (jobs cluster) but jitter still applies so the request rate toward
//! the server stays bounded.

use super::{jitter_within, ActionMessage, ActionOutcome, Toggle, WorkerInner};
use crate::error::AgentError;
use navvy_api::{ControlApi, PingResponse};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, oneshot};

pub(crate) async fn run<A: ControlApi + 'static>(
    inner: Arc<WorkerInner<A>>,
    tx: mpsc::Sender<ActionMessage>,
    toggle: Toggle,
) -> Result<(), AgentError> {
    let interval = Duration::from_secs(inner.registration.ping_interval);
    let mut skip_wait = true; // first ping goes out immediately (after jitter)

    loop {
        if !skip_wait {
            tokio::select! {
                _ = tokio::time::sleep(interval) => {}
                _ = inner.graceful.cancelled() => return Ok(()),
            }
        }
        skip_wait = false;

        let jitter = jitter_within(interval);
        if !jitter.is_zero() {
            tokio::select! {
                _ = tokio::time::sleep(jitter) => {}
                _ = inner.graceful.cancelled() => return Ok(()),
            }
        }

        // The stream loop holds the token while it is healthy; polling
        // only proceeds when the token is free.
        tokio::select! {
            _ = toggle.acquire() => {}
            _ = inner.graceful.cancelled() => return Ok(()),
        }

        let response = inner.api.ping(&inner.graceful).await;
        let response = match response {
            Ok(response) => response,
            Err(err) if err.unrecoverable() => {
                toggle.release();
                tracing::error!(worker = %inner.id, error = %err, "ping rejected; stopping worker");
                inner.stop_ungracefully();
                return Err(err.into());
            }
            Err(err) => {
                toggle.release();
                tracing::warn!(worker = %inner.id, error = %err, "ping failed");
                continue;
            }
        };

        inner.state.lock().last_ping_at = Some(Instant::now());
        let response = apply_redirects(&inner, response).await;

        if let Some(message) = &response.message {
            tracing::info!(worker = %inner.id, "{}", message);
        }

        let (done_tx, done_rx) = oneshot::channel();
        let sent = tx
            .send(ActionMessage {
                action: response.action,
                job: response.job,
                unhealthy: false,
                done: done_tx,
            })
            .await;
        if sent.is_err() {
            toggle.release();
            return Ok(());
        }
        let outcome: ActionOutcome = done_rx.await.unwrap_or_default();
        toggle.release();

        if outcome.ran_job {
            // Ticker reset: poll again right away, jitter only.
            skip_wait = true;
        }
    }
}

/// Adopt server-directed endpoint/header changes.
///
/// An endpoint change is probed first: a ping against the new endpoint
/// must succeed before the binding swaps, and the probe's response
/// becomes the effective ping result. Header-only changes swap
/// immediately.
async fn apply_redirects<A: ControlApi + 'static>(
    inner: &Arc<WorkerInner<A>>,
    response: PingResponse,
) -> PingResponse {
    let current = inner.api.endpoint();
    match &response.endpoint {
        Some(endpoint) if *endpoint != current => {
            match inner.api.ping_at(endpoint, &inner.graceful).await {
                Ok(probe) => {
                    tracing::info!(worker = %inner.id, endpoint, "adopting new endpoint");
                    inner.api.rebind(
                        Some(endpoint.as_str()),
                        probe.request_headers.as_ref().or(response.request_headers.as_ref()),
                    );
                    probe
                }
                Err(err) => {
                    tracing::warn!(
                        worker = %inner.id,
                        endpoint,
                        error = %err,
                        "new endpoint did not answer; keeping the current one"
                    );
                    response
                }
            }
        }
        _ => {
            if let Some(headers) = &response.request_headers {
                inner.api.rebind(None, Some(headers));
            }
            response
        }
    }
}
