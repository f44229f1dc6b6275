// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Push-mode work solicitation over a long-lived stream.
//!
//! While the stream is healthy this loop holds the toggle token, so the
//! poll loop stays quiet. A broken or closed stream releases the token
//! (poll takes over) and reconnects after the reconnect interval. In
//! stream-only mode an unrecoverable stream error is fatal; otherwise
//! it demotes the worker to polling for good.

use super::{jitter_within, ActionMessage, Toggle, WorkerInner};
use crate::config::TransportMode;
use crate::error::AgentError;
use futures_util::StreamExt;
use navvy_api::{ControlApi, StreamEvent};
use navvy_core::Action;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};

enum StreamEnd {
    Reconnect,
    Stop,
    /// Give up on streaming permanently; the poll loop takes over.
    Fallback,
    Fatal(AgentError),
}

pub(crate) async fn run<A: ControlApi + 'static>(
    inner: Arc<WorkerInner<A>>,
    tx: mpsc::Sender<ActionMessage>,
    toggle: Toggle,
) -> Result<(), AgentError> {
    let stream_only = inner.config.transport == TransportMode::StreamOnly;
    let ping_interval = Duration::from_secs(inner.registration.ping_interval);
    let reconnect_interval = if stream_only {
        ping_interval
    } else {
        ping_interval.max(Duration::from_secs(10))
    };

    let mut first = true;
    loop {
        let delay = if first {
            jitter_within(Duration::from_secs(1))
        } else {
            reconnect_interval + jitter_within(reconnect_interval)
        };
        first = false;
        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = inner.graceful.cancelled() => return Ok(()),
        }

        let mut stream = match inner.api.stream_pings(&inner.graceful).await {
            Ok(stream) => stream,
            Err(err) if err.unrecoverable() => {
                if stream_only {
                    tracing::error!(worker = %inner.id, error = %err, "ping stream rejected; stopping worker");
                    inner.stop_ungracefully();
                    return Err(err.into());
                }
                tracing::warn!(worker = %inner.id, error = %err, "ping stream rejected; falling back to polling");
                return Ok(());
            }
            Err(err) => {
                tracing::warn!(worker = %inner.id, error = %err, "ping stream connect failed");
                continue;
            }
        };

        // Stream is live: own the toggle so polling pauses.
        tokio::select! {
            _ = toggle.acquire() => {}
            _ = inner.graceful.cancelled() => return Ok(()),
        }
        tracing::debug!(worker = %inner.id, "ping stream connected");

        let end = consume(&inner, &tx, &mut stream, stream_only).await;
        toggle.release();

        match end {
            StreamEnd::Reconnect => continue,
            StreamEnd::Stop => return Ok(()),
            StreamEnd::Fallback => return Ok(()),
            StreamEnd::Fatal(err) => {
                inner.stop_ungracefully();
                return Err(err);
            }
        }
    }
}

async fn consume<A: ControlApi + 'static>(
    inner: &Arc<WorkerInner<A>>,
    tx: &mpsc::Sender<ActionMessage>,
    stream: &mut navvy_api::EventStream,
    stream_only: bool,
) -> StreamEnd {
    loop {
        let item = tokio::select! {
            item = stream.next() => item,
            _ = inner.graceful.cancelled() => return StreamEnd::Stop,
        };

        let event = match item {
            Some(Ok(event)) => event,
            Some(Err(err)) => {
                let unrecoverable = err.unrecoverable();
                tracing::warn!(worker = %inner.id, error = %err, "ping stream broke");
                if emit(inner, tx, Action::Continue, None, true).await.is_err() {
                    return StreamEnd::Stop;
                }
                if unrecoverable {
                    return if stream_only {
                        StreamEnd::Fatal(err.into())
                    } else {
                        StreamEnd::Fallback
                    };
                }
                return StreamEnd::Reconnect;
            }
            None => {
                tracing::debug!(worker = %inner.id, "ping stream closed by server");
                let _ = emit(inner, tx, Action::Continue, None, true).await;
                return StreamEnd::Reconnect;
            }
        };

        let sent = match event {
            StreamEvent::Resume => emit(inner, tx, Action::Continue, None, false).await,
            StreamEvent::Pause { reason } => {
                tracing::info!(worker = %inner.id, reason, "server paused this agent");
                emit(inner, tx, Action::Pause, None, false).await
            }
            StreamEvent::Disconnect { reason } => {
                tracing::info!(worker = %inner.id, reason, "server disconnected this agent");
                let _ = emit(inner, tx, Action::Disconnect, None, false).await;
                // Belt and braces: the handler stops us, but make sure.
                inner.stop_gracefully();
                return StreamEnd::Stop;
            }
            StreamEvent::JobAssigned { job } => {
                emit(inner, tx, Action::Continue, Some(job), false).await
            }
        };
        if sent.is_err() {
            return StreamEnd::Stop;
        }
    }
}

async fn emit<A: ControlApi + 'static>(
    inner: &Arc<WorkerInner<A>>,
    tx: &mpsc::Sender<ActionMessage>,
    action: Action,
    job: Option<navvy_core::Job>,
    unhealthy: bool,
) -> Result<(), ()> {
    let (done_tx, done_rx) = oneshot::channel();
    tx.send(ActionMessage { action, job, unhealthy, done: done_tx })
        .await
        .map_err(|_| ())?;
    let _ = done_rx.await;
    inner.state.lock().last_ping_at = Some(std::time::Instant::now());
    Ok(())
}
