// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Heartbeat loop: periodic liveness, independent of the work loops.

use super::WorkerInner;
use crate::error::AgentError;
use navvy_api::ControlApi;
use std::sync::Arc;
use std::time::{Duration, Instant};

pub(crate) async fn run<A: ControlApi + 'static>(
    inner: Arc<WorkerInner<A>>,
) -> Result<(), AgentError> {
    let interval = Duration::from_secs(inner.registration.heartbeat_interval);

    loop {
        tokio::select! {
            _ = tokio::time::sleep(interval) => {}
            _ = inner.graceful.cancelled() => return Ok(()),
        }

        match inner.api.heartbeat(&inner.graceful).await {
            Ok(beat) => {
                let mut state = inner.state.lock();
                state.last_heartbeat_at = Some(Instant::now());
                state.last_heartbeat_error = None;
                drop(state);
                tracing::debug!(
                    worker = %inner.id,
                    sent_at = %beat.sent_at,
                    received_at = beat.received_at.as_deref().unwrap_or(""),
                    "heartbeat"
                );
            }
            Err(err) if err.unrecoverable() => {
                inner.state.lock().last_heartbeat_error = Some(err.to_string());
                tracing::error!(worker = %inner.id, error = %err, "heartbeat rejected; stopping worker");
                inner.stop_ungracefully();
                return Err(err.into());
            }
            Err(err) => {
                inner.state.lock().last_heartbeat_error = Some(err.to_string());
                tracing::warn!(worker = %inner.id, error = %err, "heartbeat failed");
            }
        }
    }
}
