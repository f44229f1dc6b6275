// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Header-times streamer.
//!
//! Watches job output for header-expansion lines and records when each
//! one appeared, keyed by its line cursor in the log. Timestamps are
//! batched and uploaded in the background, with a final flush at stop.

use futures_util::future::BoxFuture;
use navvy_api::ApiError;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

/// Uploads one batch of `{line cursor → RFC3339 timestamp}`.
pub type TimesUploader =
    Arc<dyn Fn(BTreeMap<u64, String>) -> BoxFuture<'static, Result<(), ApiError>> + Send + Sync>;

const FLUSH_INTERVAL: Duration = Duration::from_secs(1);

/// A line opens a header group (and therefore gets a timestamp) when it
/// starts with one of the expansion markers.
fn is_header_line(line: &str) -> bool {
    ["---", "+++", "~~~"]
        .iter()
        .any(|marker| line.strip_prefix(marker).is_some_and(|rest| rest.starts_with(' ')))
}

#[derive(Default)]
struct ScanState {
    /// Lines seen so far, including the partial tail.
    cursor: u64,
    partial: String,
    pending: BTreeMap<u64, String>,
}

pub struct HeaderTimesStreamer {
    state: Arc<Mutex<ScanState>>,
    uploader: TimesUploader,
    flusher: Mutex<Option<JoinHandle<()>>>,
}

impl HeaderTimesStreamer {
    pub fn start(uploader: TimesUploader) -> Self {
        let state = Arc::new(Mutex::new(ScanState::default()));

        let flusher = {
            let state = Arc::clone(&state);
            let uploader = Arc::clone(&uploader);
            tokio::spawn(async move {
                loop {
                    tokio::time::sleep(FLUSH_INTERVAL).await;
                    flush(&state, &uploader).await;
                }
            })
        };

        Self { state, uploader, flusher: Mutex::new(Some(flusher)) }
    }

    /// Feed raw output. Partial lines are buffered until their newline
    /// arrives.
    pub fn scan(&self, text: &str) {
        let mut state = self.state.lock();
        let mut buffered = std::mem::take(&mut state.partial);
        buffered.push_str(text);

        let mut rest = buffered.as_str();
        while let Some(pos) = rest.find('\n') {
            let line = &rest[..pos];
            let cursor = state.cursor;
            if is_header_line(line) {
                state.pending.insert(cursor, chrono::Utc::now().to_rfc3339());
            }
            state.cursor += 1;
            rest = &rest[pos + 1..];
        }
        state.partial = rest.to_string();
    }

    /// Stop the periodic flusher and upload anything still buffered.
    pub async fn stop(&self) {
        let flusher = self.flusher.lock().take();
        if let Some(flusher) = flusher {
            flusher.abort();
            let _ = flusher.await;
        }
        flush(&self.state, &self.uploader).await;
    }

    #[cfg(test)]
    fn pending_len(&self) -> usize {
        self.state.lock().pending.len()
    }
}

async fn flush(state: &Arc<Mutex<ScanState>>, uploader: &TimesUploader) {
    let batch = std::mem::take(&mut state.lock().pending);
    if batch.is_empty() {
        return;
    }
    if let Err(err) = uploader(batch.clone()).await {
        tracing::warn!(error = %err, "header times upload failed; requeueing batch");
        let mut state = state.lock();
        for (cursor, time) in batch {
            state.pending.entry(cursor).or_insert(time);
        }
    }
}

#[cfg(test)]
#[path = "headertimes_tests.rs"]
mod tests;
