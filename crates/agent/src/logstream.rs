// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Streaming log uploader.
//!
//! `process` splits incoming bytes into chunks of at most
//! `max_chunk_bytes` and enqueues them; a pool of workers delivers each
//! chunk to the uploader callback. Sequence numbers are assigned at
//! enqueue time and are the server's authoritative order — workers may
//! deliver out of order. The callback owns retry; the streamer only
//! counts failures.

use futures_util::future::BoxFuture;
use navvy_api::ApiError;
use navvy_core::Chunk;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Delivers one chunk. Expected to retry transient failures for a long
/// time so logs survive server outages.
pub type Uploader = Arc<dyn Fn(Chunk) -> BoxFuture<'static, Result<(), ApiError>> + Send + Sync>;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum LogStreamError {
    #[error("streamer is stopped")]
    Stopped,
    #[error("streamer canceled")]
    Canceled,
}

#[derive(Debug, Clone)]
pub struct LogStreamerConfig {
    pub max_chunk_bytes: u64,
    /// Total-size cap; exceeded input is still delivered but warned
    /// about once (the server may drop it).
    pub max_total_bytes: u64,
    pub concurrency: usize,
    pub queue_depth: usize,
}

impl Default for LogStreamerConfig {
    fn default() -> Self {
        Self {
            max_chunk_bytes: navvy_core::job::DEFAULT_CHUNK_BYTES,
            max_total_bytes: 1024 * 1024 * 1024,
            concurrency: 3,
            queue_depth: 16,
        }
    }
}

struct Counters {
    sequence: AtomicU64,
    offset: AtomicU64,
    failed: AtomicU64,
    size_warned: AtomicBool,
}

pub struct LogStreamer {
    config: LogStreamerConfig,
    tx: Mutex<Option<mpsc::Sender<Chunk>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    counters: Arc<Counters>,
}

impl LogStreamer {
    /// Create the streamer and launch its upload workers.
    pub fn start(config: LogStreamerConfig, uploader: Uploader) -> Self {
        let (tx, rx) = mpsc::channel::<Chunk>(config.queue_depth.max(1));
        let rx = Arc::new(tokio::sync::Mutex::new(rx));
        let counters = Arc::new(Counters {
            sequence: AtomicU64::new(0),
            offset: AtomicU64::new(0),
            failed: AtomicU64::new(0),
            size_warned: AtomicBool::new(false),
        });

        let mut workers = Vec::with_capacity(config.concurrency.max(1));
        for _ in 0..config.concurrency.max(1) {
            let rx = Arc::clone(&rx);
            let uploader = Arc::clone(&uploader);
            let counters = Arc::clone(&counters);
            workers.push(tokio::spawn(async move {
                loop {
                    let chunk = { rx.lock().await.recv().await };
                    let Some(chunk) = chunk else { break };
                    let sequence = chunk.sequence;
                    if let Err(err) = uploader(chunk).await {
                        counters.failed.fetch_add(1, Ordering::SeqCst);
                        tracing::warn!(sequence, error = %err, "log chunk upload failed");
                    }
                }
            }));
        }

        Self { config, tx: Mutex::new(Some(tx)), workers: Mutex::new(workers), counters }
    }

    /// Split `data` into chunks and enqueue them in order. Blocks when
    /// the queue is full; fails fast once stopped or canceled.
    pub async fn process(&self, data: &[u8], cancel: &CancellationToken) -> Result<(), LogStreamError> {
        if data.is_empty() {
            return Ok(());
        }
        let tx = self.tx.lock().clone().ok_or(LogStreamError::Stopped)?;

        let total_after = self.counters.offset.load(Ordering::SeqCst) + data.len() as u64;
        if total_after > self.config.max_total_bytes
            && !self.counters.size_warned.swap(true, Ordering::SeqCst)
        {
            tracing::warn!(
                limit = self.config.max_total_bytes,
                "job log exceeds the total size limit; the server may drop further output"
            );
        }

        for piece in data.chunks(self.config.max_chunk_bytes.max(1) as usize) {
            let sequence = self.counters.sequence.fetch_add(1, Ordering::SeqCst) + 1;
            let offset = self.counters.offset.fetch_add(piece.len() as u64, Ordering::SeqCst);
            let chunk = Chunk {
                data: piece.to_vec(),
                sequence,
                offset,
                size: piece.len() as u64,
            };
            tokio::select! {
                sent = tx.send(chunk) => {
                    if sent.is_err() {
                        return Err(LogStreamError::Stopped);
                    }
                }
                _ = cancel.cancelled() => return Err(LogStreamError::Canceled),
            }
        }
        Ok(())
    }

    /// Close the queue and wait for the workers to drain it. Idempotent.
    pub async fn stop(&self) {
        let closed = self.tx.lock().take();
        drop(closed);
        let workers = std::mem::take(&mut *self.workers.lock());
        for worker in workers {
            let _ = worker.await;
        }
    }

    pub fn failed_chunks(&self) -> u64 {
        self.counters.failed.load(Ordering::SeqCst)
    }

    /// Bytes accepted so far.
    pub fn bytes_processed(&self) -> u64 {
        self.counters.offset.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
#[path = "logstream_tests.rs"]
mod tests;
