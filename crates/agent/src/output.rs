// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared job-output buffer between the executor and the log pump.
//!
//! The executor appends; the pump drains from a read cursor. Closing the
//! buffer makes further executor writes fail the way a broken pipe
//! would, which is how the runner stops a job whose logs can no longer
//! be delivered.

use parking_lot::Mutex;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
#[error("output buffer closed")]
pub struct OutputClosed;

#[derive(Default)]
struct Buf {
    data: Vec<u8>,
    cursor: usize,
    closed: bool,
}

#[derive(Clone, Default)]
pub struct OutputBuffer {
    inner: Arc<Mutex<Buf>>,
}

impl OutputBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn write(&self, bytes: &[u8]) -> Result<(), OutputClosed> {
        let mut buf = self.inner.lock();
        if buf.closed {
            return Err(OutputClosed);
        }
        buf.data.extend_from_slice(bytes);
        Ok(())
    }

    /// Bytes appended since the previous drain.
    pub fn drain_new(&self) -> Vec<u8> {
        let mut buf = self.inner.lock();
        let new = buf.data[buf.cursor..].to_vec();
        buf.cursor = buf.data.len();
        new
    }

    pub fn close(&self) {
        self.inner.lock().closed = true;
    }

    pub fn is_closed(&self) -> bool {
        self.inner.lock().closed
    }

    /// Everything written so far, drained or not.
    pub fn contents(&self) -> Vec<u8> {
        self.inner.lock().data.clone()
    }
}

#[cfg(test)]
#[path = "output_tests.rs"]
mod tests;
