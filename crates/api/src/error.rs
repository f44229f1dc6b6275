// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! API error taxonomy and HTTP status classification.

use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
    /// Connection-level failure (DNS, TCP, TLS, timeout). Always retryable.
    #[error("{action}: transport error: {message}")]
    Transport { action: &'static str, message: String },

    /// The server answered with a non-success status.
    #[error("{action}: server returned {status}: {body}")]
    Status { action: &'static str, status: u16, body: String },

    /// 422 on acquire: the server refused to hand over this job.
    #[error("job acquisition rejected")]
    AcquisitionRejected,

    /// 423 on acquire: someone else holds the claim; retry after the
    /// server-supplied delay.
    #[error("job locked")]
    Locked { retry_after: Duration },

    /// The caller's cancellation token fired mid-request.
    #[error("{action}: canceled")]
    Canceled { action: &'static str },

    /// A response body that should have parsed, didn't.
    #[error("{action}: malformed response: {message}")]
    Malformed { action: &'static str, message: String },
}

impl ApiError {
    pub fn transport(action: &'static str, err: impl std::fmt::Display) -> Self {
        ApiError::Transport { action, message: err.to_string() }
    }

    pub(crate) fn malformed(action: &'static str, err: impl std::fmt::Display) -> Self {
        ApiError::Malformed { action, message: err.to_string() }
    }

    /// Whether a retry loop should try again.
    ///
    /// Transport errors and 408/429/5xx are retryable; `Locked` is
    /// retryable after its server-supplied delay. Everything else —
    /// including every unclassified 4xx — is terminal for the operation.
    pub fn retryable(&self) -> bool {
        match self {
            ApiError::Transport { .. } | ApiError::Locked { .. } => true,
            ApiError::Status { status, .. } => retryable_status(*status),
            ApiError::AcquisitionRejected
            | ApiError::Canceled { .. }
            | ApiError::Malformed { .. } => false,
        }
    }

    /// Whether this error means the worker itself must stop: the server
    /// has told us our credentials or identity are no longer good.
    pub fn unrecoverable(&self) -> bool {
        match self {
            ApiError::Status { status, .. } => !retryable_status(*status),
            _ => false,
        }
    }

    /// True for client-side (4xx) statuses. Used by the upload paths,
    /// which retry forever on everything else.
    pub fn client_error(&self) -> bool {
        matches!(self, ApiError::Status { status, .. } if (400u16..500).contains(status))
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::Status { status, .. } => Some(*status),
            ApiError::Locked { .. } => Some(423),
            ApiError::AcquisitionRejected => Some(422),
            _ => None,
        }
    }
}

fn retryable_status(status: u16) -> bool {
    matches!(status, 408 | 429) || (500..600).contains(&status)
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
