// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

fn status_err(status: u16) -> ApiError {
    ApiError::Status { action: "ping", status, body: String::new() }
}

#[yare::parameterized(
    timeout = { 408, true },
    throttled = { 429, true },
    internal = { 500, true },
    bad_gateway = { 502, true },
    unavailable = { 503, true },
    gateway_timeout = { 504, true },
    unauthorized = { 401, false },
    forbidden = { 403, false },
    not_found = { 404, false },
    unprocessable = { 422, false },
    teapot = { 418, false },
)]
fn status_classification(status: u16, retryable: bool) {
    assert_eq!(status_err(status).retryable(), retryable);
    assert_eq!(status_err(status).unrecoverable(), !retryable);
}

#[test]
fn transport_errors_retry() {
    let err = ApiError::transport("ping", "connection refused");
    assert!(err.retryable());
    assert!(!err.unrecoverable());
}

#[test]
fn locked_is_retryable_with_delay() {
    let err = ApiError::Locked { retry_after: Duration::from_secs(2) };
    assert!(err.retryable());
    assert_eq!(err.status(), Some(423));
}

#[test]
fn rejection_is_terminal() {
    let err = ApiError::AcquisitionRejected;
    assert!(!err.retryable());
    assert_eq!(err.status(), Some(422));
    assert_eq!(err.to_string(), "job acquisition rejected");
}

#[test]
fn client_error_covers_4xx_only() {
    assert!(status_err(404).client_error());
    assert!(!status_err(500).client_error());
}
