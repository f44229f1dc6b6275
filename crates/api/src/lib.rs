// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! navvy-api: typed client surface for the build-orchestration server.
//!
//! One `HttpClient` per worker. Every operation takes a cancellation
//! token and classifies HTTP responses as retryable or unrecoverable so
//! the control plane can decide between backing off and stopping.

mod api;
mod client;
mod error;
mod retry;
mod stream;
pub mod types;

#[cfg(any(test, feature = "test-support"))]
pub mod fake;
#[cfg(any(test, feature = "test-support"))]
pub mod testserver;

pub use api::{ControlApi, EventStream};
pub use client::{HttpClient, RegistrationTemplate};
pub use error::ApiError;
pub use retry::Retrier;
pub use stream::StreamEvent;
pub use types::{Heartbeat, PingResponse};

#[cfg(any(test, feature = "test-support"))]
pub use fake::FakeApi;
