// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Agent-side error taxonomy.

use navvy_api::ApiError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AgentError {
    #[error(transparent)]
    Api(#[from] ApiError),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("pre-bootstrap hook failed: {0}")]
    Hook(String),

    #[error("health server: {0}")]
    Server(#[source] std::io::Error),
}

impl AgentError {
    /// True when the underlying cause is a server verdict the worker
    /// cannot retry its way out of.
    pub fn unrecoverable(&self) -> bool {
        matches!(self, AgentError::Api(e) if e.unrecoverable())
    }
}
