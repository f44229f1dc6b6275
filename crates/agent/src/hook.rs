// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Pre-bootstrap hook execution.
//!
//! The hook sees the job's environment and gets a veto: any non-zero
//! exit refuses the job before the executor is spawned.

use crate::error::AgentError;
use std::collections::HashMap;
use std::path::Path;
use tokio::process::Command;

pub async fn run_pre_bootstrap(
    hook: &Path,
    env: &HashMap<String, String>,
) -> Result<i32, AgentError> {
    let output = Command::new(hook)
        .envs(env)
        .kill_on_drop(true)
        .output()
        .await
        .map_err(|e| AgentError::Hook(format!("{}: {}", hook.display(), e)))?;

    let code = output.status.code().unwrap_or(-1);
    if code != 0 {
        let stderr = String::from_utf8_lossy(&output.stderr);
        tracing::warn!(
            hook = %hook.display(),
            exit_code = code,
            stderr = %stderr.trim(),
            "pre-bootstrap hook refused the job"
        );
    }
    Ok(code)
}

#[cfg(test)]
#[path = "hook_tests.rs"]
mod tests;
