// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Pre-run job validation.
//!
//! Everything here runs before the executor is spawned. A failure never
//! unwinds the worker: the job finishes with exit status -1 and a
//! refusal signal reason.

use crate::config::AgentConfig;
use navvy_core::{Job, SignalReason, StepDescriptor};
use regex::Regex;
use sha2::{Digest, Sha256};

/// Why a job was refused before running.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Refusal {
    pub reason: SignalReason,
    pub message: String,
}

impl Refusal {
    fn refused(message: impl Into<String>) -> Self {
        Self { reason: SignalReason::AgentRefused, message: message.into() }
    }
}

pub struct Validator {
    verification_key: Option<String>,
    allowed_repositories: Vec<Regex>,
    allowed_plugins: Vec<Regex>,
    allowed_env: Vec<Regex>,
}

impl Validator {
    pub fn from_config(config: &AgentConfig) -> Result<Self, regex::Error> {
        Ok(Self {
            verification_key: config.verification_key.clone(),
            allowed_repositories: compile_full_match(&config.allowed_repositories)?,
            allowed_plugins: compile_full_match(&config.allowed_plugins)?,
            allowed_env: compile_globs(&config.allowed_env)?,
        })
    }

    pub fn check(&self, job: &Job) -> Result<(), Refusal> {
        if let Some(key) = &self.verification_key {
            let expected = step_signature(key, &job.step);
            match &job.step.signature {
                Some(signature) if *signature == expected => {}
                Some(_) => {
                    return Err(Refusal {
                        reason: SignalReason::SignatureRejected,
                        message: "step signature does not verify".to_string(),
                    })
                }
                None => {
                    return Err(Refusal {
                        reason: SignalReason::SignatureRejected,
                        message: "step is unsigned but a verification key is configured"
                            .to_string(),
                    })
                }
            }
        }

        if !self.allowed_repositories.is_empty() {
            let repository = job.step.repository.as_deref().unwrap_or("");
            if !self.allowed_repositories.iter().any(|re| re.is_match(repository)) {
                return Err(Refusal::refused(format!(
                    "repository {:?} is not in the allowed list",
                    repository
                )));
            }
        }

        if !self.allowed_plugins.is_empty() {
            for plugin in &job.step.plugins {
                if !self.allowed_plugins.iter().any(|re| re.is_match(plugin)) {
                    return Err(Refusal::refused(format!(
                        "plugin {:?} is not in the allowed list",
                        plugin
                    )));
                }
            }
        }

        if !self.allowed_env.is_empty() {
            for key in job.env.keys() {
                if !self.allowed_env.iter().any(|re| re.is_match(key)) {
                    return Err(Refusal::refused(format!(
                        "environment variable {:?} is not allowed",
                        key
                    )));
                }
            }
        }

        Ok(())
    }
}

fn compile_full_match(patterns: &[String]) -> Result<Vec<Regex>, regex::Error> {
    patterns.iter().map(|p| Regex::new(&format!("^(?:{})$", p))).collect()
}

/// Config env patterns are globs ("CI_*"), not regexes.
fn compile_globs(patterns: &[String]) -> Result<Vec<Regex>, regex::Error> {
    patterns
        .iter()
        .map(|p| Regex::new(&format!("^{}$", regex::escape(p).replace(r"\*", ".*"))))
        .collect()
}

/// Keyed digest over the canonical step payload.
pub fn step_signature(key: &str, step: &StepDescriptor) -> String {
    let canonical = serde_json::json!({
        "command": step.command,
        "plugins": step.plugins,
        "repository": step.repository,
    });
    let payload = canonical.to_string();
    let mut hasher = Sha256::new();
    hasher.update(key.as_bytes());
    hasher.update(payload.as_bytes());
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
#[path = "validate_tests.rs"]
mod tests;
