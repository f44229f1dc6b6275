// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::config::AgentConfig;
use navvy_core::Job;
use std::collections::HashMap;

fn job_for(repository: Option<&str>, plugins: &[&str]) -> Job {
    let mut job = Job::builder().build();
    job.step.command = "make test".to_string();
    job.step.repository = repository.map(String::from);
    job.step.plugins = plugins.iter().map(|s| s.to_string()).collect();
    job
}

fn validator(mutate: impl FnOnce(&mut AgentConfig)) -> Validator {
    let mut config = AgentConfig::default();
    mutate(&mut config);
    Validator::from_config(&config).unwrap()
}

#[test]
fn everything_allowed_by_default() {
    let validator = validator(|_| {});
    assert!(validator.check(&job_for(Some("git@github.com:acme/app.git"), &["docker"])).is_ok());
}

#[test]
fn repository_allow_list_is_a_full_match() {
    let validator =
        validator(|c| c.allowed_repositories = vec![r"git@github\.com:acme/.*".to_string()]);

    assert!(validator.check(&job_for(Some("git@github.com:acme/app.git"), &[])).is_ok());

    let refusal = validator.check(&job_for(Some("git@evil.example.com:acme/app.git"), &[]))
        .unwrap_err();
    assert_eq!(refusal.reason, SignalReason::AgentRefused);

    // A missing repository cannot satisfy a non-empty allow list.
    assert!(validator.check(&job_for(None, &[])).is_err());
}

#[test]
fn plugin_allow_list_checks_each_plugin() {
    let validator = validator(|c| c.allowed_plugins = vec![r"github\.com/acme/.*".to_string()]);
    assert!(validator.check(&job_for(None, &["github.com/acme/cache"])).is_ok());
    assert!(validator
        .check(&job_for(None, &["github.com/acme/cache", "github.com/other/thing"]))
        .is_err());
}

#[test]
fn env_patterns_are_globs() {
    let validator = validator(|c| c.allowed_env = vec!["CI_*".to_string(), "PATH".to_string()]);

    let mut job = job_for(None, &[]);
    job.env = HashMap::from([("CI_NODE".to_string(), "1".to_string())]);
    assert!(validator.check(&job).is_ok());

    job.env = HashMap::from([("LD_PRELOAD".to_string(), "evil.so".to_string())]);
    let refusal = validator.check(&job).unwrap_err();
    assert_eq!(refusal.reason, SignalReason::AgentRefused);
    assert!(refusal.message.contains("LD_PRELOAD"));
}

#[test]
fn signature_verifies_against_the_key() {
    let validator = validator(|c| c.verification_key = Some("sekrit".to_string()));

    let mut job = job_for(Some("repo"), &["plugin"]);
    job.step.signature = Some(step_signature("sekrit", &job.step));
    assert!(validator.check(&job).is_ok());
}

#[yare::parameterized(
    tampered = { Some("not the right digest") },
    unsigned = { None },
)]
fn bad_signatures_are_rejected(signature: Option<&str>) {
    let validator = validator(|c| c.verification_key = Some("sekrit".to_string()));
    let mut job = job_for(Some("repo"), &[]);
    job.step.signature = signature.map(String::from);

    let refusal = validator.check(&job).unwrap_err();
    assert_eq!(refusal.reason, SignalReason::SignatureRejected);
}

#[test]
fn signature_covers_the_command() {
    let mut step = navvy_core::StepDescriptor { command: "make".into(), ..Default::default() };
    let original = step_signature("k", &step);
    step.command = "make evil".into();
    assert_ne!(original, step_signature("k", &step));
}
