// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use assert_cmd::Command;

#[test]
fn help_lists_the_subcommands() {
    let assert = Command::cargo_bin("navvy").unwrap().arg("--help").assert().success();
    let out = String::from_utf8_lossy(&assert.get_output().stdout).into_owned();
    assert!(out.contains("start"));
    assert!(out.contains("acquire"));
}

#[test]
fn start_without_a_token_fails_fast() {
    Command::cargo_bin("navvy")
        .unwrap()
        .arg("start")
        .env_remove("NAVVY_TOKEN")
        .assert()
        .failure()
        .code(1);
}

#[test]
fn acquire_requires_a_job_id() {
    Command::cargo_bin("navvy").unwrap().arg("acquire").assert().failure();
}
