// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use std::io::Write;
use std::os::unix::fs::PermissionsExt;

fn write_hook(dir: &tempfile::TempDir, body: &str) -> std::path::PathBuf {
    let path = dir.path().join("pre-bootstrap");
    let mut file = std::fs::File::create(&path).unwrap();
    writeln!(file, "#!/bin/sh\n{}", body).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path
}

#[tokio::test]
async fn passing_hook_returns_zero() {
    let dir = tempfile::tempdir().unwrap();
    let hook = write_hook(&dir, "exit 0");
    let code = run_pre_bootstrap(&hook, &HashMap::new()).await.unwrap();
    assert_eq!(code, 0);
}

#[tokio::test]
async fn refusing_hook_returns_its_exit_code() {
    let dir = tempfile::tempdir().unwrap();
    let hook = write_hook(&dir, "echo refused >&2; exit 3");
    let code = run_pre_bootstrap(&hook, &HashMap::new()).await.unwrap();
    assert_eq!(code, 3);
}

#[tokio::test]
async fn hook_sees_the_job_environment() {
    let dir = tempfile::tempdir().unwrap();
    let hook = write_hook(&dir, "test \"$NAVVY_TEST_VAR\" = yes");
    let env = HashMap::from([("NAVVY_TEST_VAR".to_string(), "yes".to_string())]);
    assert_eq!(run_pre_bootstrap(&hook, &env).await.unwrap(), 0);
}

#[tokio::test]
async fn missing_hook_is_an_error() {
    let err = run_pre_bootstrap(Path::new("/nonexistent/hook"), &HashMap::new())
        .await
        .unwrap_err();
    assert!(matches!(err, AgentError::Hook(_)));
}
