// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn normalized_clamps_zero_intervals() {
    let reg = AgentRegistration::builder()
        .ping_interval(0)
        .heartbeat_interval(0)
        .job_status_interval(0)
        .build()
        .normalized();
    assert_eq!(reg.ping_interval, 1);
    assert_eq!(reg.heartbeat_interval, 1);
    assert_eq!(reg.job_status_interval, 1);
}

#[test]
fn normalized_keeps_sane_intervals() {
    let reg = AgentRegistration::builder().ping_interval(10).build().normalized();
    assert_eq!(reg.ping_interval, 10);
}

#[test]
fn deserializes_with_missing_optional_fields() {
    let reg: AgentRegistration = serde_json::from_str(
        r#"{"uuid":"u1","name":"n","access_token":"t","endpoint":"https://api.example.com/v3"}"#,
    )
    .unwrap();
    assert_eq!(reg.ping_interval, 1);
    assert!(reg.request_headers.is_empty());
}
