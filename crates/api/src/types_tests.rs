// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn ping_response_with_job_assignment() {
    let ping: PingResponse = serde_json::from_str(
        r#"{"action":"","job":{"id":"j-1","token":"tok"}}"#,
    )
    .unwrap();
    assert_eq!(ping.action, Action::Continue);
    assert_eq!(ping.job.unwrap().id.as_str(), "j-1");
}

#[test]
fn ping_response_defaults_to_continue() {
    let ping: PingResponse = serde_json::from_str("{}").unwrap();
    assert_eq!(ping.action, Action::Continue);
    assert!(ping.job.is_none());
    assert!(ping.endpoint.is_none());
}

#[test]
fn ping_response_carries_redirect() {
    let ping: PingResponse = serde_json::from_str(
        r#"{"action":"pause","message":"maintenance","endpoint":"https://b.example.com","request_headers":{"X-Routing":"b"}}"#,
    )
    .unwrap();
    assert_eq!(ping.action, Action::Pause);
    assert_eq!(ping.endpoint.as_deref(), Some("https://b.example.com"));
    assert_eq!(ping.request_headers.unwrap().get("X-Routing").map(String::as_str), Some("b"));
}

#[test]
fn disconnect_response_shape() {
    let resp: DisconnectResponse =
        serde_json::from_str(r#"{"id":"fakeuuid","connection_state":"disconnected"}"#).unwrap();
    assert_eq!(resp.connection_state, "disconnected");
}
