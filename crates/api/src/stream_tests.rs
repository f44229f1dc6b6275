// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn stream_url_swaps_scheme_and_appends_path() {
    let url = stream_url("https://agent.example.com/v3", "uuid-1").unwrap();
    assert_eq!(url.as_str(), "wss://agent.example.com/v3/agents/uuid-1/pings/stream");

    let url = stream_url("http://127.0.0.1:8021", "uuid-2").unwrap();
    assert_eq!(url.as_str(), "ws://127.0.0.1:8021/agents/uuid-2/pings/stream");
}

#[test]
fn stream_url_rejects_garbage() {
    assert!(stream_url("not a url", "u").is_err());
}

#[yare::parameterized(
    resume = { r#"{"event":"resume"}"#, StreamEvent::Resume },
    pause = { r#"{"event":"pause","reason":"maintenance"}"#, StreamEvent::Pause { reason: "maintenance".into() } },
    disconnect = { r#"{"event":"disconnect","reason":"draining"}"#, StreamEvent::Disconnect { reason: "draining".into() } },
)]
fn parses_control_frames(text: &str, expected: StreamEvent) {
    assert_eq!(parse_frame(text).unwrap(), expected);
}

#[test]
fn parses_job_assignment() {
    let event = parse_frame(r#"{"event":"job_assigned","job":{"id":"j-1"}}"#).unwrap();
    match event {
        StreamEvent::JobAssigned { job } => assert_eq!(job.id.as_str(), "j-1"),
        other => panic!("unexpected event: {:?}", other),
    }
}

#[test]
fn malformed_assignment_is_an_error() {
    assert!(parse_frame(r#"{"event":"job_assigned","job":"nope"}"#).is_err());
    assert!(parse_frame("garbage").is_err());
}
