// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::api::ControlApi;
use crate::testserver::{CannedResponse, ScriptedServer};
use navvy_core::JobId;
use std::time::Instant as StdInstant;

fn client_for(server: &ScriptedServer) -> HttpClient {
    HttpClient::new(server.url(), "llamas")
}

#[tokio::test]
async fn disconnect_happy_path_sends_one_request() {
    let server = ScriptedServer::start(vec![CannedResponse::new(
        200,
        r#"{"id":"fakeuuid","connection_state":"disconnected"}"#,
    )])
    .await
    .unwrap();
    let client = client_for(&server);
    let cancel = CancellationToken::new();

    client.disconnect(&cancel).await.unwrap();

    assert_eq!(server.request_lines(), vec!["POST /disconnect"]);
}

#[tokio::test]
async fn disconnect_retries_through_transient_failures() {
    let server = ScriptedServer::start(vec![
        CannedResponse::new(500, "oops"),
        CannedResponse::new(500, "oops"),
        CannedResponse::new(200, r#"{"id":"fakeuuid","connection_state":"disconnected"}"#),
    ])
    .await
    .unwrap();
    let client = client_for(&server);
    let cancel = CancellationToken::new();
    let start = StdInstant::now();

    client.disconnect(&cancel).await.unwrap();

    // Two failures means two one-second sleeps between the attempts.
    assert!(start.elapsed() >= Duration::from_secs(2));
    assert_eq!(server.request_lines().len(), 3);
}

#[tokio::test]
async fn disconnect_gives_up_after_four_attempts() {
    let server = ScriptedServer::start(vec![
        CannedResponse::new(500, ""),
        CannedResponse::new(500, ""),
        CannedResponse::new(500, ""),
        CannedResponse::new(500, ""),
    ])
    .await
    .unwrap();
    let client = client_for(&server);
    let cancel = CancellationToken::new();

    let err = client.disconnect(&cancel).await.unwrap_err();
    assert_eq!(err.status(), Some(500));
    assert_eq!(server.request_lines().len(), 4);
}

#[tokio::test]
async fn acquire_rejected_maps_422_to_sentinel() {
    let server = ScriptedServer::start(vec![CannedResponse::new(422, "no")]).await.unwrap();
    let client = client_for(&server);
    let cancel = CancellationToken::new();

    let err = client.acquire_job(&JobId::new("some-uuid"), &cancel).await.unwrap_err();
    assert!(matches!(err, ApiError::AcquisitionRejected));
    assert_eq!(server.request_lines(), vec!["POST /jobs/some-uuid/acquire"]);
}

#[tokio::test]
async fn acquire_locked_follows_server_backoff_then_surfaces() {
    // Base-2 growth as the server would send, scaled down so the test
    // runs in well under a second. Float Retry-After is part of the
    // protocol.
    let script = (0..7)
        .map(|n| {
            CannedResponse::new(423, "")
                .header("Retry-After", format!("{}", f64::from(1u32 << n) / 100.0))
        })
        .collect();
    let server = ScriptedServer::start(script).await.unwrap();
    let client = client_for(&server);
    let cancel = CancellationToken::new();
    let start = StdInstant::now();

    let err = client.acquire_job(&JobId::new("some-uuid"), &cancel).await.unwrap_err();

    assert!(matches!(err, ApiError::Locked { .. }));
    // Slept 0.01+0.02+0.04+0.08+0.16+0.32 between the seven attempts.
    assert!(start.elapsed() >= Duration::from_millis(630));
    let requests = server.requests();
    assert_eq!(requests.len(), 7);
    assert_eq!(requests[0].header("X-Buildkite-Lock-Acquire-Job"), Some("1"));
    assert_eq!(requests[0].header("X-Buildkite-Backoff-Sequence"), Some("0"));
    assert_eq!(requests[6].header("X-Buildkite-Backoff-Sequence"), Some("6"));
}

#[tokio::test]
async fn acquire_success_parses_job() {
    let server = ScriptedServer::start(vec![CannedResponse::new(
        200,
        r#"{"id":"some-uuid","token":"job-tok"}"#,
    )])
    .await
    .unwrap();
    let client = client_for(&server);
    let cancel = CancellationToken::new();

    let job = client.acquire_job(&JobId::new("some-uuid"), &cancel).await.unwrap();
    assert_eq!(job.id.as_str(), "some-uuid");
    assert_eq!(job.token, "job-tok");
}

#[tokio::test]
async fn ping_carries_redirects_and_requests_authenticate() {
    let server = ScriptedServer::start(vec![CannedResponse::new(
        200,
        r#"{"action":"","endpoint":"https://b.example.com","request_headers":{"X-Routing":"b"}}"#,
    )])
    .await
    .unwrap();
    let client = client_for(&server);
    let cancel = CancellationToken::new();

    let ping = client.ping(&cancel).await.unwrap();
    assert_eq!(ping.endpoint.as_deref(), Some("https://b.example.com"));

    let requests = server.requests();
    assert_eq!(requests[0].header("Authorization"), Some("Token llamas"));
}

#[tokio::test]
async fn rebind_applies_headers_to_subsequent_requests() {
    let server = ScriptedServer::start(vec![
        CannedResponse::new(200, "{}"),
        CannedResponse::new(200, "{}"),
    ])
    .await
    .unwrap();
    let client = client_for(&server);
    let cancel = CancellationToken::new();

    let mut headers = HashMap::new();
    headers.insert("X-Routing".to_string(), "b".to_string());
    client.rebind(None, Some(&headers));
    client.ping(&cancel).await.unwrap();

    // Empty map removes previously-set headers.
    client.rebind(None, Some(&HashMap::new()));
    client.ping(&cancel).await.unwrap();

    let requests = server.requests();
    assert_eq!(requests[0].header("X-Routing"), Some("b"));
    assert_eq!(requests[1].header("X-Routing"), None);
}

#[tokio::test]
async fn job_state_parses_cancellation() {
    let server = ScriptedServer::start(vec![CannedResponse::new(200, r#"{"state":"canceling"}"#)])
        .await
        .unwrap();
    let client = client_for(&server);
    let cancel = CancellationToken::new();

    let state = client.job_state(&JobId::new("j-1"), &cancel).await.unwrap();
    assert!(state.wants_cancel());
    assert_eq!(server.request_lines(), vec!["GET /jobs/j-1"]);
}

#[tokio::test]
async fn upload_chunk_stops_on_client_error() {
    let server = ScriptedServer::start(vec![CannedResponse::new(404, "gone")]).await.unwrap();
    let client = client_for(&server);
    let cancel = CancellationToken::new();
    let chunk = Chunk::new(b"log data".to_vec(), 1, 0, 1024).unwrap();

    let err = client.upload_chunk(&JobId::new("j-1"), &chunk, &cancel).await.unwrap_err();
    assert!(err.client_error());
    assert_eq!(server.request_lines().len(), 1);
}

#[tokio::test]
async fn upload_chunk_carries_sequence_and_offset() {
    let server = ScriptedServer::start(vec![CannedResponse::new(200, "")]).await.unwrap();
    let client = client_for(&server);
    let cancel = CancellationToken::new();
    let chunk = Chunk::new(b"abc".to_vec(), 3, 200, 1024).unwrap();

    client.upload_chunk(&JobId::new("j-1"), &chunk, &cancel).await.unwrap();

    let requests = server.requests();
    assert_eq!(requests[0].path, "/jobs/j-1/chunks?sequence=3&offset=200");
    assert_eq!(requests[0].body, "abc");
}

#[tokio::test]
async fn finish_reports_the_verdict() {
    let server = ScriptedServer::start(vec![CannedResponse::new(200, "")]).await.unwrap();
    let client = client_for(&server);
    let cancel = CancellationToken::new();

    let mut job = navvy_core::Job::builder().id("j-1").build();
    job.exit_status = Some(0);
    job.finished_at = Some(chrono::Utc::now());
    client.finish_job(&job, &cancel).await.unwrap();

    let requests = server.requests();
    let body: serde_json::Value = serde_json::from_str(&requests[0].body).unwrap();
    assert_eq!(body["exit_status"], 0);
    assert_eq!(body["signal_reason"], "");
}

#[tokio::test]
async fn finish_stops_retrying_on_422() {
    let server = ScriptedServer::start(vec![CannedResponse::new(422, "already finished")])
        .await
        .unwrap();
    let client = client_for(&server);
    let cancel = CancellationToken::new();

    let job = navvy_core::Job::builder().id("j-1").build();
    let err = client.finish_job(&job, &cancel).await.unwrap_err();
    assert_eq!(err.status(), Some(422));
    assert_eq!(server.request_lines().len(), 1);
}

#[tokio::test]
async fn register_adopts_the_assigned_binding() {
    let server = ScriptedServer::start(vec![CannedResponse::new(
        200,
        r#"{"uuid":"u-1","name":"pool-1","access_token":"at","endpoint":"https://assigned.example.com","ping_interval":0}"#,
    )])
    .await
    .unwrap();
    let client = client_for(&server);
    let cancel = CancellationToken::new();

    let template = RegistrationTemplate {
        name: "pool-1".into(),
        hostname: "host".into(),
        version: "0.3.0".into(),
        tags: vec![],
    };
    let registration = client.register(&template, &cancel).await.unwrap();

    // Intervals are clamped to the protocol minimum.
    assert_eq!(registration.ping_interval, 1);
    // Registration was sent with the agent token; the binding now
    // carries the assigned endpoint and access token.
    let requests = server.requests();
    assert_eq!(requests[0].header("Authorization"), Some("Token llamas"));
    assert_eq!(client.endpoint(), "https://assigned.example.com");
}
