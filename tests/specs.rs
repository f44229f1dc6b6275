// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Workspace-level end-to-end specs: the real HTTP client and the full
//! worker control plane against a scripted server.

use navvy_agent::{
    AgentConfig, AgentError, AgentMetrics, FakeExecutor, FakeRun, Pool, TransportMode,
};
use navvy_api::testserver::{CannedResponse, ScriptedServer};
use navvy_api::{ApiError, HttpClient};
use std::sync::Arc;

fn registration_body(server: &ScriptedServer) -> String {
    serde_json::json!({
        "uuid": "agent-uuid-1",
        "name": "pool-1",
        "access_token": "access-token",
        "endpoint": server.url(),
        "ping_interval": 1,
        "heartbeat_interval": 3600,
        "job_status_interval": 3600,
    })
    .to_string()
}

fn pool_for(
    server: &ScriptedServer,
    executor: Arc<FakeExecutor>,
    mutate: impl FnOnce(&mut AgentConfig),
) -> Arc<Pool<HttpClient>> {
    let mut config = AgentConfig::default();
    config.token = "registration-token".to_string();
    config.endpoint = server.url();
    config.name = "pool".to_string();
    config.spawn = 1;
    config.transport = TransportMode::NoStream;
    mutate(&mut config);

    let endpoint = config.endpoint.clone();
    let token = config.token.clone();
    Pool::new(
        Arc::new(config),
        executor,
        AgentMetrics::new(),
        Box::new(move |_| Arc::new(HttpClient::new(endpoint.clone(), token.clone()))),
    )
    .unwrap()
}

#[tokio::test]
async fn register_ping_run_finish_disconnect() {
    let server = ScriptedServer::start(vec![]).await.unwrap();
    server.push(CannedResponse::new(200, registration_body(&server)));
    server.push(CannedResponse::new(
        200,
        r#"{"action":"","job":{"id":"spec-job","token":"job-token"}}"#,
    ));
    server.push(CannedResponse::new(200, r#"{"id":"spec-job","token":"job-token"}"#));
    server.push(CannedResponse::new(200, ""));
    server.push(CannedResponse::new(200, ""));
    server.push(CannedResponse::new(
        200,
        r#"{"id":"agent-uuid-1","connection_state":"disconnected"}"#,
    ));

    let executor = Arc::new(FakeExecutor::new());
    executor.script_run(FakeRun { exit_status: 0, ..FakeRun::default() });
    let pool = pool_for(&server, Arc::clone(&executor), |c| c.disconnect_after_job = true);

    pool.run().await.unwrap();

    let lines = server.request_lines();
    assert_eq!(
        lines,
        vec![
            "POST /register",
            "POST /ping",
            "POST /jobs/spec-job/accept",
            "POST /jobs/spec-job/start",
            "POST /jobs/spec-job/finish",
            "POST /disconnect",
        ]
    );

    let requests = server.requests();
    // Registration authenticates with the agent token; everything after
    // uses the access token the server handed back.
    assert_eq!(requests[0].header("Authorization"), Some("Token registration-token"));
    assert_eq!(requests[1].header("Authorization"), Some("Token access-token"));

    let finish: serde_json::Value = serde_json::from_str(&requests[4].body).unwrap();
    assert_eq!(finish["exit_status"], 0);
    assert_eq!(finish["signal_reason"], "");
    assert_eq!(server.remaining_responses(), 0);
}

#[tokio::test]
async fn job_output_is_chunked_to_the_server() {
    let server = ScriptedServer::start(vec![]).await.unwrap();
    server.push(CannedResponse::new(200, registration_body(&server)));
    server.push(CannedResponse::new(
        200,
        r#"{"action":"","job":{"id":"loud-job","chunks_max_size_bytes":8}}"#,
    ));
    server.push(CannedResponse::new(200, r#"{"id":"loud-job","chunks_max_size_bytes":8}"#));
    // start, chunk uploads, finish, and disconnect all accept the
    // default 200 response.

    let executor = Arc::new(FakeExecutor::new());
    executor.script_run(FakeRun {
        output: "0123456789".to_string(),
        exit_status: 0,
        ..FakeRun::default()
    });
    let pool = pool_for(&server, executor, |c| c.disconnect_after_job = true);

    pool.run().await.unwrap();

    let lines = server.request_lines();
    assert!(lines.contains(&"POST /jobs/loud-job/chunks?sequence=1&offset=0".to_string()));
    assert!(lines.contains(&"POST /jobs/loud-job/chunks?sequence=2&offset=8".to_string()));

    let requests = server.requests();
    let mut chunks: Vec<(&str, &str)> = requests
        .iter()
        .filter(|r| r.path.contains("/chunks"))
        .map(|r| (r.path.as_str(), r.body.as_str()))
        .collect();
    chunks.sort();
    let joined: String = chunks.iter().map(|(_, body)| *body).collect();
    assert_eq!(joined, "0123456789");
}

#[tokio::test]
async fn acquire_rejection_surfaces_from_the_pool() {
    let server = ScriptedServer::start(vec![]).await.unwrap();
    server.push(CannedResponse::new(200, registration_body(&server)));
    server.push(CannedResponse::new(422, "acquisition rejected"));

    let executor = Arc::new(FakeExecutor::new());
    let pool = pool_for(&server, executor, |c| {
        c.acquire_job = Some("contested-job".to_string());
    });

    let err = pool.run().await.unwrap_err();
    match err {
        AgentError::Api(ApiError::AcquisitionRejected) => {}
        other => panic!("unexpected error: {:?}", other),
    }
    assert!(server
        .request_lines()
        .contains(&"POST /jobs/contested-job/acquire".to_string()));
}
