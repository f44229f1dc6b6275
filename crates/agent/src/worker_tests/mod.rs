// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::config::TransportMode;
use crate::executor::{FakeExecutor, FakeRun};
use navvy_api::{ApiError, FakeApi, PingResponse, StreamEvent};
use navvy_core::SignalReason;

struct Rig {
    api: Arc<FakeApi>,
    executor: Arc<FakeExecutor>,
    worker: Worker<FakeApi>,
}

fn rig_with(mutate: impl FnOnce(&mut AgentConfig)) -> Rig {
    let mut config = AgentConfig::default();
    config.transport = TransportMode::NoStream;
    mutate(&mut config);
    let config = Arc::new(config);

    let api = Arc::new(FakeApi::new());
    let executor = Arc::new(FakeExecutor::new());
    let registration = AgentRegistration::builder()
        .name("pool-1")
        .ping_interval(0)
        .heartbeat_interval(3600)
        .job_status_interval(1)
        .endpoint("https://a.example.com")
        .build();

    let deps = WorkerDeps {
        api: Arc::clone(&api),
        executor: Arc::clone(&executor) as Arc<dyn Executor>,
        validator: Arc::new(Validator::from_config(&config).unwrap()),
        monitor: IdleMonitor::new(1, config.disconnect_after_idle_timeout),
        metrics: AgentMetrics::new(),
        config,
    };
    let worker = Worker::new(deps, registration, 1);
    Rig { api, executor, worker }
}

fn ping(action: Action) -> Result<PingResponse, ApiError> {
    Ok(PingResponse { action, ..PingResponse::default() })
}

fn unrecoverable(action: &'static str) -> ApiError {
    ApiError::Status { action, status: 401, body: String::new() }
}

#[tokio::test]
async fn disconnect_action_stops_the_worker() {
    let rig = rig_with(|_| {});
    rig.api.script_ping(ping(Action::Disconnect));

    rig.worker.run().await.unwrap();

    assert_eq!(rig.api.disconnect_count(), 1);
    assert!(rig.api.finished_jobs().is_empty());
}

#[tokio::test]
async fn pause_then_resume_then_run() {
    let rig = rig_with(|c| c.disconnect_after_job = true);
    // First ping pauses; nothing runs. Next ping assigns a job.
    rig.api.script_ping(ping(Action::Pause));
    rig.api.script_job_ping(Job::builder().id("J").build());
    rig.executor.script_run(FakeRun { exit_status: 0, ..FakeRun::default() });

    rig.worker.run().await.unwrap();

    let finished = rig.api.finished_jobs();
    assert_eq!(finished.len(), 1);
    assert_eq!(finished[0].id.as_str(), "J");
    assert_eq!(finished[0].exit_status, Some(0));
    assert_eq!(finished[0].signal_reason, SignalReason::None);
    // Back to idle before the worker went away.
    assert_eq!(rig.worker.snapshot().status, "idle");
    assert!(rig.worker.snapshot().current_job_id.is_none());
}

#[tokio::test]
async fn busy_phase_carries_the_job_id() {
    let rig = rig_with(|c| c.disconnect_after_job = true);
    rig.api.script_job_ping(Job::builder().id("J-visible").build());
    rig.executor.script_run(FakeRun {
        hang_until_signal: false,
        run_for: Duration::from_millis(300),
        ..FakeRun::default()
    });

    let worker = rig.worker.clone();
    let task = tokio::spawn(async move { worker.run().await });
    tokio::time::sleep(Duration::from_millis(150)).await;

    let snapshot = rig.worker.snapshot();
    assert_eq!(snapshot.status, "busy");
    assert_eq!(snapshot.current_job_id.as_deref(), Some("J-visible"));

    task.await.unwrap().unwrap();
    assert!(rig.worker.snapshot().current_job_id.is_none());
}

#[tokio::test]
async fn endpoint_rebind_probes_then_swaps_and_failure_keeps_binding() {
    let rig = rig_with(|_| {});
    // Ping at A redirects to B; the probe at B succeeds; binding swaps.
    rig.api.script_ping(Ok(PingResponse {
        endpoint: Some("https://b.example.com".to_string()),
        ..PingResponse::default()
    }));
    rig.api.script_ping_at("https://b.example.com", Ok(PingResponse::default()));
    // A later ping at B offers a broken endpoint; the probe fails; the
    // binding stays at B.
    rig.api.script_ping(Ok(PingResponse {
        endpoint: Some("https://broken.example.com".to_string()),
        ..PingResponse::default()
    }));
    rig.api.script_ping_at(
        "https://broken.example.com",
        Err(ApiError::transport("ping", "connection refused")),
    );
    rig.api.script_ping(ping(Action::Disconnect));

    rig.worker.run().await.unwrap();

    assert_eq!(rig.api.endpoint(), "https://b.example.com");
    let pings: Vec<String> =
        rig.api.calls().into_iter().filter(|c| c.starts_with("ping:")).collect();
    assert_eq!(
        pings,
        vec![
            "ping:https://a.example.com",
            "ping:https://b.example.com",
            "ping:https://b.example.com",
        ]
    );
    let rebinds = rig.api.rebinds();
    assert_eq!(rebinds.len(), 1);
    assert_eq!(rebinds[0].0.as_deref(), Some("https://b.example.com"));
}

#[tokio::test]
async fn header_only_change_swaps_without_probe() {
    let rig = rig_with(|_| {});
    let mut headers = std::collections::HashMap::new();
    headers.insert("X-Routing".to_string(), "b".to_string());
    rig.api.script_ping(Ok(PingResponse {
        request_headers: Some(headers.clone()),
        ..PingResponse::default()
    }));
    rig.api.script_ping(ping(Action::Disconnect));

    rig.worker.run().await.unwrap();

    let rebinds = rig.api.rebinds();
    assert_eq!(rebinds.len(), 1);
    assert_eq!(rebinds[0].0, None);
    assert_eq!(rebinds[0].1.as_ref(), Some(&headers));
    assert!(!rig.api.calls().iter().any(|c| c.starts_with("ping_at")));
}

#[tokio::test]
async fn unrecoverable_ping_is_fatal() {
    let rig = rig_with(|_| {});
    rig.api.script_ping(Err(unrecoverable("ping")));

    let err = rig.worker.run().await.unwrap_err();
    assert!(err.unrecoverable());
}

#[tokio::test]
async fn retryable_ping_failure_keeps_the_worker_alive() {
    let rig = rig_with(|c| c.disconnect_after_job = true);
    rig.api.script_ping(Err(ApiError::Status {
        action: "ping",
        status: 503,
        body: String::new(),
    }));
    rig.api.script_job_ping(Job::builder().id("after-blip").build());

    rig.worker.run().await.unwrap();

    assert_eq!(rig.api.finished_jobs().len(), 1);
}

#[tokio::test]
async fn unrecoverable_heartbeat_stops_the_worker() {
    let api = Arc::new(FakeApi::new());
    let executor = Arc::new(FakeExecutor::new());
    let mut config = AgentConfig::default();
    config.transport = TransportMode::NoStream;
    let config = Arc::new(config);
    let registration = AgentRegistration::builder()
        .name("pool-1")
        .ping_interval(1)
        .heartbeat_interval(0)
        .build();
    api.script_heartbeat(Err(unrecoverable("heartbeat")));

    let worker = Worker::new(
        WorkerDeps {
            api: Arc::clone(&api),
            executor: executor as Arc<dyn Executor>,
            validator: Arc::new(Validator::from_config(&config).unwrap()),
            monitor: IdleMonitor::new(1, Duration::from_secs(3600)),
            metrics: AgentMetrics::new(),
            config,
        },
        registration,
        1,
    );

    let err = worker.run().await.unwrap_err();
    assert!(err.unrecoverable());
    assert!(worker.snapshot().last_heartbeat_error.is_some());
}

#[tokio::test]
async fn stream_assigns_jobs_and_disconnects() {
    let rig = rig_with(|c| c.transport = TransportMode::StreamOnly);
    rig.api.script_stream(vec![
        Ok(StreamEvent::Resume),
        Ok(StreamEvent::JobAssigned { job: Job::builder().id("J-push").build() }),
        Ok(StreamEvent::Disconnect { reason: "draining".to_string() }),
    ]);
    rig.executor.script_run(FakeRun::default());

    rig.worker.run().await.unwrap();

    let finished = rig.api.finished_jobs();
    assert_eq!(finished.len(), 1);
    assert_eq!(finished[0].id.as_str(), "J-push");
    assert_eq!(rig.api.disconnect_count(), 1);
}

#[tokio::test]
async fn broken_stream_falls_back_to_polling() {
    let rig = rig_with(|c| {
        c.transport = TransportMode::Both;
        c.disconnect_after_job = true;
    });
    // The only stream connect attempt dies immediately with an
    // unrecoverable verdict: permanent fallback to polling.
    rig.api.script_stream(vec![Err(unrecoverable("stream-pings"))]);
    rig.api.script_job_ping(Job::builder().id("J-poll").build());

    rig.worker.run().await.unwrap();

    assert_eq!(rig.api.finished_jobs()[0].id.as_str(), "J-poll");
}

#[tokio::test]
async fn unrecoverable_stream_is_fatal_in_stream_only_mode() {
    let rig = rig_with(|c| c.transport = TransportMode::StreamOnly);
    rig.api.script_stream(vec![Err(unrecoverable("stream-pings"))]);

    let err = rig.worker.run().await.unwrap_err();
    assert!(err.unrecoverable());
}

#[tokio::test]
async fn graceful_stop_waits_for_the_running_job() {
    let rig = rig_with(|_| {});
    rig.api.script_job_ping(Job::builder().id("J-long").build());
    rig.executor.script_run(FakeRun {
        run_for: Duration::from_millis(300),
        ..FakeRun::default()
    });

    let worker = rig.worker.clone();
    let task = tokio::spawn(async move { worker.run().await });
    tokio::time::sleep(Duration::from_millis(100)).await;

    rig.worker.stop_gracefully();
    rig.worker.stop_gracefully(); // idempotent
    task.await.unwrap().unwrap();

    let finished = rig.api.finished_jobs();
    assert_eq!(finished.len(), 1);
    // The job ran to its natural end: no cancel was delivered.
    assert_eq!(finished[0].signal_reason, SignalReason::None);
    assert!(rig.executor.events().iter().all(|e| e.starts_with("start")));
    assert_eq!(rig.api.disconnect_count(), 1);
}

#[tokio::test]
async fn ungraceful_stop_cancels_the_running_job() {
    let rig = rig_with(|_| {});
    rig.api.script_job_ping(Job::builder().id("J-cut").build());
    rig.executor.script_run(FakeRun {
        hang_until_signal: true,
        obey_interrupt: true,
        ..FakeRun::default()
    });

    let worker = rig.worker.clone();
    let task = tokio::spawn(async move { worker.run().await });
    tokio::time::sleep(Duration::from_millis(100)).await;

    rig.worker.stop_ungracefully();
    task.await.unwrap().unwrap();

    let finished = rig.api.finished_jobs();
    assert_eq!(finished.len(), 1);
    assert_eq!(finished[0].signal_reason, SignalReason::AgentStop);
    assert!(rig.executor.events().iter().any(|e| e.starts_with("interrupt")));
}

#[tokio::test]
async fn unhealthy_marker_leaves_pause_state_alone() {
    let rig = rig_with(|_| {});
    let inner = Arc::clone(&rig.worker.inner);
    let (tx, action_rx) = mpsc::channel::<ActionMessage>(1);
    let handler = tokio::spawn(actions::run(Arc::clone(&inner), action_rx));

    let send = |action: Action, unhealthy: bool| {
        let tx = tx.clone();
        async move {
            let (done_tx, done_rx) = oneshot::channel();
            tx.send(ActionMessage { action, job: None, unhealthy, done: done_tx })
                .await
                .unwrap();
            done_rx.await.unwrap()
        }
    };

    send(Action::Pause, false).await;
    assert!(inner.state.lock().paused);

    // A stream-health marker is not a resume: the pause holds.
    send(Action::Continue, true).await;
    assert!(inner.state.lock().paused);

    // A real action resumes.
    send(Action::Continue, false).await;
    assert!(!inner.state.lock().paused);

    drop(send);
    drop(tx);
    handler.await.unwrap().unwrap();
}

#[tokio::test]
async fn uptime_cap_ends_the_worker() {
    let rig = rig_with(|c| c.disconnect_after_uptime = Duration::from_millis(100));

    // Pings keep returning "continue"; once the cap elapses, the next
    // post-action check ends the worker.
    let started = std::time::Instant::now();
    rig.worker.run().await.unwrap();

    assert!(started.elapsed() >= Duration::from_millis(100));
    assert_eq!(rig.api.disconnect_count(), 1);
}

#[tokio::test]
async fn solo_idle_worker_exits_after_both_timeouts() {
    let rig = rig_with(|c| c.disconnect_after_idle_timeout = Duration::from_millis(80));

    let started = std::time::Instant::now();
    rig.worker.run().await.unwrap();

    // The worker idles past its own timeout, then the monitor holds the
    // pool-exit condition for the same duration again.
    assert!(started.elapsed() >= Duration::from_millis(160));
    assert_eq!(rig.api.disconnect_count(), 1);
}

#[tokio::test]
async fn acquire_mode_claims_runs_and_exits() {
    let rig = rig_with(|c| c.acquire_job = Some("wanted-job".to_string()));
    rig.executor.script_run(FakeRun::default());

    rig.worker.run().await.unwrap();

    assert!(rig.api.calls().iter().any(|c| c == "acquire:wanted-job"));
    assert_eq!(rig.api.finished_jobs().len(), 1);
    assert_eq!(rig.api.disconnect_count(), 1);
}

#[tokio::test]
async fn acquire_rejection_surfaces_the_sentinel() {
    let rig = rig_with(|c| c.acquire_job = Some("rejected-job".to_string()));
    rig.api.script_acquire(Err(ApiError::AcquisitionRejected));

    let err = rig.worker.run().await.unwrap_err();
    match err {
        AgentError::Api(ApiError::AcquisitionRejected) => {}
        other => panic!("unexpected error: {:?}", other),
    }
}
