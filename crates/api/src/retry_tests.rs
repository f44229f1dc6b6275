// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use std::sync::atomic::{AtomicU32, Ordering};
use tokio::time::Instant;

fn flaky(fail_times: u32, counter: &AtomicU32) -> impl Fn(u32) -> std::future::Ready<Result<u32, ApiError>> + '_ {
    move |attempt| {
        let n = counter.fetch_add(1, Ordering::SeqCst);
        if n < fail_times {
            std::future::ready(Err(ApiError::Status { action: "op", status: 503, body: String::new() }))
        } else {
            std::future::ready(Ok(attempt))
        }
    }
}

#[tokio::test(start_paused = true)]
async fn retries_transient_failures_until_success() {
    let calls = AtomicU32::new(0);
    let cancel = CancellationToken::new();
    let retrier = Retrier::constant(4, Duration::from_secs(1));
    let attempt = retrier.run(&cancel, "op", flaky(2, &calls)).await.unwrap();
    assert_eq!(attempt, 3);
    assert_eq!(calls.load(Ordering::SeqCst), 3);
}

#[tokio::test(start_paused = true)]
async fn constant_backoff_sleeps_between_attempts() {
    let calls = AtomicU32::new(0);
    let cancel = CancellationToken::new();
    let start = Instant::now();
    let retrier = Retrier::constant(4, Duration::from_secs(1));
    retrier.run(&cancel, "op", flaky(2, &calls)).await.unwrap();
    // Two failures, so two one-second sleeps under the paused clock.
    assert!(start.elapsed() >= Duration::from_secs(2));
}

#[tokio::test(start_paused = true)]
async fn gives_up_after_max_attempts() {
    let calls = AtomicU32::new(0);
    let cancel = CancellationToken::new();
    let retrier = Retrier::constant(3, Duration::from_millis(10));
    let err = retrier.run(&cancel, "op", flaky(10, &calls)).await.unwrap_err();
    assert_eq!(err.status(), Some(503));
    assert_eq!(calls.load(Ordering::SeqCst), 3);
}

#[tokio::test(start_paused = true)]
async fn terminal_error_short_circuits() {
    let calls = AtomicU32::new(0);
    let cancel = CancellationToken::new();
    let retrier = Retrier::constant(5, Duration::from_secs(1));
    let err = retrier
        .run(&cancel, "op", |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            std::future::ready(Err::<(), _>(ApiError::Status {
                action: "op",
                status: 401,
                body: String::new(),
            }))
        })
        .await
        .unwrap_err();
    assert_eq!(err.status(), Some(401));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn locked_sleeps_server_supplied_delay() {
    let calls = AtomicU32::new(0);
    let cancel = CancellationToken::new();
    let start = Instant::now();
    let retrier = Retrier::constant(2, Duration::from_millis(1));
    let _ = retrier
        .run(&cancel, "op", |_| {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            std::future::ready(if n == 0 {
                Err(ApiError::Locked { retry_after: Duration::from_secs(8) })
            } else {
                Ok(())
            })
        })
        .await;
    assert!(start.elapsed() >= Duration::from_secs(8));
}

#[tokio::test]
async fn cancellation_interrupts_the_sleep() {
    let cancel = CancellationToken::new();
    let retrier = Retrier::forever(Duration::from_secs(3600));
    let child = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        child.cancel();
    });
    let err = retrier
        .run(&cancel, "op", |_| {
            std::future::ready(Err::<(), _>(ApiError::transport("op", "down")))
        })
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::Canceled { .. }));
}
