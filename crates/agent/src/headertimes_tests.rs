// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

fn collecting_uploader(seen: Arc<Mutex<Vec<BTreeMap<u64, String>>>>) -> TimesUploader {
    Arc::new(move |batch| {
        let seen = Arc::clone(&seen);
        Box::pin(async move {
            seen.lock().push(batch);
            Ok(())
        })
    })
}

#[yare::parameterized(
    open = { "--- Running tests", true },
    expanded = { "+++ Failing step", true },
    muted = { "~~~ Setup", true },
    plain = { "regular output", false },
    dashes_without_space = { "----------", false },
    indented = { "  --- not a header", false },
)]
fn header_detection(line: &str, expected: bool) {
    assert_eq!(is_header_line(line), expected);
}

#[tokio::test]
async fn records_header_lines_by_cursor() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let streamer = HeaderTimesStreamer::start(collecting_uploader(Arc::clone(&seen)));

    streamer.scan("--- first\nplain\n+++ second\n");
    streamer.stop().await;

    let batches = seen.lock().clone();
    assert_eq!(batches.len(), 1);
    let cursors: Vec<u64> = batches[0].keys().copied().collect();
    assert_eq!(cursors, vec![0, 2]);
}

#[tokio::test]
async fn partial_lines_wait_for_their_newline() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let streamer = HeaderTimesStreamer::start(collecting_uploader(Arc::clone(&seen)));

    streamer.scan("--- split ");
    assert_eq!(streamer.pending_len(), 0);
    streamer.scan("header\n");
    assert_eq!(streamer.pending_len(), 1);
    streamer.stop().await;
}

#[tokio::test]
async fn failed_uploads_requeue_for_the_next_flush() {
    let attempts = Arc::new(Mutex::new(0u32));
    let seen = Arc::new(Mutex::new(Vec::new()));
    let uploader: TimesUploader = {
        let attempts = Arc::clone(&attempts);
        let seen = Arc::clone(&seen);
        Arc::new(move |batch| {
            let attempts = Arc::clone(&attempts);
            let seen = Arc::clone(&seen);
            Box::pin(async move {
                let mut n = attempts.lock();
                *n += 1;
                if *n == 1 {
                    return Err(ApiError::transport("header-times", "scripted"));
                }
                seen.lock().push(batch);
                Ok(())
            })
        })
    };

    let streamer = HeaderTimesStreamer::start(uploader);
    streamer.scan("--- a\n");
    // First stop flush fails; batch requeues. Second flush delivers.
    streamer.stop().await;
    assert!(seen.lock().is_empty());
    streamer.stop().await;
    assert_eq!(seen.lock().len(), 1);
}
