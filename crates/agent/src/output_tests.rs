// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn drain_returns_only_new_bytes() {
    let buf = OutputBuffer::new();
    buf.write(b"one").unwrap();
    assert_eq!(buf.drain_new(), b"one");
    assert_eq!(buf.drain_new(), b"");
    buf.write(b"two").unwrap();
    assert_eq!(buf.drain_new(), b"two");
}

#[test]
fn close_fails_subsequent_writes() {
    let buf = OutputBuffer::new();
    buf.write(b"before").unwrap();
    buf.close();
    assert_eq!(buf.write(b"after"), Err(OutputClosed));
    // Already-written bytes stay drainable.
    assert_eq!(buf.drain_new(), b"before");
}

#[test]
fn clones_share_the_same_stream() {
    let buf = OutputBuffer::new();
    let writer = buf.clone();
    writer.write(b"x").unwrap();
    assert_eq!(buf.contents(), b"x");
}
