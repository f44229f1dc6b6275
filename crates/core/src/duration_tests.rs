// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[yare::parameterized(
    bare_seconds = { "30", 30 },
    seconds = { "45s", 45 },
    minutes = { "5m", 300 },
    hours = { "2h", 7200 },
    days = { "1d", 86400 },
    padded = { "  10s ", 10 },
)]
fn parses_units(input: &str, secs: u64) {
    assert_eq!(parse_duration(input).unwrap(), Duration::from_secs(secs));
}

#[test]
fn parses_milliseconds() {
    assert_eq!(parse_duration("250ms").unwrap(), Duration::from_millis(250));
}

#[yare::parameterized(
    empty = { "", DurationError::Empty },
    no_number = { "s", DurationError::BadNumber("s".to_string()) },
    negative = { "-5s", DurationError::BadNumber("-5s".to_string()) },
    bad_unit = { "10y", DurationError::BadUnit("y".to_string()) },
)]
fn rejects_malformed(input: &str, expected: DurationError) {
    assert_eq!(parse_duration(input).unwrap_err(), expected);
}
