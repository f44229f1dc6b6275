// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Human-friendly duration strings for the config surface.

use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DurationError {
    #[error("empty duration")]
    Empty,
    #[error("invalid duration number: {0}")]
    BadNumber(String),
    #[error("unknown duration unit: {0}")]
    BadUnit(String),
}

/// Parse a duration like "250ms", "30s", "5m", "2h", or "1d". A bare
/// number means seconds.
pub fn parse_duration(raw: &str) -> Result<Duration, DurationError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(DurationError::Empty);
    }

    let split = raw
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(raw.len());
    let (digits, unit) = raw.split_at(split);
    let value: u64 = digits
        .parse()
        .map_err(|_| DurationError::BadNumber(raw.to_string()))?;

    match unit.trim() {
        "ms" => Ok(Duration::from_millis(value)),
        "" | "s" => Ok(Duration::from_secs(value)),
        "m" => Ok(Duration::from_secs(value * 60)),
        "h" => Ok(Duration::from_secs(value * 3600)),
        "d" => Ok(Duration::from_secs(value * 86400)),
        other => Err(DurationError::BadUnit(other.to_string())),
    }
}

#[cfg(test)]
#[path = "duration_tests.rs"]
mod tests;
