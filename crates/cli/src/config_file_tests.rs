// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use std::io::Write;

#[test]
fn loads_a_config_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("navvy.toml");
    let mut file = std::fs::File::create(&path).unwrap();
    writeln!(file, "token = \"tok\"\nendpoint = \"https://api.example.com\"\nspawn = 4").unwrap();

    let config = load(Some(&path)).unwrap();
    assert_eq!(config.token, "tok");
    assert_eq!(config.spawn, 4);
}

#[test]
fn missing_file_is_an_error() {
    let err = load(Some(Path::new("/nonexistent/navvy.toml"))).unwrap_err();
    assert!(matches!(err, ConfigError::Read { .. }));
}

#[test]
fn garbage_file_is_a_parse_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("navvy.toml");
    std::fs::write(&path, "token = [not toml").unwrap();

    let err = load(Some(&path)).unwrap_err();
    assert!(matches!(err, ConfigError::Parse { .. }));
}
