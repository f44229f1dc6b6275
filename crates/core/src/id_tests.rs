// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use std::collections::HashMap;

#[test]
fn ids_display_their_inner_string() {
    assert_eq!(JobId::new("0190a3d2").to_string(), "0190a3d2");
    assert_eq!(AgentId::new("a-1").as_str(), "a-1");
}

#[test]
fn empty_id_is_detected() {
    assert!(JobId::default().is_empty());
    assert!(!JobId::new("j").is_empty());
}

#[test]
fn worker_id_supports_str_keyed_lookups() {
    let mut map: HashMap<WorkerId, u32> = HashMap::new();
    map.insert(WorkerId::new("pool-1"), 1);
    assert_eq!(map.get("pool-1"), Some(&1));
}

#[test]
fn ids_round_trip_through_serde() {
    let id = JobId::new("f3c1");
    let json = serde_json::to_string(&id).unwrap();
    assert_eq!(json, "\"f3c1\"");
    let back: JobId = serde_json::from_str(&json).unwrap();
    assert_eq!(back, id);
}
