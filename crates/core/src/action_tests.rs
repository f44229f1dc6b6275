// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[yare::parameterized(
    cont = { "\"\"", Action::Continue },
    pause = { "\"pause\"", Action::Pause },
    disconnect = { "\"disconnect\"", Action::Disconnect },
    idle = { "\"idle\"", Action::Idle },
)]
fn wire_round_trip(json: &str, action: Action) {
    assert_eq!(serde_json::from_str::<Action>(json).unwrap(), action);
    assert_eq!(serde_json::to_string(&action).unwrap(), json);
}

#[test]
fn predicates() {
    assert!(Action::Pause.is_pause());
    assert!(Action::Disconnect.is_disconnect());
    assert!(!Action::Continue.is_pause());
}
