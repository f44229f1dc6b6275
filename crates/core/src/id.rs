// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Identifier newtypes.
//!
//! All three are server-assigned opaque strings. `WorkerId` is the local
//! spawn identity (`<name>-<spawn_index>`); the server only ever sees the
//! registered `AgentId`.

crate::string_id! {
    /// Server-assigned agent UUID, fixed at registration.
    pub struct AgentId;
}

crate::string_id! {
    /// Server-assigned job identifier.
    pub struct JobId;
}

crate::string_id! {
    /// Local identity of one worker slot in the pool.
    pub struct WorkerId;
}

#[cfg(test)]
#[path = "id_tests.rs"]
mod tests;
