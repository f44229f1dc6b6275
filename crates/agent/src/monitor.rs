// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Pool-level idle monitor.
//!
//! Decides when the pool may terminate under the idle-timeout policy:
//! `exiting()` resolves once every worker has been idle or dead,
//! continuously, for the configured timeout. Workers that have not yet
//! been marked at all count as initializing and block the exit, so a
//! freshly-started pool never exits before anyone had a chance to work.

use navvy_core::{Clock, SystemClock, WorkerHealth, WorkerId};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Notify;

struct State {
    total: usize,
    health: HashMap<WorkerId, WorkerHealth>,
    /// When the pool last entered the all-idle-or-dead condition.
    settled_since: Option<Instant>,
}

impl State {
    fn settled(&self) -> bool {
        self.health.len() == self.total
            && self
                .health
                .values()
                .all(|h| matches!(h, WorkerHealth::Idle | WorkerHealth::Dead))
    }

    fn all_dead(&self) -> bool {
        self.health.len() == self.total
            && self.health.values().all(|h| matches!(h, WorkerHealth::Dead))
    }
}

#[derive(Clone)]
pub struct IdleMonitor<C: Clock = SystemClock> {
    inner: Arc<Inner<C>>,
}

struct Inner<C> {
    state: Mutex<State>,
    changed: Notify,
    idle_timeout: Duration,
    clock: C,
}

impl IdleMonitor {
    pub fn new(total: usize, idle_timeout: Duration) -> Self {
        Self::with_clock(total, idle_timeout, SystemClock)
    }
}

impl<C: Clock> IdleMonitor<C> {
    pub fn with_clock(total: usize, idle_timeout: Duration, clock: C) -> Self {
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(State {
                    total,
                    health: HashMap::new(),
                    settled_since: None,
                }),
                changed: Notify::new(),
                idle_timeout,
                clock,
            }),
        }
    }

    pub fn mark_busy(&self, worker: &WorkerId) {
        self.mark(worker, WorkerHealth::Busy);
    }

    pub fn mark_idle(&self, worker: &WorkerId) {
        self.mark(worker, WorkerHealth::Idle);
    }

    pub fn mark_dead(&self, worker: &WorkerId) {
        self.mark(worker, WorkerHealth::Dead);
    }

    fn mark(&self, worker: &WorkerId, health: WorkerHealth) {
        let mut state = self.inner.state.lock();

        // Dead is absorbing.
        if state.health.get(worker) == Some(&WorkerHealth::Dead) {
            return;
        }
        // Re-marking the same bucket must not restart the settle clock.
        if state.health.get(worker) == Some(&health) {
            return;
        }
        state.health.insert(worker.clone(), health);

        let settled = state.settled();
        match (settled, state.settled_since) {
            (true, None) => state.settled_since = Some(self.inner.clock.now()),
            (false, Some(_)) => state.settled_since = None,
            _ => {}
        }
        drop(state);
        self.inner.changed.notify_waiters();
    }

    /// Whether the pool is currently eligible to exit.
    pub fn should_exit(&self) -> bool {
        let state = self.inner.state.lock();
        if state.all_dead() {
            return true;
        }
        match state.settled_since {
            Some(since) => {
                state.settled()
                    && self.inner.clock.now().saturating_duration_since(since)
                        >= self.inner.idle_timeout
            }
            None => false,
        }
    }

    /// Resolves when the pool may terminate. A `mark_busy` before the
    /// timeout elapses cancels the pending exit and the wait continues.
    pub async fn exiting(&self) {
        loop {
            let notified = self.inner.changed.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            let wait = {
                let state = self.inner.state.lock();
                if state.all_dead() {
                    return;
                }
                match state.settled_since {
                    Some(since) => {
                        let elapsed = self.inner.clock.now().saturating_duration_since(since);
                        if elapsed >= self.inner.idle_timeout {
                            return;
                        }
                        Some(self.inner.idle_timeout - elapsed)
                    }
                    None => None,
                }
            };

            match wait {
                Some(remaining) => {
                    tokio::select! {
                        _ = tokio::time::sleep(remaining) => {
                            if self.should_exit() {
                                return;
                            }
                        }
                        _ = &mut notified => {}
                    }
                }
                None => notified.await,
            }
        }
    }
}

#[cfg(test)]
#[path = "monitor_tests.rs"]
mod tests;
