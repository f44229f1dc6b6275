// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Pool supervisor: N workers, one idle monitor, one HTTP surface.

use crate::config::AgentConfig;
use crate::error::AgentError;
use crate::executor::Executor;
use crate::metrics::AgentMetrics;
use crate::monitor::IdleMonitor;
use crate::server::{self, StatusSource};
use crate::validate::Validator;
use crate::worker::{Worker, WorkerDeps, WorkerSnapshot};
use navvy_api::{ControlApi, RegistrationTemplate};
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

/// Builds one API client per worker slot; each worker registers its own
/// agent identity.
pub type ApiFactory<A> = Box<dyn Fn(usize) -> Arc<A> + Send + Sync>;

pub struct Pool<A: ControlApi + 'static> {
    config: Arc<AgentConfig>,
    executor: Arc<dyn Executor>,
    metrics: AgentMetrics,
    monitor: IdleMonitor,
    validator: Arc<Validator>,
    make_api: ApiFactory<A>,
    workers: Mutex<Vec<Worker<A>>>,
    graceful: CancellationToken,
    ungraceful: CancellationToken,
}

impl<A: ControlApi + 'static> Pool<A> {
    pub fn new(
        config: Arc<AgentConfig>,
        executor: Arc<dyn Executor>,
        metrics: AgentMetrics,
        make_api: ApiFactory<A>,
    ) -> Result<Arc<Self>, AgentError> {
        let validator = Validator::from_config(&config)
            .map_err(|e| AgentError::Config(format!("invalid allow-list pattern: {}", e)))?;
        let monitor = IdleMonitor::new(config.spawn, config.disconnect_after_idle_timeout);
        Ok(Arc::new(Self {
            config,
            executor,
            metrics,
            monitor,
            validator: Arc::new(validator),
            make_api,
            workers: Mutex::new(Vec::new()),
            graceful: CancellationToken::new(),
            ungraceful: CancellationToken::new(),
        }))
    }

    pub fn monitor(&self) -> IdleMonitor {
        self.monitor.clone()
    }

    /// Signal every worker to finish its current job and disconnect.
    pub fn stop_gracefully(&self) {
        if self.graceful.is_cancelled() {
            tracing::warn!("already stopping");
            return;
        }
        tracing::info!("pool stopping gracefully");
        self.graceful.cancel();
        for worker in self.workers.lock().iter() {
            worker.stop_gracefully();
        }
    }

    /// Cancel running jobs, then stop.
    pub fn stop_ungracefully(&self) {
        tracing::info!("pool stopping ungracefully");
        self.ungraceful.cancel();
        self.graceful.cancel();
        for worker in self.workers.lock().iter() {
            worker.stop_ungracefully();
        }
    }

    /// Register and run every worker; resolve when all have returned.
    /// The first worker error (registration or runtime) is the pool's.
    pub async fn run(self: &Arc<Self>) -> Result<(), AgentError> {
        let server_task = self.spawn_server().await?;

        // Idle-timeout coordinator: when the monitor fires, stop the
        // pool gracefully.
        let idle_watcher = {
            let pool = Arc::clone(self);
            let monitor = self.monitor.clone();
            let enabled = !self.config.disconnect_after_idle_timeout.is_zero();
            tokio::spawn(async move {
                if !enabled {
                    return;
                }
                monitor.exiting().await;
                tracing::info!("all workers idle past the timeout; exiting");
                pool.stop_gracefully();
            })
        };

        let mut tasks: JoinSet<Result<(), AgentError>> = JoinSet::new();
        for index in 1..=self.config.spawn.max(1) {
            let pool = Arc::clone(self);
            tasks.spawn(async move { pool.run_worker(index).await });
        }

        let mut first_error: Option<AgentError> = None;
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(Ok(())) => {}
                Ok(Err(err)) => {
                    if first_error.is_none() {
                        first_error = Some(err);
                    }
                }
                Err(join_err) => {
                    tracing::error!(error = %join_err, "worker task panicked");
                }
            }
        }

        idle_watcher.abort();
        if let Some(server) = server_task {
            server.abort();
        }

        match first_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    async fn run_worker(self: &Arc<Self>, index: usize) -> Result<(), AgentError> {
        let api = (self.make_api)(index);
        let template = RegistrationTemplate {
            name: format!("{}-{}", self.config.name, index),
            hostname: std::env::var("HOSTNAME").unwrap_or_default(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            tags: self.config.tags.clone(),
        };

        let register_cancel = self.graceful.clone();
        let registration = tokio::select! {
            r = api.register(&template, &register_cancel) => r?,
            _ = self.graceful.cancelled() => return Ok(()),
        };
        tracing::info!(agent = %registration.name, uuid = %registration.uuid, "registered");

        let worker = Worker::new(
            WorkerDeps {
                api,
                executor: Arc::clone(&self.executor),
                validator: Arc::clone(&self.validator),
                monitor: self.monitor.clone(),
                metrics: self.metrics.clone(),
                config: Arc::clone(&self.config),
            },
            registration,
            index,
        );

        // A stop that raced registration must still reach this worker.
        self.workers.lock().push(worker.clone());
        if self.ungraceful.is_cancelled() {
            worker.stop_ungracefully();
        } else if self.graceful.is_cancelled() {
            worker.stop_gracefully();
        }

        worker.run().await
    }

    async fn spawn_server(
        self: &Arc<Self>,
    ) -> Result<Option<tokio::task::JoinHandle<()>>, AgentError> {
        let Some(addr) = self.config.health_addr.clone() else {
            return Ok(None);
        };
        let listener = tokio::net::TcpListener::bind(&addr)
            .await
            .map_err(AgentError::Server)?;
        tracing::info!(addr = %addr, "health server listening");
        let state = server::AppState {
            source: Arc::clone(self) as Arc<dyn StatusSource>,
            metrics: self.metrics.clone(),
        };
        let shutdown = self.graceful.clone();
        Ok(Some(tokio::spawn(async move {
            if let Err(err) = server::serve(listener, state, shutdown).await {
                tracing::error!(error = %err, "health server failed");
            }
        })))
    }
}

impl<A: ControlApi + 'static> StatusSource for Pool<A> {
    fn snapshots(&self) -> Vec<WorkerSnapshot> {
        self.workers.lock().iter().map(Worker::snapshot).collect()
    }

    fn heartbeat_healthy(&self) -> bool {
        self.workers.lock().iter().all(Worker::heartbeat_healthy)
    }
}

#[cfg(test)]
#[path = "pool_tests.rs"]
mod tests;
