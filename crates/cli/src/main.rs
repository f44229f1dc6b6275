// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! navvy: worker daemon for the build-orchestration service.

mod config_file;
mod exit_error;

use clap::{Parser, Subcommand};
use exit_error::{ExitError, EXIT_ACQUISITION_REJECTED, EXIT_JOB_LOCKED};
use navvy_agent::{AgentConfig, AgentError, AgentMetrics, Pool, ProcessExecutor};
use navvy_api::{ApiError, HttpClient};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "navvy", version, about = "Build agent worker daemon")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run a pool of workers until stopped.
    Start {
        #[arg(long)]
        config: Option<PathBuf>,
        #[arg(long)]
        token: Option<String>,
        #[arg(long)]
        endpoint: Option<String>,
        #[arg(long)]
        spawn: Option<usize>,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        health_addr: Option<String>,
    },
    /// Claim one specific job, run it, and exit.
    Acquire {
        job_id: String,
        #[arg(long)]
        config: Option<PathBuf>,
        #[arg(long)]
        token: Option<String>,
        #[arg(long)]
        endpoint: Option<String>,
    },
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with_writer(std::io::stderr)
        .init();

    let code = match run(Cli::parse()).await {
        Ok(()) => 0,
        Err(err) => match err.downcast_ref::<ExitError>() {
            Some(exit) => {
                tracing::error!("{}", exit.message);
                exit.code
            }
            None => {
                tracing::error!("{:#}", err);
                1
            }
        },
    };
    std::process::exit(code);
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = match cli.command {
        Command::Start { config, token, endpoint, spawn, name, health_addr } => {
            let mut loaded = config_file::load(config.as_deref())?;
            if let Some(token) = token {
                loaded.token = token;
            }
            if let Some(endpoint) = endpoint {
                loaded.endpoint = endpoint;
            }
            if let Some(spawn) = spawn {
                loaded.spawn = spawn;
            }
            if let Some(name) = name {
                loaded.name = name;
            }
            if let Some(health_addr) = health_addr {
                loaded.health_addr = Some(health_addr);
            }
            loaded
        }
        Command::Acquire { job_id, config, token, endpoint } => {
            let mut loaded = config_file::load(config.as_deref())?;
            if let Some(token) = token {
                loaded.token = token;
            }
            if let Some(endpoint) = endpoint {
                loaded.endpoint = endpoint;
            }
            loaded.acquire_job = Some(job_id);
            loaded.spawn = 1;
            loaded
        }
    };

    if config.token.is_empty() {
        anyhow::bail!("no registration token configured (flag --token, NAVVY_TOKEN, or config file)");
    }

    run_pool(config).await
}

async fn run_pool(config: AgentConfig) -> anyhow::Result<()> {
    let config = Arc::new(config);
    let executor = Arc::new(ProcessExecutor::new(config.bootstrap_command.clone()));
    let endpoint = config.endpoint.clone();
    let token = config.token.clone();

    let pool = Pool::new(
        Arc::clone(&config),
        executor,
        AgentMetrics::new(),
        Box::new(move |_| Arc::new(HttpClient::new(endpoint.clone(), token.clone()))),
    )?;

    tokio::spawn(watch_signals(Arc::clone(&pool)));

    match pool.run().await {
        Ok(()) => Ok(()),
        Err(AgentError::Api(ApiError::AcquisitionRejected)) => {
            Err(ExitError::new(EXIT_ACQUISITION_REJECTED, "job acquisition rejected").into())
        }
        Err(AgentError::Api(ApiError::Locked { .. })) => {
            Err(ExitError::new(EXIT_JOB_LOCKED, "job locked").into())
        }
        Err(err) => Err(err.into()),
    }
}

/// First signal stops gracefully (finish the current job), a second
/// stops ungracefully (cancel it).
async fn watch_signals(pool: Arc<Pool<HttpClient>>) {
    use tokio::signal::unix::{signal, SignalKind};

    let (Ok(mut interrupt), Ok(mut terminate)) =
        (signal(SignalKind::interrupt()), signal(SignalKind::terminate()))
    else {
        tracing::warn!("could not install signal handlers");
        return;
    };

    tokio::select! {
        _ = interrupt.recv() => {}
        _ = terminate.recv() => {}
    }
    pool.stop_gracefully();

    tokio::select! {
        _ = interrupt.recv() => {}
        _ = terminate.recv() => {}
    }
    tracing::warn!("second signal: stopping ungracefully");
    pool.stop_ungracefully();
}
