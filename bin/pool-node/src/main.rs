//! The pool node serves an operator pool over newline-delimited JSON on stdin and stdout.

use std::{fs, path::Path};

use anyhow::Context;
use clap::Parser;
use config::Config;
use constants::{DEFAULT_SHUTDOWN_TIMEOUT, DEFAULT_THREAD_COUNT, DEFAULT_THREAD_STACK_SIZE};
use operator_pool_common::logging::{self, LoggerConfig};
use operator_pool_engine::prelude::*;
use operator_pool_params::prelude::PoolParams;
use serde::de::DeserializeOwned;
use sink::LoggingSink;
use tokio::{
    io::BufReader,
    runtime,
    sync::broadcast::{self, error::RecvError},
};
use tracing::{debug, info, trace, warn};

mod args;
mod commands;
mod config;
mod server;
mod sink;

mod constants;

fn main() -> anyhow::Result<()> {
    let cli = args::Cli::parse();

    let params = parse_toml::<PoolParams>(&cli.params)?;
    let config = parse_toml::<Config>(&cli.config)?;

    let mut logger_config = LoggerConfig::with_base_name("pool-node");
    if let Some(url) = config
        .otlp_url
        .clone()
        .or_else(logging::get_otlp_url_from_env)
    {
        logger_config.set_otlp_url(url);
    }

    let runtime = runtime::Builder::new_multi_thread()
        .worker_threads(config.num_threads.unwrap_or(DEFAULT_THREAD_COUNT).into())
        .thread_stack_size(
            config
                .thread_stack_size
                .unwrap_or(DEFAULT_THREAD_STACK_SIZE),
        )
        .enable_all()
        .build()
        .context("must be able to create runtime")?;

    runtime.block_on(async move {
        // the OTLP exporter needs a runtime to spawn its batch task on
        logging::init(logger_config)?;
        info!(params = ?cli.params, config = ?cli.config, "starting pool node");

        run(params, config).await
    })?;

    info!("pool node shutdown complete");

    Ok(())
}

async fn run(params: PoolParams, config: Config) -> anyhow::Result<()> {
    let pool = OperatorPool::new(params, LoggingSink::new(config.sink))
        .context("invalid pool params")?;
    let actor = PoolActor::spawn(pool);
    let event_log = tokio::spawn(log_events(actor.subscribe()));

    server::serve(
        &actor,
        BufReader::new(tokio::io::stdin()),
        tokio::io::stdout(),
    )
    .await?;

    let shutdown_timeout = config.shutdown_timeout.unwrap_or(DEFAULT_SHUTDOWN_TIMEOUT);
    match tokio::time::timeout(shutdown_timeout, actor.shutdown()).await {
        Ok(pool) => {
            let pool = pool?;
            info!(
                sink_total = %pool.sink().total(),
                open_jobs = pool.scheduler().jobs().count(),
                "pool actor stopped"
            );
            // the log ends once the actor's event sender is gone
            let _ = event_log.await;
        }
        Err(_) => {
            warn!(?shutdown_timeout, "pool actor shutdown timed out");
            event_log.abort();
        }
    }

    Ok(())
}

/// Logs every pool event until the actor stops.
async fn log_events(mut events: broadcast::Receiver<PoolEvent>) {
    loop {
        match events.recv().await {
            Ok(event) => info!(job_id = ?event.job_id(), ?event, "pool event"),
            Err(RecvError::Lagged(missed)) => warn!(%missed, "event log fell behind"),
            Err(RecvError::Closed) => break,
        }
    }
}

/// Reads and parses a TOML file from the given path into the given type `T`.
fn parse_toml<T>(path: impl AsRef<Path>) -> anyhow::Result<T>
where
    T: std::fmt::Debug + DeserializeOwned,
{
    let path = path.as_ref();
    let contents = fs::read_to_string(path)
        .with_context(|| format!("failed to read TOML file {}", path.display()))?;
    trace!(?contents, "read file");

    let parsed = toml::from_str::<T>(&contents)
        .with_context(|| format!("failed to parse TOML file {}", path.display()))?;
    debug!(?parsed, "parsed TOML file");

    Ok(parsed)
}
