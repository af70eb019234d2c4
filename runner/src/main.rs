//! Runs auto-CDC targets from newline-delimited JSON sources into a file-backed store.

use clap::Parser;
use std::path::PathBuf;
use tracing::{error, info};

use crate::config::load_runner_config;
use crate::core::{RunOptions, start_runner};

mod config;
mod core;
mod source;

/// Command line of the runner.
#[derive(Debug, Parser)]
#[command(name = "cdc-runner", about = "Runs auto-CDC targets into a file-backed store")]
struct Args {
    /// Runs only the named target, can be repeated.
    #[arg(long = "target")]
    targets: Vec<String>,

    /// Stops every target once its source is exhausted.
    #[arg(long)]
    once: bool,

    /// Clears the selected targets before running them.
    #[arg(long)]
    full_refresh: bool,

    /// Directory holding `base.yaml` and the environment files.
    #[arg(long)]
    config_dir: Option<PathBuf>,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let config = load_runner_config(args.config_dir.as_deref())?;

    let _log_flusher = telemetry::init_tracing(env!("CARGO_BIN_NAME"), Some(config.pipeline.id))?;

    let options = RunOptions {
        targets: args.targets,
        once: args.once,
        full_refresh: args.full_refresh,
    };

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?
        .block_on(async_main(config, options))
}

async fn async_main(
    config: crate::config::RunnerConfig,
    options: RunOptions,
) -> anyhow::Result<()> {
    info!(
        pipeline_id = config.pipeline.id,
        store_dir = %config.store_dir.display(),
        "starting cdc runner"
    );

    if let Err(err) = start_runner(config, options).await {
        error!(error = %err, "cdc runner failed");
        return Err(err);
    }

    info!("cdc runner completed");

    Ok(())
}
