// src/main.rs

//! LexWatch: judgment watch worker CLI
//!
//! The `run` subcommand starts the long-running worker; the others are
//! one-shot operator tools for local testing and troubleshooting.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};

use lexwatch::config::{load_and_validate, load_config};
use lexwatch::error::{AppError, Result};
use lexwatch::pipeline::check_poll_requests;
use lexwatch::scheduler::{build_runtime, run_worker, Runtime};

#[derive(Parser, Debug)]
#[command(
    name = "lexwatch",
    version = "0.1.0",
    about = "Watches a legal-judgment search API and alerts on new matches"
)]

/// CLI Arguments
struct Cli {
    #[arg(short, long, default_value = "data/config.toml")]
    config: String,

    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Command,
}

/// CLI Commands
#[derive(Subcommand, Debug)]
enum Command {
    /// Run the worker (all schedules) until interrupted
    Run,
    /// Validate the configuration file
    Validate,
    /// Poll one watch immediately, bypassing its interval
    Poll {
        #[arg(long)]
        watch: String,
    },
    /// Process pending on-demand poll requests once
    Requests,
    /// Dispatch pending notifications once
    Dispatch,
    /// Send the daily digest now
    Digest,
}

/// Main entry point
#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config_path = PathBuf::from(&cli.config);
    let config = load_config(&config_path);

    let level = if cli.quiet {
        "error".to_string()
    } else {
        config.logging.level.clone()
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    match cli.command {
        Command::Run => run_worker(config).await?,
        Command::Validate => {
            load_and_validate(&config_path)?;
            log::info!("Configuration OK: {}", config_path.display());
        }
        Command::Poll { watch } => {
            config.validate()?;
            let Runtime { store, engine, .. } = build_runtime(Arc::new(config))?;
            let target = store
                .watch(&watch)
                .await?
                .ok_or_else(|| AppError::validation(format!("watch {watch} not found")))?;
            let matches = engine.poll_watch(&target).await?;
            log::info!("Polled {}: {} new match(es)", target.name, matches.len());
        }
        Command::Requests => {
            config.validate()?;
            let Runtime { store, engine, .. } = build_runtime(Arc::new(config))?;
            check_poll_requests(store.as_ref(), &engine).await?;
        }
        Command::Dispatch => {
            config.validate()?;
            let Runtime { notifier, .. } = build_runtime(Arc::new(config))?;
            notifier.dispatch_pending().await?;
        }
        Command::Digest => {
            config.validate()?;
            let Runtime { notifier, .. } = build_runtime(Arc::new(config))?;
            notifier.send_daily_digest().await?;
        }
    }

    Ok(())
}
