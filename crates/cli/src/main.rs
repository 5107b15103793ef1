//! Latch CLI - log in once, call authenticated endpoints afterwards

mod commands;
mod config;

use anyhow::Result;
use clap::{Parser, ValueEnum};
use commands::Commands;
use latch_core::tracing::{InstrumentationConfig, init_tracing};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, error};

#[derive(Parser)]
#[command(name = "latch")]
#[command(about = "Client for token-authenticated HTTP APIs")]
#[command(version)]
struct Cli {
    /// Set logging level
    #[arg(short = 'l', long, global = true, default_value = "warn")]
    log_level: LogLevel,

    /// Directory for persisted state (credentials, config)
    #[arg(short = 'd', long, global = true)]
    state_dir: Option<PathBuf>,

    /// Base URL of the authentication backend
    #[arg(short = 'u', long, global = true)]
    base_url: Option<String>,

    /// Configuration file (TOML or YAML)
    #[arg(short = 'c', long, global = true)]
    config: Option<PathBuf>,

    /// Timeout for the whole command in seconds (0 = no timeout)
    #[arg(short = 't', long, global = true, default_value = "30")]
    timeout: u64,

    #[command(subcommand)]
    command: Commands,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let instrumentation = InstrumentationConfig::from_env().with_level(cli.log_level.as_filter());
    init_tracing(&instrumentation)?;

    let config = config::load(
        cli.config.as_deref(),
        cli.state_dir.clone(),
        cli.base_url.clone(),
    )?;
    debug!(base_url = %config.base_url, "loaded configuration");

    let run = cli.command.execute(config);
    let outcome = if cli.timeout == 0 {
        run.await
    } else {
        match tokio::time::timeout(Duration::from_secs(cli.timeout), run).await {
            Ok(result) => result,
            Err(_) => {
                error!("Command timed out after {} seconds", cli.timeout);
                std::process::exit(1);
            }
        }
    };

    if let Err(e) = outcome {
        error!("Command failed: {e}");
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }

    Ok(())
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    const fn as_filter(self) -> &'static str {
        match self {
            Self::Error => "error",
            Self::Warn => "warn",
            Self::Info => "info",
            Self::Debug => "debug",
            Self::Trace => "trace",
        }
    }
}
