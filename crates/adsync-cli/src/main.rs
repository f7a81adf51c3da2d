//! adsync CLI - Command-line interface for adsync
//!
//! Provides commands for:
//! - Importing directory users into the local store
//! - Exporting local profile fields back to the directory
//! - Checking directory credentials
//! - Viewing configuration and batch history

use std::fs::OpenOptions;
use std::path::PathBuf;
use std::sync::Mutex;

use adsync_core::config::Config;
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::EnvFilter;

mod commands;
mod output;

use commands::{
    batch::{ExportCommand, ImportCommand},
    check::CheckCommand,
    config::ConfigCommand,
    history::HistoryCommand,
};
use output::OutputFormat;

#[derive(Debug, Parser)]
#[command(
    name = "adsync",
    version,
    about = "Synchronize users between Active Directory and a local user store"
)]
pub struct Cli {
    /// Output in JSON format
    #[arg(long, global = true)]
    json: bool,

    /// Verbose output (can be repeated: -v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Use alternate config file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Import directory users into the local store
    Import(ImportCommand),
    /// Export local profile fields to the directory
    Export(ExportCommand),
    /// Check that a directory account can bind
    Check(CheckCommand),
    /// View and validate configuration
    #[command(subcommand)]
    Config(ConfigCommand),
    /// Show recent synchronization batches
    History(HistoryCommand),
}

/// Settings every command receives
#[derive(Debug)]
pub struct GlobalArgs {
    pub config_path: PathBuf,
    pub format: OutputFormat,
    pub verbose: bool,
}

impl GlobalArgs {
    /// Loads the configuration, falling back to defaults when the file is absent
    pub fn load_config(&self) -> Result<Config> {
        if !self.config_path.exists() {
            return Ok(Config::default());
        }
        Config::load(&self.config_path)
            .with_context(|| format!("Failed to load {}", self.config_path.display()))
    }
}

/// Installs the global tracing subscriber
///
/// `RUST_LOG` wins over `-v`, which wins over `logging.level`.
fn init_tracing(config: &Config, verbose: u8) -> Result<()> {
    let level = match verbose {
        0 => config.logging.level.as_str(),
        1 => "debug",
        _ => "trace",
    };
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let writer = match &config.logging.file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log file {}", path.display()))?;
            BoxMakeWriter::new(Mutex::new(file))
        }
        None => BoxMakeWriter::new(std::io::stderr),
    };

    if config.logging.format == "json" {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(env_filter)
            .with_writer(writer)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .with_writer(writer)
            .init();
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let global = GlobalArgs {
        config_path: cli.config.clone().unwrap_or_else(Config::default_path),
        format: if cli.json {
            OutputFormat::Json
        } else {
            OutputFormat::Human
        },
        verbose: cli.verbose > 0,
    };

    // A broken file is reported by `config validate`; logging falls back to defaults
    let logging_config = global.load_config().unwrap_or_default();
    init_tracing(&logging_config, cli.verbose)?;

    match cli.command {
        Commands::Import(cmd) => cmd.execute(&global).await,
        Commands::Export(cmd) => cmd.execute(&global).await,
        Commands::Check(cmd) => cmd.execute(&global).await,
        Commands::Config(cmd) => cmd.execute(&global).await,
        Commands::History(cmd) => cmd.execute(&global).await,
    }
}
