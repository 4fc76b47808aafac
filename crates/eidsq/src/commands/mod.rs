//! CLI command dispatch and execution

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use eidsq_core::config::{resolve_config, ConfigOverrides, QueueConfig};
use eidsq_core::logging;
use std::path::PathBuf;

mod config_cmd;
mod drain;
mod watch;
mod write;

/// eidsq - filesystem-mediated notification queue
#[derive(Parser, Debug)]
#[command(
    name = "eidsq",
    version,
    about = "Filesystem-mediated notification queue",
    long_about = "Publish notifications as uniquely named files in a shared directory, \
                  and drain that directory in arrival order"
)]
pub struct Cli {
    #[command(flatten)]
    queue: QueueArgs,

    /// Log at DEBUG level (otherwise EIDSQ_LOG, default info)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Publish one notification into the queue
    Write(write::WriteArgs),

    /// Process every queued notification once and exit
    Drain(drain::DrainArgs),

    /// Drain, then keep processing new notifications until interrupted
    Watch(watch::WatchArgs),

    /// Show the resolved queue configuration
    Config(config_cmd::ConfigArgs),
}

/// Queue configuration flags, shared by every subcommand
#[derive(Args, Debug, Default)]
pub struct QueueArgs {
    /// Path to a TOML config file (default: ./eidsq.toml if present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Shared queue directory
    #[arg(
        long = "notificationDir",
        aliases = ["notification-dir", "notificationdir"],
        value_name = "DIR",
        global = true
    )]
    notification_dir: Option<PathBuf>,

    /// File name prefix
    #[arg(
        long = "notificationFilePrefix",
        aliases = ["prefix", "notificationfileprefix"],
        value_name = "PREFIX",
        global = true
    )]
    prefix: Option<String>,

    /// File name extension
    #[arg(
        long = "notificationFileExtension",
        aliases = ["extension", "notificationfileextension"],
        value_name = "EXT",
        global = true
    )]
    extension: Option<String>,

    /// Archive directory for processed files (default: delete them)
    #[arg(
        long = "processedDir",
        aliases = ["processed-dir", "processeddir"],
        value_name = "DIR",
        global = true
    )]
    processed_dir: Option<PathBuf>,

    /// Quarantine directory for files that fail to decode
    #[arg(
        long = "failedDir",
        aliases = ["failed-dir", "faileddir"],
        value_name = "DIR",
        global = true
    )]
    failed_dir: Option<PathBuf>,
}

impl QueueArgs {
    fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            config_path: self.config.clone(),
            notification_dir: self.notification_dir.clone(),
            prefix: self.prefix.clone(),
            extension: self.extension.clone(),
            processed_dir: self.processed_dir.clone(),
            failed_dir: self.failed_dir.clone(),
        }
    }

    /// Resolve the effective configuration against the current directory
    pub fn resolve(&self) -> Result<QueueConfig> {
        let current_dir = std::env::current_dir().context("Failed to read current directory")?;
        let config = resolve_config(&self.overrides(), &current_dir)?;
        Ok(config)
    }
}

/// How payloads are interpreted
#[derive(ValueEnum, Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PayloadFormat {
    /// Opaque bytes
    #[default]
    Raw,
    /// A JSON URL notification document
    Json,
}

impl Cli {
    /// Execute the CLI command
    pub fn execute(self) -> Result<()> {
        if self.verbose {
            logging::init_with_level(tracing::Level::DEBUG);
        } else {
            logging::init();
        }

        match self.command {
            Commands::Write(args) => write::execute(&self.queue, args),
            Commands::Drain(args) => drain::execute(&self.queue, args),
            Commands::Watch(args) => watch::execute(&self.queue, args),
            Commands::Config(args) => config_cmd::execute(&self.queue, args),
        }
    }
}
