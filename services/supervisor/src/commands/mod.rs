//! CLI commands.

mod backup;
mod init;
mod start;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

use supervysor::config::default_config_path;

/// supervysor - keeps a KYVE data-source node in Normal or Ghost mode.
#[derive(Debug, Parser)]
#[command(name = "supervysor")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Resolve pool settings and write the config file.
    Init(init::InitCommand),

    /// Start the node and supervise it until interrupted.
    Start(start::StartCommand),

    /// Copy the node's data directory into ~/.supervysor/backups.
    Backup(backup::BackupCommand),

    /// Show version.
    Version,
}

impl Cli {
    /// Run the CLI command.
    pub async fn run(self) -> Result<()> {
        match self.command {
            Commands::Init(cmd) => cmd.run().await,
            Commands::Start(cmd) => cmd.run().await,
            Commands::Backup(cmd) => cmd.run().await,
            Commands::Version => {
                println!("supervysor {}", env!("CARGO_PKG_VERSION"));
                Ok(())
            }
        }
    }
}

/// `--config` if given, otherwise `~/.supervysor/config.toml`.
fn config_path(flag: Option<PathBuf>) -> Result<PathBuf> {
    match flag {
        Some(path) => Ok(path),
        None => Ok(default_config_path()?),
    }
}
