//! supervysor
//!
//! Supervises a KYVE data-source node, switching it between Normal mode and
//! Ghost mode (seeds overridden, alternate p2p port) based on how far its height
//! trails the pool height.

use std::process::ExitCode;

use clap::Parser;

mod commands;
mod logging;

use commands::Cli;

#[tokio::main]
async fn main() -> ExitCode {
    logging::init();

    let cli = Cli::parse();

    match cli.run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::from(1)
        }
    }
}
