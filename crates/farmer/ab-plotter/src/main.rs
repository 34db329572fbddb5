//! Proof of space plotter CLI

mod commands;

use ab_cli_utils::{init_logger, set_exit_on_panic};
use clap::Parser;
use std::path::PathBuf;
use tracing::info;

/// Proof of space plotter
#[derive(Debug, Parser)]
#[clap(about, version)]
enum Command {
    /// Create a new plot
    Create(commands::create::CreateArgs),
    /// Print information about plots and their tables
    Info {
        /// One or more plot files.
        ///
        /// Example:
        ///   /path/to/plot.bin
        plots: Vec<PathBuf>,
    },
}

fn main() -> anyhow::Result<()> {
    set_exit_on_panic();
    init_logger();

    match Command::parse() {
        Command::Create(create_args) => {
            commands::create::create(create_args)?;
        }
        Command::Info { plots } => {
            if plots.is_empty() {
                info!("No plot was specified, so there is nothing to do");
            } else {
                commands::info::info(&plots)?;
            }
        }
    }

    Ok(())
}
