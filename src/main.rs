//! fxchain CLI - Audio Effect Chain Orchestrator
//!
//! Command-line interface for building and exercising effect chains.

use anyhow::Result;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use fxchain::cli::commands::{self, RunPlan};
use fxchain::cli::{Cli, Commands};

fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("fxchain v{}", env!("CARGO_PKG_VERSION"));

    match cli.command {
        Some(cmd) => handle_command(cmd),
        None => {
            println!("fxchain v{}", env!("CARGO_PKG_VERSION"));
            println!("Use --help for available commands");
            Ok(())
        }
    }
}

fn handle_command(cmd: Commands) -> Result<()> {
    match cmd {
        Commands::Run {
            config,
            stages,
            blocks,
            bypass,
            swap,
            remove,
        } => {
            let plan = RunPlan {
                stages,
                blocks,
                bypass,
                swap,
                remove,
            };
            commands::run(config.as_deref(), &plan)?;
        }
        Commands::Layouts { unit } => commands::show_layouts(&unit)?,
        Commands::InitConfig { path } => commands::init_config(&path)?,
    }
    Ok(())
}
