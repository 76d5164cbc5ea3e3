//! CLI Module
//!
//! Command-line interface driving a chain of mock units.

pub mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// fxchain - audio effect chain orchestrator
#[derive(Parser, Debug)]
#[command(name = "fxchain-cli")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Build a chain, apply mutations and process silent blocks
    #[command(name = "run")]
    Run {
        /// Chain config file (JSON); defaults apply when omitted
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Stage to append, as `unit[@layout]` (repeatable)
        #[arg(short, long = "stage", required = true)]
        stages: Vec<String>,

        /// Number of blocks to process
        #[arg(short, long, default_value_t = 16)]
        blocks: usize,

        /// Bypass the stage at this index (repeatable)
        #[arg(long = "bypass")]
        bypass: Vec<usize>,

        /// Swap two stages, as `a,b`
        #[arg(long, value_parser = parse_pair)]
        swap: Option<(usize, usize)>,

        /// Remove the stage at this index after the other mutations
        #[arg(long)]
        remove: Option<usize>,
    },

    /// Print the layouts a unit supports
    #[command(name = "layouts")]
    Layouts {
        /// Unit identifier, e.g. `mock:verb`
        unit: String,
    },

    /// Write a default config file
    #[command(name = "init-config")]
    InitConfig {
        /// Destination path
        path: PathBuf,
    },
}

/// Parse `a,b` into an index pair
pub fn parse_pair(value: &str) -> std::result::Result<(usize, usize), String> {
    let (a, b) = value
        .split_once(',')
        .ok_or_else(|| format!("expected `a,b`, got `{}`", value))?;
    let a = a.trim().parse().map_err(|e| format!("invalid index `{}`: {}", a, e))?;
    let b = b.trim().parse().map_err(|e| format!("invalid index `{}`: {}", b, e))?;
    Ok((a, b))
}

/// Split `unit[@layout]` into unit id and optional layout name
pub fn parse_stage_arg(value: &str) -> (&str, Option<&str>) {
    match value.rsplit_once('@') {
        Some((unit, layout)) if !layout.is_empty() => (unit, Some(layout)),
        Some((unit, _)) => (unit, None),
        None => (value, None),
    }
}
