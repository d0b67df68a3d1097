//! CLI type definitions: clap command structures for the four-command
//! surface of spec.md §6.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "nebula")]
#[command(about = "Quasar Nebula - phase orchestration engine", long_about = None)]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Output in JSON format
    #[arg(short, long, global = true)]
    pub json: bool,

    /// Nebula directory (defaults to the current directory)
    #[arg(long, global = true, default_value = ".")]
    pub nebula_dir: PathBuf,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Validate, correct, and compile the phase set into an execution plan
    Generate {
        /// Write the compiled plan to `nebula.plan.json` instead of only printing it
        #[arg(long)]
        write: bool,
    },
    /// Run the worker group against the validated phase set
    Apply {
        /// Maximum concurrently-running phases (overrides manifest/config)
        #[arg(long)]
        max_workers: Option<usize>,
        /// Never prompt interactively; accept every gate automatically
        #[arg(long)]
        auto: bool,
    },
    /// Print current phase/run status from the journal and metrics file
    Status,
    /// Resume a previously interrupted run from the saved journal
    Resume {
        #[arg(long)]
        max_workers: Option<usize>,
        #[arg(long)]
        auto: bool,
    },
}
