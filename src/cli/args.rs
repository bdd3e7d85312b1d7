//! Defines the command-line arguments for a Trellis-embedded runner binary.
//!
//! This module uses the `clap` crate with its "derive" feature to create a
//! declarative and type-safe argument parsing structure.

use clap::{Parser, ValueEnum};

/// The main CLI argument structure.
#[derive(Debug, Parser)]
#[command(
    name = "trellis",
    version,
    about = "A fixture-resolution and session-execution engine for test suites."
)]
pub struct TrellisArgs {
    /// Case-insensitive substring selecting tests by id; non-matching tests
    /// are reported as skipped.
    pub pattern: Option<String>,

    /// Number of parallel workers. 1 runs the sequential scheduler.
    #[arg(short = 'j', long = "jobs", default_value_t = 1)]
    pub jobs: usize,

    /// Result stream format.
    #[arg(long, value_enum, default_value_t = OutputFormat::Console)]
    pub format: OutputFormat,

    /// Disable colored output.
    #[arg(long)]
    pub no_color: bool,

    /// List collected test ids without running anything.
    #[arg(long)]
    pub list: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable lines with a closing summary.
    Console,
    /// One JSON object per result event.
    Json,
}
