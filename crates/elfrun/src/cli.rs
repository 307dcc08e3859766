//! CLI definitions and argument types.

use std::path::PathBuf;

use clap::{Parser, ValueEnum};
use elfrun::{LoadOptions, MapPolicy, Validation};

/// Exit code for success.
pub const EXIT_SUCCESS: i32 = 0;
/// Exit code for failure.
pub const EXIT_FAILURE: i32 = 1;

#[derive(Parser)]
#[command(name = "elfrun")]
#[command(about = "Load a statically linked ELF32 executable and call its entry point")]
#[command(version)]
pub struct Cli {
    /// ELF executable to load
    #[arg(value_name = "ELF")]
    pub input: PathBuf,

    /// Output format for the returned value
    #[arg(long, value_enum, default_value = "text")]
    pub format: OutputFormat,

    /// Fail instead of replacing memory already mapped at a segment address
    #[arg(long)]
    pub no_replace: bool,

    /// Check ELF magic, class and byte order before trusting the header
    #[arg(long)]
    pub strict: bool,

    /// Enable verbose output (debug logging)
    #[arg(short, long)]
    pub verbose: bool,

    /// Suppress output (only show errors)
    #[arg(short, long, conflicts_with = "verbose")]
    pub silent: bool,
}

impl Cli {
    pub const fn load_options(&self) -> LoadOptions {
        LoadOptions {
            map_policy: if self.no_replace {
                MapPolicy::NoReplace
            } else {
                MapPolicy::Replace
            },
            validation: if self.strict {
                Validation::Strict
            } else {
                Validation::None
            },
        }
    }

    pub const fn log_level(&self) -> &'static str {
        if self.verbose {
            "debug"
        } else if self.silent {
            "error"
        } else {
            "warn"
        }
    }
}

#[derive(Clone, Copy, Debug, Default, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable output (default)
    #[default]
    Text,
    /// Just the returned value
    Raw,
    /// JSON output
    Json,
}
