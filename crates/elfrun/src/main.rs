//! elfrun CLI - ELF32 loader

mod cli;
mod terminal;

use clap::Parser;
use tracing::debug;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::format::FmtSpan;

use cli::{Cli, EXIT_FAILURE, EXIT_SUCCESS};

fn main() {
    // Wrong argument counts exit here with usage on stderr, before any
    // file is touched.
    let cli = Cli::parse();

    let level = cli.log_level();
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "elfrun={level},elfrun_elf={level},elfrun_map={level}"
        ))
    });
    // stdout carries only the result line.
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_span_events(FmtSpan::CLOSE)
        .init();

    std::process::exit(run(&cli));
}

fn run(cli: &Cli) -> i32 {
    let options = cli.load_options();

    // The operator asked for this file to be executed in-process.
    match unsafe { elfrun::run(&cli.input, &options) } {
        Ok(report) => {
            terminal::print_report(cli.format, &report);
            EXIT_SUCCESS
        }
        Err(e) => {
            debug!(kind = ?e.kind(), path = %cli.input.display(), "load failed");
            terminal::print_failure(&e);
            EXIT_FAILURE
        }
    }
}
