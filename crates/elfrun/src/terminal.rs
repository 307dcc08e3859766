//! Styled output helpers.

use console::style;
use elfrun::RunReport;

use crate::cli::OutputFormat;

/// Print the value returned by the entry point on stdout.
pub fn print_report(format: OutputFormat, report: &RunReport) {
    match format {
        OutputFormat::Text => println!("Entry point returned value = {}", report.value),
        OutputFormat::Raw => println!("{}", report.value),
        OutputFormat::Json => println!(
            r#"{{"entry":"{}","value":{}}}"#,
            report.entry, report.value
        ),
    }
}

/// Print a fatal diagnostic on stderr, whatever the log filter says.
pub fn print_failure(err: &elfrun::Error) {
    eprintln!(
        "{} {}",
        style("✗").red().bold().for_stderr(),
        style(err).for_stderr()
    );
}
