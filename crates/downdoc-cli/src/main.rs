//! downdoc CLI - AsciiDoc to Markdown converter.
//!
//! Reads an AsciiDoc document from a file or stdin and writes the converted
//! Markdown to a file or stdout.

mod commands;
mod error;
mod output;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use commands::ConvertArgs;
use output::Output;

/// downdoc - Convert AsciiDoc to Markdown.
#[derive(Parser)]
#[command(name = "downdoc", version, about)]
struct Cli {
    #[command(flatten)]
    args: ConvertArgs,
}

fn main() {
    let cli = Cli::parse();
    let output = Output::new();

    // --verbose enables INFO level, otherwise use RUST_LOG
    let filter = if cli.args.verbose {
        EnvFilter::new("info")
    } else {
        EnvFilter::from_default_env()
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    if let Err(err) = cli.args.execute() {
        output.error(&format!("Error: {err}"));
        std::process::exit(1);
    }
}
