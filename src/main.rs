mod commands;

use anyhow::Result;
use archivist::sysexits;
use clap::Parser;
use commands::Cli;
use std::process;

/// Entry point for the archivist CLI.
/// Parses command-line arguments, sets up logging and runs the declared jobs.
fn main() -> Result<()> {
    let cli = Cli::parse();
    if let Err(e) = commands::init_logging(&cli) {
        eprintln!("archivist: {e:#}");
        process::exit(sysexits::EX_USAGE);
    }

    let status = commands::run(&cli)?;
    if status != 0 {
        process::exit(status);
    }
    Ok(())
}
