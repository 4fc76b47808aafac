//! eidsq - filesystem-mediated notification queue
//!
//! A thin CLI over `eidsq-core`: publish notifications into a shared
//! directory, drain it once, or watch it until interrupted.

use clap::Parser;

mod commands;

use commands::Cli;

fn main() {
    let cli = Cli::parse();

    if let Err(e) = cli.execute() {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
}
