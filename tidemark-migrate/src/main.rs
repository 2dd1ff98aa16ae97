//! Tidemark Migration CLI Tool
//!
//! Command-line interface for managing SQL migrations against PostgreSQL.
//! Supports both interactive use and CI/CD pipelines (non-zero exit on failure).

use clap::Parser;
use colored::Colorize;
use std::process;
use tidemark_migrate::{commands, Cli};

fn main() {
    dotenv::dotenv().ok();
    let cli = Cli::parse();

    // Initialize logging
    let level = if cli.quiet {
        "error"
    } else if cli.verbose {
        "debug"
    } else {
        "info"
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    let quiet = cli.quiet;
    match commands::run(cli) {
        Ok(()) => {
            if !quiet {
                println!("{}", "Done".green());
            }
        }
        Err(e) => {
            eprintln!("{} {e:#}", "Error:".red().bold());
            process::exit(1);
        }
    }
}
