//! flagdelta CLI
//!
//! Command-line tools for exercising the delta cache.
//!
//! # Commands
//!
//! - `replay` - Replay a scenario of feature edits and client polls
//! - `version` - Show version information

mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// flagdelta command-line tools.
#[derive(Parser)]
#[command(name = "flagdelta")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Replay a scenario through an in-memory store and a live cache
    Replay {
        /// Path to the scenario JSON file
        scenario: PathBuf,

        /// Override the scenario's revision log capacity
        #[arg(short, long)]
        capacity: Option<usize>,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Show version information
    Version,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Replay {
            scenario,
            capacity,
            format,
        } => {
            commands::replay::run(&scenario, capacity, &format)?;
        }
        Commands::Version => {
            println!("flagdelta CLI v{}", env!("CARGO_PKG_VERSION"));
            println!("flagdelta core v{}", flagdelta_core::VERSION);
        }
    }

    Ok(())
}
