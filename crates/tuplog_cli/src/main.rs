//! tuplog CLI
//!
//! Command-line tools for tuplog data directories.
//!
//! # Commands
//!
//! - `recover` - Run recovery and report the outcome through the exit status
//! - `inspect` - List snapshots and segments with their headers
//! - `dump` - Print the records of one snapshot or segment
//! - `verify` - Check every file and dry-run recovery without writing
//! - `version` - Show version information

mod commands;

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// tuplog command-line tools.
#[derive(Parser)]
#[command(name = "tuplog")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the data directory
    #[arg(global = true, short, long)]
    path: Option<PathBuf>,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Format {
    /// Human-readable text
    Text,
    /// JSON on stdout
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Recover the data directory and report what recovery did
    Recover {
        /// Skip duplicate keys and continue past missing log records instead of failing
        #[arg(long)]
        force_recovery: bool,

        /// Output format
        #[arg(short, long, value_enum, default_value = "text")]
        format: Format,
    },

    /// List snapshots and segments
    Inspect {
        /// Output format
        #[arg(short, long, value_enum, default_value = "text")]
        format: Format,
    },

    /// Print the records of a snapshot or segment
    Dump {
        /// File name inside the data directory, e.g. 00000000000000000001.xlog
        #[arg(long)]
        file: String,

        /// Maximum number of records to print
        #[arg(short, long)]
        limit: Option<usize>,

        /// Output format
        #[arg(short, long, value_enum, default_value = "text")]
        format: Format,
    },

    /// Check every file and dry-run recovery
    Verify {
        /// Dry-run recovery with the permissive conflict policy
        #[arg(long)]
        force_recovery: bool,
    },

    /// Show version information
    Version,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Logs go to stderr so JSON output stays parseable
    let level = if cli.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Recover {
            force_recovery,
            format,
        } => {
            let path = cli.path.ok_or("Data directory path required for recover")?;
            commands::recover::run(&path, force_recovery, format)?;
        }
        Commands::Inspect { format } => {
            let path = cli.path.ok_or("Data directory path required for inspect")?;
            commands::inspect::run(&path, format)?;
        }
        Commands::Dump {
            file,
            limit,
            format,
        } => {
            let path = cli.path.ok_or("Data directory path required for dump")?;
            commands::dump::run(&path, &file, limit, format)?;
        }
        Commands::Verify { force_recovery } => {
            let path = cli.path.ok_or("Data directory path required for verify")?;
            commands::verify::run(&path, force_recovery)?;
        }
        Commands::Version => {
            println!("tuplog CLI v{}", env!("CARGO_PKG_VERSION"));
            println!("tuplog core v{}", tuplog_core::VERSION);
        }
    }

    Ok(())
}
