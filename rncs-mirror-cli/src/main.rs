//! rncs-mirror - Command-line interface
//!
//! Mirrors the RNCS financial-statement archives from an FTPS server to a
//! local directory, verifying every archive against its MD5 checksum file.

mod commands;
mod error;

use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand};

use commands::config::ConfigCommands;
use commands::mirror::MirrorArgs;
use error::CliError;

#[derive(Debug, Parser)]
#[command(name = "rncs-mirror", version, about, long_about = None)]
struct Cli {
    /// Log debug details (RUST_LOG takes precedence)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Mirror the remote tree into the local root
    Mirror(MirrorArgs),

    /// Check a local archive against its checksum file
    Verify {
        /// Path to the .zip archive or its .md5 file
        path: PathBuf,
    },

    /// View or change configuration
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

fn main() {
    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        eprintln!("Error: {}", e);
        process::exit(e.exit_code());
    }
}

fn run(cli: Cli) -> Result<(), CliError> {
    match cli.command {
        Commands::Mirror(args) => commands::mirror::run(args, cli.verbose),
        Commands::Verify { path } => commands::verify::run(&path),
        Commands::Config { command } => commands::config::run(command),
    }
}
