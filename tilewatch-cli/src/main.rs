//! tilewatch CLI
//!
//! Drives the tilewatch library from the command line: run a loader and
//! update-loop simulation, or inspect the effective configuration.

mod commands;
mod error;

use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand};

use commands::common::load_config;
use commands::simulate::SimulateArgs;
use error::CliError;
use tilewatch::logging::init_logging;

#[derive(Parser)]
#[command(name = "tilewatch")]
#[command(version, about = "Terrain tile notifications and height queries", long_about = None)]
struct Cli {
    /// Log at debug level (overridden by RUST_LOG)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Simulate loader threads streaming tiles into a live terrain
    Simulate(SimulateArgs),

    /// Show the effective configuration
    Config {
        /// INI configuration file
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

fn main() {
    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

fn run(cli: Cli) -> Result<(), CliError> {
    match cli.command {
        Commands::Simulate(args) => {
            let mut config = load_config(args.config.as_deref())?;
            if cli.verbose {
                config.logging.level = "debug".to_string();
            }
            let _logging = init_logging(&config.logging)?;
            commands::simulate::run(args, &config, cli.verbose)
        }
        Commands::Config { config } => commands::config::run(config.as_deref()),
    }
}
