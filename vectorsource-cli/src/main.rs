//! vectorsource CLI - exercise the tile dispatch core from the command line.

mod commands;
mod error;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use vectorsource::logging::{default_log_file, init_logging};

use commands::simulate::SimulateArgs;
use error::CliError;

#[derive(Parser)]
#[command(name = "vectorsource")]
#[command(about = "Drive a custom vector source with a synthetic tile provider", long_about = None)]
#[command(version)]
struct Cli {
    /// Also write logs to this directory
    #[arg(long, global = true)]
    log_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Request a sweep of tiles and report dispatcher statistics
    Simulate {
        /// Zoom level to sweep
        #[arg(long, default_value = "4")]
        zoom: u8,

        /// Number of tiles to request
        #[arg(long, default_value = "64")]
        tiles: usize,

        /// Provider delay per tile in milliseconds
        #[arg(long, default_value = "20")]
        delay_ms: u64,

        /// Percentage of tiles the provider fails (0-100)
        #[arg(long, default_value = "0")]
        failure_rate: u8,

        /// INI file with a [dispatch] section
        #[arg(long)]
        config: Option<PathBuf>,

        /// Override the queue capacity
        #[arg(long)]
        queue_capacity: Option<usize>,

        /// Override the worker pool size
        #[arg(long)]
        pool_size: Option<usize>,

        /// Override the per-fetch timeout in milliseconds
        #[arg(long)]
        timeout_ms: Option<u64>,
    },

    /// Write a configuration file with default values
    InitConfig {
        /// Destination path
        path: PathBuf,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

fn main() {
    let cli = Cli::parse();

    let _logging_guard = match init_logging(cli.log_dir.as_deref(), default_log_file()) {
        Ok(guard) => guard,
        Err(e) => CliError::LoggingInit(e.to_string()).exit(),
    };

    let result = match cli.command {
        Commands::Simulate {
            zoom,
            tiles,
            delay_ms,
            failure_rate,
            config,
            queue_capacity,
            pool_size,
            timeout_ms,
        } => commands::simulate::run(SimulateArgs {
            zoom,
            tiles,
            delay_ms,
            failure_rate,
            config,
            queue_capacity,
            pool_size,
            timeout_ms,
        }),
        Commands::InitConfig { path, force } => commands::init_config::run(&path, force),
    };

    if let Err(e) = result {
        e.exit();
    }
}
