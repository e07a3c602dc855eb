//! kvrelay CLI - inspect store configuration and exercise the backlog

use anyhow::Result;
use clap::{Parser, Subcommand};
use kvrelay::StoreConfig;
use std::path::PathBuf;

mod commands;

#[derive(Parser)]
#[command(name = "kvrelay")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Path to the store configuration file
    #[arg(short, long, default_value = "./kvrelay.conf")]
    config: PathBuf,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the effective configuration
    Config {
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },

    /// Ride out a simulated outage against an in-memory cluster
    Demo {
        /// TTL of the demo write, in seconds
        #[arg(long, default_value_t = 60)]
        ttl: u32,

        /// Simulated seconds the cluster stays unreachable
        #[arg(long, default_value_t = 20)]
        outage: i64,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = StoreConfig::from_file(&cli.config);

    // Initialize logging
    let log_level = if cli.verbose {
        "debug".to_string()
    } else {
        config.log_level().to_string()
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level)),
        )
        .init();

    // Execute command
    match cli.command {
        Commands::Config { json } => {
            commands::config::execute(&cli.config, &config, json)?;
        }
        Commands::Demo { ttl, outage } => {
            commands::demo::execute(config, ttl, outage)?;
        }
    }

    Ok(())
}
