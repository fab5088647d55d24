//! # counterpart
//!
//! CLI for running and inspecting the Counterpart heart-rate pairing protocol.
//!
//! ## Commands
//!
//! - `demo`: Run a simulated wearable and handheld on an in-memory mesh
//! - `relay`: Run a relay receiver and log every heart-rate message
//! - `send`: Stream simulated readings to a relay
//! - `config`: Print the effective configuration
//!
//! ## Example
//!
//! ```bash
//! # Watch a pairing come up and stream for 20 seconds
//! counterpart demo --seconds 20
//!
//! # In one terminal, run a relay
//! counterpart relay --listen 127.0.0.1:7400
//!
//! # In another, stream 30 readings to it
//! counterpart send --relay 127.0.0.1:7400 --count 30
//! ```

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod commands;
mod config;

use commands::{demo, relay, send, show_config};

/// CLI for the Counterpart heart-rate pairing protocol.
#[derive(Parser, Debug)]
#[command(name = "counterpart")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Configuration file (TOML)
    #[arg(long, short, global = true)]
    config: Option<PathBuf>,

    /// Log level when RUST_LOG is not set
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run a simulated wearable and handheld on an in-memory mesh
    Demo {
        /// How long to run
        #[arg(long, default_value = "10")]
        seconds: u64,
    },

    /// Run a relay receiver
    Relay {
        /// Address to listen on
        #[arg(long, default_value = "127.0.0.1:7400")]
        listen: String,
    },

    /// Stream simulated readings to a relay
    Send {
        /// Relay address (defaults to relay.address from the configuration)
        #[arg(long)]
        relay: Option<String>,

        /// Number of readings to send
        #[arg(long, default_value = "10")]
        count: u32,
    },

    /// Print the effective configuration as JSON
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&cli.log_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    let config = config::resolve(cli.config.as_deref())?;

    match cli.command {
        Commands::Demo { seconds } => {
            demo::run(config, seconds).await?;
        }
        Commands::Relay { listen } => {
            relay::run(&listen).await?;
        }
        Commands::Send { relay, count } => {
            send::run(&config, relay.as_deref(), count).await?;
        }
        Commands::Config => {
            show_config::run(&config)?;
        }
    }

    Ok(())
}
