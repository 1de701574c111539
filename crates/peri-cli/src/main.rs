//! periscope CLI
//!
//! Single binary for all roles:
//! - Client (operator side: connect to a device and get a shell)
//! - Device (responder side: answer one incoming session)
//! - Daemon (provision the resource tree, supervise the management agent)
//! - Execute (trampoline the management agent's trigger script invokes)

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use peri_core::config::{self, ConfigFile};
use periscope::commands;
use periscope::output::print_error;

#[derive(Parser)]
#[command(name = "periscope")]
#[command(author, version)]
#[command(about = "Interactive terminal to unreachable devices over a peer data channel")]
#[command(propagate_version = true)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Connect to a device and open an interactive terminal
    Client {
        /// Endpoint name of the target device (overrides config)
        endpoint: Option<String>,
        /// Base URL of the device-directory API (overrides config)
        #[arg(long)]
        directory_host: Option<String>,
    },

    /// Answer one incoming session on this device (run by the trigger)
    Device,

    /// Provision the resource tree and supervise the management agent
    Daemon {
        /// Endpoint name this device registers under (overrides config)
        endpoint: Option<String>,
    },

    /// Detach a device-mode process and return (run by the management agent)
    Execute,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    let log_level = match (cli.quiet, cli.verbose) {
        (true, _) => "error",
        (false, 0) => "warn",
        (false, 1) => "info",
        (false, 2) => "debug",
        (false, _) => "trace",
    };

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| log_level.into()),
        ))
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    if let Err(err) = run(cli).await {
        print_error(&format!("{err:#}"));
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = load_config_file(cli.config.as_deref())?;

    match cli.command {
        Commands::Client {
            endpoint,
            directory_host,
        } => {
            commands::client::run(
                config.client,
                endpoint.as_deref(),
                directory_host.as_deref(),
            )
            .await
        }
        Commands::Device => commands::device::run(config.device).await,
        Commands::Daemon { endpoint } => {
            commands::daemon::run(config.device, endpoint.as_deref()).await
        }
        Commands::Execute => commands::daemon::execute(),
    }
}

fn load_config_file(path: Option<&Path>) -> Result<ConfigFile> {
    match path {
        Some(path) => config::load_config(path)
            .with_context(|| format!("failed to load config from {}", path.display())),
        None => {
            let default_path = config::default_config_path();
            if default_path.exists() {
                Ok(config::load_config(&default_path).unwrap_or_else(|err| {
                    tracing::warn!(
                        path = %default_path.display(),
                        error = %err,
                        "failed to load config, using defaults"
                    );
                    ConfigFile::default()
                }))
            } else {
                Ok(ConfigFile::default())
            }
        }
    }
}
