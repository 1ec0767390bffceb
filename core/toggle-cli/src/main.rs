//! togglectl: terminal host for toggle-hud controllers.
//!
//! Drives the same `ToggleController` a HUD would, with stdout standing in for
//! the widget.
//!
//! ## Subcommands
//!
//! - `list`: Resource profiles (built-ins plus `~/.togglehud/config.toml`)
//! - `status`: Availability of a resource, as JSON
//! - `probe`: One detector pass, as JSON
//! - `toggle`: One activation, waited through verification
//! - `watch`: Long-lived controller driven from stdin

mod inspect;
mod logging;
mod terminal;
mod toggle;
mod watch;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use toggle_core::ToggleError;

#[derive(Parser)]
#[command(name = "togglectl")]
#[command(about = "Optimistic toggle host for meeting-app microphones")]
#[command(version)]
struct Cli {
    /// Catalog file (defaults to ~/.togglehud/config.toml)
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List resource profiles
    List {
        /// Print full profiles as JSON
        #[arg(long)]
        json: bool,
    },

    /// Check whether a resource is running
    Status {
        #[arg(short, long)]
        resource: String,
    },

    /// Run the resource's detector once
    Probe {
        #[arg(short, long)]
        resource: String,
    },

    /// Toggle a resource and wait for verification
    Toggle {
        #[arg(short, long)]
        resource: String,
    },

    /// Keep a controller alive; toggle from stdin
    Watch {
        #[arg(short, long)]
        resource: String,
    },
}

#[derive(Debug, thiserror::Error)]
pub enum CliError {
    #[error(transparent)]
    Toggle(#[from] ToggleError),

    #[error("{0} is not running")]
    Unavailable(String),

    #[error("{0} did not accept the toggle")]
    NotActivated(String),

    #[error("Failed to encode output: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Failed to read input: {0}")]
    Input(#[from] std::io::Error),
}

async fn run(cli: Cli) -> Result<(), CliError> {
    let config = cli.config.as_deref();
    match cli.command {
        Commands::List { json } => inspect::list(config, json),
        Commands::Status { resource } => inspect::status(config, &resource).await,
        Commands::Probe { resource } => inspect::probe(config, &resource).await,
        Commands::Toggle { resource } => toggle::run(config, &resource).await,
        Commands::Watch { resource } => watch::run(config, &resource).await,
    }
}

fn main() -> ExitCode {
    let _logging_guard = logging::init();
    let cli = Cli::parse();

    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            tracing::error!(error = %e, "Failed to start runtime");
            eprintln!("togglectl: failed to start runtime: {e}");
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(run(cli)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "togglectl failed");
            eprintln!("togglectl: {e}");
            ExitCode::FAILURE
        }
    }
}
