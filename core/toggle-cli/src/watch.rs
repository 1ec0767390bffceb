//! `togglectl watch`: a long-lived host driven from stdin.
//!
//! Appears on start. Each input line is a command:
//!
//! - `t` / `toggle`: activate
//! - `s` / `status`: print a snapshot as JSON
//! - `q` / `quit`: disappear and exit (also on EOF or Ctrl-C)

use std::path::Path;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use toggle_core::{ActivationOutcome, ResourceCatalog, ToggleController};

use crate::terminal::TerminalDisplay;
use crate::CliError;

enum Input {
    Toggle,
    Status,
    Quit,
    Blank,
    Unknown(String),
}

fn parse_input(line: &str) -> Input {
    match line.trim() {
        "t" | "toggle" => Input::Toggle,
        "s" | "status" => Input::Status,
        "q" | "quit" | "exit" => Input::Quit,
        "" => Input::Blank,
        other => Input::Unknown(other.to_string()),
    }
}

pub async fn run(config: Option<&Path>, resource: &str) -> Result<(), CliError> {
    let catalog = ResourceCatalog::load(config)?;
    let profile = catalog.get(resource)?;
    let controller =
        ToggleController::from_profile(profile, Arc::new(TerminalDisplay::new(&profile.id)))?;

    controller.on_appear().await;
    println!("watching {} (t = toggle, s = status, q = quit)", profile.display_name);

    let result = drive(&controller).await;
    controller.on_disappear();
    result
}

async fn drive(controller: &ToggleController) -> Result<(), CliError> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        let line = tokio::select! {
            line = lines.next_line() => line?,
            _ = tokio::signal::ctrl_c() => {
                tracing::info!(resource = controller.resource(), "Interrupted");
                return Ok(());
            }
        };
        let Some(line) = line else {
            return Ok(());
        };

        match parse_input(&line) {
            Input::Toggle => spawn_activation(controller.clone()),
            Input::Status => {
                println!("{}", serde_json::to_string_pretty(&controller.snapshot())?);
            }
            Input::Quit => return Ok(()),
            Input::Blank => {}
            Input::Unknown(other) => eprintln!("unknown command: {other}"),
        }
    }
}

/// Runs the activation in the background so stdin and Ctrl-C stay responsive
/// while the command retries.
fn spawn_activation(controller: ToggleController) {
    tokio::spawn(async move {
        match controller.on_activate().await {
            ActivationOutcome::Failed(err) => eprintln!("toggle failed: {err}"),
            ActivationOutcome::Unavailable => {
                eprintln!("{} is not running", controller.resource())
            }
            ActivationOutcome::Ignored => eprintln!("toggle already in progress"),
            outcome => {
                tracing::debug!(resource = controller.resource(), outcome = ?outcome, "Activation finished")
            }
        }
    });
}
