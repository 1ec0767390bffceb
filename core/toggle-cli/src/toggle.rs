//! `togglectl toggle`: one activation, waited through verification.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, Instant};
use toggle_core::{ActivationOutcome, ResourceCatalog, ToggleController};

use crate::terminal::TerminalDisplay;
use crate::CliError;

const SETTLE_POLL: Duration = Duration::from_millis(50);

pub async fn run(config: Option<&Path>, resource: &str) -> Result<(), CliError> {
    let catalog = ResourceCatalog::load(config)?;
    let profile = catalog.get(resource)?;
    let controller =
        ToggleController::from_profile(profile, Arc::new(TerminalDisplay::new(&profile.id)))?;

    controller.on_appear().await;
    let outcome = controller.on_activate().await;
    tracing::info!(resource, outcome = ?outcome, "Activation finished");

    let result = match outcome {
        ActivationOutcome::Pending { .. } => {
            // Verification runs one probe per strategy after the delay.
            let probes = u32::try_from(profile.probes.len()).unwrap_or(u32::MAX);
            let budget = profile.tuning.verification_delay()
                + profile.tuning.probe_timeout() * probes
                + Duration::from_secs(1);
            wait_for_settle(&controller, budget).await;
            println!("{}", serde_json::to_string_pretty(&controller.snapshot())?);
            Ok(())
        }
        ActivationOutcome::Failed(err) => Err(CliError::Toggle(err.into())),
        ActivationOutcome::Unavailable => Err(CliError::Unavailable(profile.id.clone())),
        ActivationOutcome::Ignored | ActivationOutcome::Abandoned => {
            Err(CliError::NotActivated(profile.id.clone()))
        }
    };

    controller.on_disappear();
    result
}

async fn wait_for_settle(controller: &ToggleController, budget: Duration) {
    let deadline = Instant::now() + budget;
    while controller.snapshot().cycle_in_flight {
        if Instant::now() >= deadline {
            tracing::warn!(
                resource = controller.resource(),
                "Verification did not finish in time"
            );
            return;
        }
        sleep(SETTLE_POLL).await;
    }
}
