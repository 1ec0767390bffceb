//! Read-only subcommands: `list`, `status`, `probe`.

use serde::Serialize;
use std::path::Path;
use toggle_core::availability::check_with_timeout;
use toggle_core::{DetectionResult, ResourceAvailability, ResourceCatalog};

use crate::CliError;

#[derive(Serialize)]
struct StatusReport<'a> {
    resource: &'a str,
    availability: ResourceAvailability,
}

#[derive(Serialize)]
struct ProbeReport<'a> {
    resource: &'a str,
    strategies: Vec<&'a str>,
    result: DetectionResult,
}

pub fn list(config: Option<&Path>, json: bool) -> Result<(), CliError> {
    let catalog = ResourceCatalog::load(config)?;

    if json {
        println!("{}", serde_json::to_string_pretty(catalog.profiles())?);
        return Ok(());
    }

    for profile in catalog.profiles() {
        let probes: Vec<&str> = profile.probes.iter().map(|p| p.name.as_str()).collect();
        println!(
            "{:<8} {:<30} verify {}ms, poll {}ms, probes: {}",
            profile.id,
            profile.display_name,
            profile.tuning.verification_delay_ms,
            profile.tuning.poll_interval_ms,
            probes.join(", ")
        );
    }
    Ok(())
}

pub async fn status(config: Option<&Path>, resource: &str) -> Result<(), CliError> {
    let catalog = ResourceCatalog::load(config)?;
    let profile = catalog.get(resource)?;

    let availability = check_with_timeout(
        &profile.availability(),
        profile.tuning.availability_timeout(),
    )
    .await;

    let report = StatusReport {
        resource: &profile.id,
        availability,
    };
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

pub async fn probe(config: Option<&Path>, resource: &str) -> Result<(), CliError> {
    let catalog = ResourceCatalog::load(config)?;
    let profile = catalog.get(resource)?;
    let detector = profile.build_detector()?;

    let result = detector.probe(profile.tuning.probe_timeout()).await;
    tracing::debug!(resource, state = %result.state, "Probe finished");

    let report = ProbeReport {
        resource: &profile.id,
        strategies: detector.strategy_names(),
        result,
    };
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
