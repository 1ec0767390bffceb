//! End-to-end tests against a "resource" whose state lives in a file and is
//! flipped and probed by real shell commands.

#![cfg(unix)]

use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use toggle_core::{
    ActivationOutcome, CommandSpec, Confidence, ControllerPhase, Display, Executor, Indicator,
    ProbeSpec, ResourceAvailability, ResourceProfile, StaticAvailability, ToggleConfig,
    ToggleController, ToggleState,
};

#[derive(Default)]
struct Screen {
    states: Mutex<Vec<ToggleState>>,
    indicators: Mutex<Vec<Indicator>>,
}

impl Display for Screen {
    fn set_state(&self, state: ToggleState) {
        self.states.lock().unwrap().push(state);
    }

    fn set_indicator(&self, indicator: &Indicator) {
        self.indicators.lock().unwrap().push(indicator.clone());
    }
}

fn sh(script: &str) -> CommandSpec {
    CommandSpec::new("sh", &["-c", script])
}

fn file_profile(state_file: &Path, toggle_script: &str) -> ResourceProfile {
    let file = state_file.display();
    ResourceProfile {
        id: "file".to_string(),
        display_name: "File switch".to_string(),
        process_names: vec![],
        session_command: None,
        toggle_command: sh(toggle_script),
        probes: vec![ProbeSpec {
            name: "file-contents".to_string(),
            command: sh(&format!("cat {file}")),
            on_pattern: "^on".to_string(),
            off_pattern: "^off".to_string(),
            confidence: Confidence::High,
        }],
        tuning: ToggleConfig {
            verification_delay_ms: 50,
            poll_interval_ms: 60_000,
            base_delay_ms: 10,
            ..ToggleConfig::default()
        },
    }
}

fn controller(profile: &ResourceProfile, screen: Arc<Screen>) -> ToggleController {
    ToggleController::builder(
        profile.id.clone(),
        profile.toggle_command.clone(),
        Arc::new(profile.build_detector().unwrap()),
        Arc::new(StaticAvailability(ResourceAvailability::present(true))),
        screen,
    )
    .config(profile.tuning.clone())
    .executor(Arc::new(Executor::process()))
    .build()
    .unwrap()
}

#[tokio::test]
async fn test_toggle_round_trip_through_shell() {
    let dir = TempDir::new().unwrap();
    let state_file = dir.path().join("state");
    std::fs::write(&state_file, "off\n").unwrap();
    let file = state_file.display();
    let profile = file_profile(
        &state_file,
        &format!(r#"if grep -q '^on' {file}; then echo off > {file}; else echo on > {file}; fi"#),
    );
    let screen = Arc::new(Screen::default());
    let controller = controller(&profile, screen.clone());

    controller.on_appear().await;
    assert_eq!(
        controller.snapshot().phase,
        ControllerPhase::Confirmed(ToggleState::Off)
    );

    let outcome = controller.on_activate().await;
    assert_eq!(
        outcome,
        ActivationOutcome::Pending {
            target: ToggleState::On,
            attempts: 1
        }
    );
    assert_eq!(std::fs::read_to_string(&state_file).unwrap().trim(), "on");

    tokio::time::sleep(Duration::from_millis(500)).await;
    let snapshot = controller.snapshot();
    assert_eq!(snapshot.phase, ControllerPhase::Confirmed(ToggleState::On));
    assert!(!snapshot.cycle_in_flight);

    controller.on_disappear();
}

#[tokio::test]
async fn test_failing_command_reverts_display() {
    let dir = TempDir::new().unwrap();
    let state_file = dir.path().join("state");
    std::fs::write(&state_file, "on\n").unwrap();
    let profile = file_profile(&state_file, "exit 3");
    let screen = Arc::new(Screen::default());
    let controller = controller(&profile, screen.clone());

    controller.on_appear().await;
    let outcome = controller.on_activate().await;

    match outcome {
        ActivationOutcome::Failed(err) => assert_eq!(err.attempts, 3),
        other => panic!("expected failure, got {other:?}"),
    }
    assert_eq!(
        *screen.states.lock().unwrap(),
        vec![ToggleState::On, ToggleState::Off, ToggleState::On]
    );
    assert!(matches!(
        screen.indicators.lock().unwrap().last(),
        Some(Indicator::Error(_))
    ));

    controller.on_disappear();
}
