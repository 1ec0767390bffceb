//! Resource profiles: everything that differs between toggleable resources.
//!
//! A controller is never specialised by type. Each resource kind is a value
//! carrying its process names, probe strategies, toggle command and timing,
//! and the controller is built from that value.
//!
//! Built-in profiles cover Zoom and Microsoft Teams microphone mute on macOS
//! (System Events menu and button introspection, keystroke toggles). Entries in
//! the user catalog replace a built-in with the same `id` or add new ones.

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;

use crate::availability::ProcessAvailability;
use crate::config::{load_catalog_config, CatalogConfig, ToggleConfig};
use crate::detector::{CommandProbe, DetectionStrategy, Detector, ProbeSpec};
use crate::error::{Result, ToggleError};
use crate::executor::CommandSpec;
use crate::types::Confidence;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceProfile {
    pub id: String,
    pub display_name: String,
    pub process_names: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_command: Option<CommandSpec>,
    pub toggle_command: CommandSpec,
    /// Probe strategies, most reliable first.
    #[serde(default)]
    pub probes: Vec<ProbeSpec>,
    #[serde(default)]
    pub tuning: ToggleConfig,
}

impl ResourceProfile {
    /// Compiles this profile's probes into a detector.
    pub fn build_detector(&self) -> Result<Detector> {
        let strategies = self
            .probes
            .iter()
            .map(|spec| {
                let probe = CommandProbe::from_spec(spec)?;
                Ok(Arc::new(probe) as Arc<dyn DetectionStrategy>)
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Detector::new(strategies))
    }

    pub fn availability(&self) -> ProcessAvailability {
        ProcessAvailability::new(self.process_names.clone())
            .with_session_command(self.session_command.clone())
    }
}

fn osascript(lines: &[&str]) -> CommandSpec {
    let mut args = Vec::with_capacity(lines.len() * 2);
    for line in lines {
        args.push("-e");
        args.push(*line);
    }
    CommandSpec::new("osascript", &args)
}

fn zoom_profile() -> ResourceProfile {
    ResourceProfile {
        id: "zoom".to_string(),
        display_name: "Zoom microphone".to_string(),
        process_names: vec!["zoom.us".to_string()],
        session_command: Some(osascript(&[
            r#"tell application "System Events" to tell process "zoom.us" to get menu bar item "Meeting" of menu bar 1"#,
        ])),
        toggle_command: osascript(&[
            r#"tell application "zoom.us" to activate"#,
            r#"tell application "System Events" to keystroke "a" using {shift down, command down}"#,
        ]),
        probes: vec![
            ProbeSpec {
                name: "zoom-meeting-menu".to_string(),
                command: osascript(&[
                    r#"tell application "System Events" to tell process "zoom.us" to get name of menu items of menu 1 of menu bar item "Meeting" of menu bar 1"#,
                ]),
                on_pattern: r"(?i)\bunmute audio\b".to_string(),
                off_pattern: r"(?i)\bmute audio\b".to_string(),
                confidence: Confidence::High,
            },
            ProbeSpec {
                name: "zoom-window-buttons".to_string(),
                command: osascript(&[
                    r#"tell application "System Events" to tell process "zoom.us" to get description of buttons of window "Zoom Meeting""#,
                ]),
                on_pattern: r"(?i)\bunmute\b".to_string(),
                off_pattern: r"(?i)\bmute\b".to_string(),
                confidence: Confidence::Medium,
            },
        ],
        tuning: ToggleConfig {
            verification_delay_ms: 500,
            poll_interval_ms: 2_000,
            ..ToggleConfig::default()
        },
    }
}

fn teams_profile() -> ResourceProfile {
    ResourceProfile {
        id: "teams".to_string(),
        display_name: "Microsoft Teams microphone".to_string(),
        process_names: vec![
            "Microsoft Teams".to_string(),
            "Microsoft Teams (work or school)".to_string(),
            "MSTeams".to_string(),
        ],
        session_command: None,
        toggle_command: osascript(&[
            r#"tell application "Microsoft Teams" to activate"#,
            r#"tell application "System Events" to keystroke "m" using {shift down, command down}"#,
        ]),
        probes: vec![
            ProbeSpec {
                name: "teams-call-buttons".to_string(),
                command: osascript(&[
                    r#"tell application "System Events" to tell (first process whose name contains "Teams") to get description of buttons of front window"#,
                ]),
                on_pattern: r"(?i)\bunmute\b".to_string(),
                off_pattern: r"(?i)\bmute\b".to_string(),
                confidence: Confidence::High,
            },
            ProbeSpec {
                name: "teams-window-title".to_string(),
                command: osascript(&[
                    r#"tell application "System Events" to tell (first process whose name contains "Teams") to get name of front window"#,
                ]),
                on_pattern: r"(?i)\bmuted\b".to_string(),
                off_pattern: r"(?i)\bunmuted\b".to_string(),
                confidence: Confidence::Low,
            },
        ],
        tuning: ToggleConfig {
            verification_delay_ms: 1_000,
            poll_interval_ms: 3_000,
            ..ToggleConfig::default()
        },
    }
}

static BUILTIN_PROFILES: Lazy<Vec<ResourceProfile>> = Lazy::new(|| vec![zoom_profile(), teams_profile()]);

/// Resolved set of profiles available to a host.
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceCatalog {
    profiles: Vec<ResourceProfile>,
}

impl ResourceCatalog {
    pub fn builtin() -> Self {
        Self {
            profiles: BUILTIN_PROFILES.clone(),
        }
    }

    /// Built-ins overlaid with the user catalog at `path` (or the default path).
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut catalog = Self::builtin();
        catalog.merge(load_catalog_config(path)?);
        Ok(catalog)
    }

    /// Replaces profiles with matching ids and appends the rest.
    pub fn merge(&mut self, config: CatalogConfig) {
        for profile in config.resources {
            match self.profiles.iter_mut().find(|p| p.id == profile.id) {
                Some(existing) => *existing = profile,
                None => self.profiles.push(profile),
            }
        }
    }

    pub fn get(&self, id: &str) -> Result<&ResourceProfile> {
        self.profiles
            .iter()
            .find(|p| p.id == id)
            .ok_or_else(|| ToggleError::UnknownResource(id.to_string()))
    }

    pub fn profiles(&self) -> &[ResourceProfile] {
        &self.profiles
    }
}
