//! Probe strategy backed by an external command.
//!
//! Runs a script (typically an accessibility query) and classifies its stdout
//! with two regexes. A match on `on_pattern` means `On`, a match on
//! `off_pattern` means `Off`; if both match the output is ambiguous and the
//! probe reports `Unknown`.

use async_trait::async_trait;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::DetectionStrategy;
use crate::error::{CommandError, ProbeError, ToggleError};
use crate::executor::{CommandRunner, CommandSpec, ProcessCommandRunner};
use crate::types::{Confidence, DetectionResult, ToggleState};

/// Serializable description of a [`CommandProbe`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProbeSpec {
    pub name: String,
    pub command: CommandSpec,
    pub on_pattern: String,
    pub off_pattern: String,
    pub confidence: Confidence,
}

pub struct CommandProbe {
    name: String,
    command: CommandSpec,
    on: Regex,
    off: Regex,
    confidence: Confidence,
    runner: Arc<dyn CommandRunner>,
}

impl CommandProbe {
    /// Compiles a probe that runs its command as a child process.
    pub fn from_spec(spec: &ProbeSpec) -> Result<Self, ToggleError> {
        Self::with_runner(spec, Arc::new(ProcessCommandRunner))
    }

    pub fn with_runner(spec: &ProbeSpec, runner: Arc<dyn CommandRunner>) -> Result<Self, ToggleError> {
        let compile = |pattern: &str| {
            Regex::new(pattern).map_err(|source| ToggleError::InvalidPattern {
                probe: spec.name.clone(),
                source,
            })
        };
        Ok(Self {
            name: spec.name.clone(),
            command: spec.command.clone(),
            on: compile(&spec.on_pattern)?,
            off: compile(&spec.off_pattern)?,
            confidence: spec.confidence,
            runner,
        })
    }

    fn classify(&self, stdout: &str) -> ToggleState {
        match (self.on.is_match(stdout), self.off.is_match(stdout)) {
            (true, false) => ToggleState::On,
            (false, true) => ToggleState::Off,
            _ => ToggleState::Unknown,
        }
    }
}

#[async_trait]
impl DetectionStrategy for CommandProbe {
    fn name(&self) -> &str {
        &self.name
    }

    async fn detect(&self) -> Result<DetectionResult, ProbeError> {
        let output = self.runner.run(&self.command).await.map_err(|err| match err {
            CommandError::Timeout { timeout, .. } => ProbeError::Timeout {
                probe: self.name.clone(),
                timeout,
            },
            CommandError::Spawn { details, .. } => ProbeError::Spawn {
                probe: self.name.clone(),
                details,
            },
            other => ProbeError::Failed {
                probe: self.name.clone(),
                details: other.to_string(),
            },
        })?;

        let state = self.classify(&output.stdout);
        let confidence = if state.is_known() {
            self.confidence
        } else {
            Confidence::Low
        };
        Ok(DetectionResult::from_strategy(state, confidence, &self.name))
    }
}

impl std::fmt::Debug for CommandProbe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandProbe")
            .field("name", &self.name)
            .field("command", &self.command.label())
            .field("confidence", &self.confidence)
            .finish()
    }
}
