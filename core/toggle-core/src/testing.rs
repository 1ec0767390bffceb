//! Scriptable fakes for unit tests: probes, command runners, availability and
//! a display that records everything it is told.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tokio::time::Instant;

use crate::availability::AvailabilityCheck;
use crate::detector::DetectionStrategy;
use crate::display::Display;
use crate::error::{CommandError, ProbeError};
use crate::executor::{CommandOutput, CommandRunner, CommandSpec};
use crate::types::{Confidence, DetectionResult, Indicator, ResourceAvailability, ToggleState};

// ─────────────────────────────────────────────────────────────────────────────
// Probes
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy)]
pub enum ProbeReply {
    Answer(ToggleState, Confidence),
    Fail,
    Hang,
}

/// Probe that replays queued replies, then repeats its fallback forever.
pub struct ScriptedProbe {
    name: String,
    queue: Mutex<VecDeque<ProbeReply>>,
    fallback: Mutex<ProbeReply>,
    delay: Option<Duration>,
    calls: AtomicUsize,
}

impl ScriptedProbe {
    fn with_fallback(name: &str, fallback: ProbeReply) -> Self {
        Self {
            name: name.to_string(),
            queue: Mutex::new(VecDeque::new()),
            fallback: Mutex::new(fallback),
            delay: None,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn fixed(name: &str, state: ToggleState, confidence: Confidence) -> Self {
        Self::with_fallback(name, ProbeReply::Answer(state, confidence))
    }

    pub fn failing(name: &str) -> Self {
        Self::with_fallback(name, ProbeReply::Fail)
    }

    pub fn hanging(name: &str) -> Self {
        Self::with_fallback(name, ProbeReply::Hang)
    }

    /// Replies in order; the last reply repeats.
    pub fn sequence(name: &str, replies: Vec<(ToggleState, Confidence)>) -> Self {
        let mut replies: VecDeque<ProbeReply> = replies
            .into_iter()
            .map(|(state, confidence)| ProbeReply::Answer(state, confidence))
            .collect();
        let fallback = replies.pop_back().unwrap_or(ProbeReply::Fail);
        let probe = Self::with_fallback(name, fallback);
        *probe.queue.lock().unwrap() = replies;
        probe
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Replaces the script with a single repeating answer.
    pub fn set(&self, state: ToggleState, confidence: Confidence) {
        self.queue.lock().unwrap().clear();
        *self.fallback.lock().unwrap() = ProbeReply::Answer(state, confidence);
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn next_reply(&self) -> ProbeReply {
        let queued = self.queue.lock().unwrap().pop_front();
        queued.unwrap_or_else(|| *self.fallback.lock().unwrap())
    }
}

#[async_trait]
impl DetectionStrategy for ScriptedProbe {
    fn name(&self) -> &str {
        &self.name
    }

    async fn detect(&self) -> Result<DetectionResult, ProbeError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        match self.next_reply() {
            ProbeReply::Answer(state, confidence) => {
                Ok(DetectionResult::from_strategy(state, confidence, &self.name))
            }
            ProbeReply::Fail => Err(ProbeError::Failed {
                probe: self.name.clone(),
                details: "scripted failure".to_string(),
            }),
            ProbeReply::Hang => {
                std::future::pending::<()>().await;
                Err(ProbeError::Failed {
                    probe: self.name.clone(),
                    details: "unreachable".to_string(),
                })
            }
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Command runners
// ─────────────────────────────────────────────────────────────────────────────

/// Fails a fixed number of times, then succeeds. Records call instants.
pub struct ScriptedRunner {
    failures_left: Mutex<u32>,
    calls: Mutex<Vec<Instant>>,
    delay: Option<Duration>,
}

impl ScriptedRunner {
    pub fn failing_times(failures: u32) -> Self {
        Self {
            failures_left: Mutex::new(failures),
            calls: Mutex::new(Vec::new()),
            delay: None,
        }
    }

    pub fn succeeding() -> Self {
        Self::failing_times(0)
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn call_times(&self) -> Vec<Instant> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl CommandRunner for ScriptedRunner {
    async fn run(&self, command: &CommandSpec) -> Result<CommandOutput, CommandError> {
        self.calls.lock().unwrap().push(Instant::now());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let mut failures_left = self.failures_left.lock().unwrap();
        if *failures_left > 0 {
            *failures_left -= 1;
            return Err(CommandError::NonZeroExit {
                command: command.label(),
                code: Some(1),
                stderr: "scripted failure".to_string(),
            });
        }
        Ok(CommandOutput::default())
    }
}

/// Always returns the same output (or failure).
pub struct EchoRunner {
    result: Result<CommandOutput, CommandError>,
}

impl EchoRunner {
    pub fn ok(stdout: &str) -> Self {
        Self {
            result: Ok(CommandOutput {
                stdout: stdout.to_string(),
                stderr: String::new(),
            }),
        }
    }

    pub fn failing() -> Self {
        Self {
            result: Err(CommandError::NonZeroExit {
                command: "echo".to_string(),
                code: Some(1),
                stderr: "execution error".to_string(),
            }),
        }
    }
}

#[async_trait]
impl CommandRunner for EchoRunner {
    async fn run(&self, _command: &CommandSpec) -> Result<CommandOutput, CommandError> {
        self.result.clone()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Availability
// ─────────────────────────────────────────────────────────────────────────────

pub struct FakeAvailability {
    value: Mutex<ResourceAvailability>,
    calls: AtomicUsize,
}

impl FakeAvailability {
    pub fn present() -> Self {
        Self {
            value: Mutex::new(ResourceAvailability::present(true)),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn absent() -> Self {
        Self {
            value: Mutex::new(ResourceAvailability::absent()),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn set(&self, availability: ResourceAvailability) {
        *self.value.lock().unwrap() = availability;
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AvailabilityCheck for FakeAvailability {
    async fn check(&self) -> ResourceAvailability {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.value.lock().unwrap()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Display
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Default)]
pub struct RecordingDisplay {
    states: Mutex<Vec<ToggleState>>,
    indicators: Mutex<Vec<Indicator>>,
}

impl RecordingDisplay {
    pub fn states(&self) -> Vec<ToggleState> {
        self.states.lock().unwrap().clone()
    }

    pub fn indicators(&self) -> Vec<Indicator> {
        self.indicators.lock().unwrap().clone()
    }

    pub fn current_state(&self) -> Option<ToggleState> {
        self.states.lock().unwrap().last().copied()
    }

    pub fn current_indicator(&self) -> Option<Indicator> {
        self.indicators.lock().unwrap().last().cloned()
    }
}

impl Display for RecordingDisplay {
    fn set_state(&self, state: ToggleState) {
        self.states.lock().unwrap().push(state);
    }

    fn set_indicator(&self, indicator: &Indicator) {
        self.indicators.lock().unwrap().push(indicator.clone());
    }
}
