//! Shared value types for detection, display and retry configuration.
//!
//! Everything here is plain data: cheap to clone, serializable for the CLI's JSON
//! output, and free of behaviour beyond small helpers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Binary operational state of the external resource, plus "don't know".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ToggleState {
    #[default]
    Unknown,
    Off,
    On,
}

impl ToggleState {
    /// Logical opposite. `Unknown` flips as if it were `Off`.
    pub fn toggled(self) -> Self {
        match self {
            ToggleState::On => ToggleState::Off,
            ToggleState::Off | ToggleState::Unknown => ToggleState::On,
        }
    }

    pub fn is_known(self) -> bool {
        self != ToggleState::Unknown
    }
}

impl fmt::Display for ToggleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ToggleState::Unknown => "unknown",
            ToggleState::Off => "off",
            ToggleState::On => "on",
        };
        f.write_str(label)
    }
}

/// Coarse reliability rating. Variant order gives `Low < Medium < High`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    Low,
    Medium,
    High,
}

/// Where a detection result came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "name")]
pub enum DetectionSource {
    /// Produced by the named strategy during this probe.
    Strategy(String),
    /// Replayed from the detector's last-result cache; not evidence.
    Cache,
    /// Nothing answered and nothing was cached.
    None,
}

/// One probe outcome. Produced fresh by every probe and never mutated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DetectionResult {
    pub state: ToggleState,
    pub confidence: Confidence,
    pub observed_at: DateTime<Utc>,
    pub source: DetectionSource,
}

impl DetectionResult {
    pub fn new(state: ToggleState, confidence: Confidence, source: DetectionSource) -> Self {
        Self {
            state,
            confidence,
            observed_at: Utc::now(),
            source,
        }
    }

    pub fn from_strategy(state: ToggleState, confidence: Confidence, name: &str) -> Self {
        Self::new(state, confidence, DetectionSource::Strategy(name.to_string()))
    }

    /// The `{Unknown, Low}` result every internal failure collapses to.
    pub fn unknown() -> Self {
        Self::new(ToggleState::Unknown, Confidence::Low, DetectionSource::None)
    }

    /// True when this result may replace the confirmed state: a known state that
    /// was actually observed, not replayed from cache.
    pub fn is_evidence(&self) -> bool {
        self.state.is_known() && self.source != DetectionSource::Cache
    }
}

/// Gatekeeper checked before any toggle or probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ResourceAvailability {
    pub process_present: bool,
    pub session_active: bool,
}

impl ResourceAvailability {
    /// Fail-open value used when a check errors or times out.
    pub fn absent() -> Self {
        Self::default()
    }

    pub fn present(session_active: bool) -> Self {
        Self {
            process_present: true,
            session_active,
        }
    }
}

/// In-flight record of one user-initiated toggle attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ToggleSession {
    pub requested_at: DateTime<Utc>,
    pub optimistic_state: ToggleState,
    pub verification_deadline: Option<DateTime<Utc>>,
    pub attempts_used: u32,
}

/// Immutable retry configuration consumed by the executor.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub backoff_multiplier: f64,
}

impl RetryPolicy {
    /// Delay before attempt `attempt` (1-based): `base × (attempt − 1) × multiplier`.
    /// Linear in the attempt number; the first attempt never waits.
    pub fn delay_before(&self, attempt: u32) -> Duration {
        if attempt <= 1 {
            return Duration::ZERO;
        }
        let steps = f64::from(attempt - 1) * self.backoff_multiplier.max(0.0);
        let nanos = self.base_delay.as_nanos() as f64 * steps;
        Duration::from_nanos(nanos.round() as u64)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(200),
            backoff_multiplier: 1.0,
        }
    }
}

/// Non-state presentation hint shown next to the toggle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "message")]
pub enum Indicator {
    /// Resource is not running; the toggle is inert.
    Unavailable,
    /// Execution failed after retries.
    Error(String),
    /// Optimistic state is displayed but no probe backed it up.
    Unconfirmed,
    /// No indicator.
    Clear,
}

impl Indicator {
    pub fn text(&self) -> &str {
        match self {
            Indicator::Unavailable => "unavailable",
            Indicator::Error(message) => message,
            Indicator::Unconfirmed => "unconfirmed",
            Indicator::Clear => "",
        }
    }
}

impl fmt::Display for Indicator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.text())
    }
}
