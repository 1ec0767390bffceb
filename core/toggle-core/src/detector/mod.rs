//! State detection: ordered probe strategies fused into one estimate.
//!
//! # Aggregation
//!
//! Strategies run most-reliable first:
//!
//! 1. The first `High` result wins immediately; later strategies are skipped.
//! 2. Otherwise the highest-confidence non-`Unknown` result wins. Equal
//!    confidence goes to the earlier strategy.
//! 3. If everything is `Unknown`, the last known state is replayed from cache
//!    with `Low` confidence and [`DetectionSource::Cache`], so callers can tell
//!    it apart from fresh evidence. An empty cache yields `{Unknown, Low}`.
//!
//! Timeouts and errors never escape: each strategy call is bounded and any
//! failure counts as `{Unknown, Low}`.

mod command;

pub use command::{CommandProbe, ProbeSpec};

use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::debug;

use crate::error::ProbeError;
use crate::types::{Confidence, DetectionResult, DetectionSource, ToggleState};

/// One independent way of learning the resource's state.
#[async_trait]
pub trait DetectionStrategy: Send + Sync {
    /// Stable name used in logs and [`DetectionSource::Strategy`].
    fn name(&self) -> &str;

    async fn detect(&self) -> Result<DetectionResult, ProbeError>;
}

/// Strategy that always answers the same thing. Useful for hosts without a
/// real probe and for wiring tests.
#[derive(Debug, Clone)]
pub struct StaticProbe {
    name: String,
    state: ToggleState,
    confidence: Confidence,
}

impl StaticProbe {
    pub fn new(name: impl Into<String>, state: ToggleState, confidence: Confidence) -> Self {
        Self {
            name: name.into(),
            state,
            confidence,
        }
    }
}

#[async_trait]
impl DetectionStrategy for StaticProbe {
    fn name(&self) -> &str {
        &self.name
    }

    async fn detect(&self) -> Result<DetectionResult, ProbeError> {
        Ok(DetectionResult::from_strategy(
            self.state,
            self.confidence,
            &self.name,
        ))
    }
}

/// Runs strategies in priority order and aggregates their answers.
///
/// Safe to share between controllers; the only mutable state is the fallback
/// cache.
pub struct Detector {
    strategies: Vec<Arc<dyn DetectionStrategy>>,
    last_known: Mutex<Option<DetectionResult>>,
}

impl Detector {
    pub fn new(strategies: Vec<Arc<dyn DetectionStrategy>>) -> Self {
        Self {
            strategies,
            last_known: Mutex::new(None),
        }
    }

    pub fn strategy_names(&self) -> Vec<&str> {
        self.strategies.iter().map(|s| s.name()).collect()
    }

    /// Most recent non-`Unknown` strategy result, if any.
    pub fn last_known(&self) -> Option<DetectionResult> {
        self.last_known
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Produces a fresh estimate. Never fails and never blocks longer than
    /// `timeout` per strategy.
    pub async fn probe(&self, timeout: Duration) -> DetectionResult {
        let mut best: Option<DetectionResult> = None;

        for strategy in &self.strategies {
            let result = self.run_strategy(strategy.as_ref(), timeout).await;
            if !result.state.is_known() {
                continue;
            }
            if result.confidence == Confidence::High {
                self.remember(&result);
                return result;
            }
            let better = best
                .as_ref()
                .map(|current| result.confidence > current.confidence)
                .unwrap_or(true);
            if better {
                best = Some(result);
            }
        }

        match best {
            Some(result) => {
                self.remember(&result);
                result
            }
            None => self.fallback(),
        }
    }

    async fn run_strategy(
        &self,
        strategy: &dyn DetectionStrategy,
        timeout: Duration,
    ) -> DetectionResult {
        let outcome = match tokio::time::timeout(timeout, strategy.detect()).await {
            Ok(outcome) => outcome,
            Err(_) => Err(ProbeError::Timeout {
                probe: strategy.name().to_string(),
                timeout,
            }),
        };

        match outcome {
            Ok(result) => {
                debug!(
                    probe = strategy.name(),
                    state = %result.state,
                    confidence = ?result.confidence,
                    "Probe answered"
                );
                result
            }
            Err(err) => {
                debug!(probe = strategy.name(), error = %err, "Probe failed; treating as unknown");
                DetectionResult::from_strategy(
                    ToggleState::Unknown,
                    Confidence::Low,
                    strategy.name(),
                )
            }
        }
    }

    fn remember(&self, result: &DetectionResult) {
        let mut cache = self
            .last_known
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *cache = Some(result.clone());
    }

    fn fallback(&self) -> DetectionResult {
        match self.last_known() {
            Some(previous) => {
                debug!(state = %previous.state, "All probes unknown; replaying cached state");
                DetectionResult::new(previous.state, Confidence::Low, DetectionSource::Cache)
            }
            None => DetectionResult::unknown(),
        }
    }
}

impl std::fmt::Debug for Detector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Detector")
            .field("strategies", &self.strategy_names())
            .finish()
    }
}
