//! Error types for toggle-core operations.
//!
//! Probe and command failures stay inside the detector and executor. Only
//! `ExecutionError` (after retries are exhausted) and configuration problems
//! ever reach a host.

use std::path::PathBuf;
use std::time::Duration;

// ═══════════════════════════════════════════════════════════════════════════════
// Probe Errors (absorbed by the Detector)
// ═══════════════════════════════════════════════════════════════════════════════

/// Failure of a single detection strategy.
///
/// Never surfaced past [`crate::detector::Detector`]; every variant collapses to
/// an `Unknown`/`Low` result there.
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum ProbeError {
    #[error("probe {probe} timed out after {timeout:?}")]
    Timeout { probe: String, timeout: Duration },

    #[error("probe {probe} could not start: {details}")]
    Spawn { probe: String, details: String },

    #[error("probe {probe} failed: {details}")]
    Failed { probe: String, details: String },
}

// ═══════════════════════════════════════════════════════════════════════════════
// Command Errors (retried by the Executor)
// ═══════════════════════════════════════════════════════════════════════════════

/// Failure of one attempt at running the state-changing command.
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum CommandError {
    #[error("failed to spawn {command}: {details}")]
    Spawn { command: String, details: String },

    #[error("{command} timed out after {timeout:?}")]
    Timeout { command: String, timeout: Duration },

    #[error("{command} exited with status {code:?}: {stderr}")]
    NonZeroExit {
        command: String,
        code: Option<i32>,
        stderr: String,
    },
}

/// Raised once every attempt allowed by the retry policy has failed.
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
#[error("command failed after {attempts} attempt(s): {last}")]
pub struct ExecutionError {
    pub attempts: u32,
    #[source]
    pub last: CommandError,
}

// ═══════════════════════════════════════════════════════════════════════════════
// Crate Errors
// ═══════════════════════════════════════════════════════════════════════════════

/// Errors returned by the public toggle-core API.
#[derive(Debug, thiserror::Error)]
pub enum ToggleError {
    // ─────────────────────────────────────────────────────────────────────
    // Configuration Errors
    // ─────────────────────────────────────────────────────────────────────
    #[error("Controller already started; configuration is fixed until teardown")]
    ConfigLocked,

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Configuration file malformed: {path}: {details}")]
    ConfigMalformed { path: PathBuf, details: String },

    #[error("Invalid probe pattern for {probe}: {source}")]
    InvalidPattern {
        probe: String,
        #[source]
        source: regex::Error,
    },

    // ─────────────────────────────────────────────────────────────────────
    // Resource Errors
    // ─────────────────────────────────────────────────────────────────────
    #[error("Unknown resource: {0}")]
    UnknownResource(String),

    #[error("Home directory not found")]
    HomeDirNotFound,

    // ─────────────────────────────────────────────────────────────────────
    // I/O Errors
    // ─────────────────────────────────────────────────────────────────────
    #[error("I/O error: {context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Execution(#[from] ExecutionError),
}

/// Convenience type alias for Results using ToggleError.
pub type Result<T> = std::result::Result<T, ToggleError>;

impl From<ToggleError> for String {
    fn from(err: ToggleError) -> String {
        err.to_string()
    }
}
