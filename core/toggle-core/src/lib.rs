//! # toggle-core
//!
//! Optimistic toggle control for an external resource whose state can only be
//! observed indirectly (e.g. a meeting app's microphone mute).
//!
//! ## Design Principles
//!
//! - **Optimistic**: The display flips the moment the user asks; probes confirm or correct it later.
//! - **Evidence-driven**: Only a fresh, known detection replaces the confirmed state. Silence keeps what is shown.
//! - **Never hangs**: Every probe, command and availability check runs under a timeout.
//! - **One cycle at a time**: Reconciliation cycles per controller are mutually exclusive; overlaps are dropped.
//! - **Configured, not specialised**: Resource kinds differ only in their [`ResourceProfile`].
//!
//! Requires a tokio runtime.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use toggle_core::{NullDisplay, ResourceCatalog, ToggleController};
//!
//! let catalog = ResourceCatalog::load(None)?;
//! let controller = ToggleController::from_profile(catalog.get("zoom")?, Arc::new(NullDisplay))?;
//! controller.on_appear().await;
//! controller.on_activate().await;
//! ```

pub mod availability;
pub mod config;
pub mod controller;
pub mod detector;
pub mod display;
pub mod error;
pub mod executor;
pub mod guard;
pub mod resource;
pub mod scheduler;
pub mod types;

#[cfg(test)]
mod testing;

pub use availability::{AvailabilityCheck, ProcessAvailability, StaticAvailability};
pub use config::*;
pub use controller::{
    ActivationOutcome, ControllerPhase, ControllerSnapshot, ToggleController,
    ToggleControllerBuilder,
};
pub use detector::{CommandProbe, DetectionStrategy, Detector, ProbeSpec, StaticProbe};
pub use display::{Display, NullDisplay};
pub use error::{CommandError, ExecutionError, ProbeError, Result, ToggleError};
pub use executor::{CommandOutput, CommandRunner, CommandSpec, ExecutionReport, Executor};
pub use guard::{ExclusionGuard, GuardPermit};
pub use resource::{ResourceCatalog, ResourceProfile};
pub use scheduler::{CancelToken, Scheduler};
pub use types::*;
