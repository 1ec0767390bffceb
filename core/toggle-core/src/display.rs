//! Presentation sink the controller writes to.
//! Calls are fire-and-forget; implementations must not block.

use crate::types::{Indicator, ToggleState};

pub trait Display: Send + Sync {
    fn set_state(&self, state: ToggleState);

    fn set_indicator(&self, indicator: &Indicator);
}

/// Discards everything. For headless probing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullDisplay;

impl Display for NullDisplay {
    fn set_state(&self, _state: ToggleState) {}

    fn set_indicator(&self, _indicator: &Indicator) {}
}
