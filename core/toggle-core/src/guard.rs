//! Mutual exclusion for reconciliation cycles.
//!
//! A cycle that cannot enter is dropped, never queued: the next periodic tick
//! retries naturally. Holding is tracked per epoch so that teardown can
//! invalidate a permit still owned by a timer task that has not fired yet.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

#[derive(Debug, Default)]
struct GuardState {
    held: AtomicBool,
    epoch: AtomicU64,
}

/// Non-blocking, non-queueing mutual-exclusion flag.
///
/// Cloning yields another handle to the same guard.
#[derive(Debug, Clone, Default)]
pub struct ExclusionGuard {
    inner: Arc<GuardState>,
}

impl ExclusionGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attempts to take the guard. Returns false if a cycle already holds it.
    pub fn try_enter(&self) -> bool {
        self.inner
            .held
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Releases the guard. Releasing an unheld guard is a no-op.
    pub fn exit(&self) {
        self.inner.held.store(false, Ordering::Release);
    }

    pub fn is_held(&self) -> bool {
        self.inner.held.load(Ordering::Acquire)
    }

    /// Takes the guard and returns a permit that exits on drop.
    pub fn try_acquire(&self) -> Option<GuardPermit> {
        if !self.try_enter() {
            return None;
        }
        Some(GuardPermit {
            guard: self.clone(),
            epoch: self.inner.epoch.load(Ordering::Acquire),
        })
    }

    /// Releases the guard regardless of holder and invalidates outstanding permits.
    pub fn force_release(&self) {
        self.inner.epoch.fetch_add(1, Ordering::AcqRel);
        self.exit();
    }
}

/// Proof of holding an [`ExclusionGuard`]. Dropping it releases the guard unless
/// the guard was force-released since the permit was issued.
#[derive(Debug)]
#[must_use = "dropping the permit releases the guard immediately"]
pub struct GuardPermit {
    guard: ExclusionGuard,
    epoch: u64,
}

impl GuardPermit {
    /// False once the guard has been force-released out from under this permit.
    pub fn is_current(&self) -> bool {
        self.guard.inner.epoch.load(Ordering::Acquire) == self.epoch
    }
}

impl Drop for GuardPermit {
    fn drop(&mut self) {
        if self.is_current() {
            self.guard.exit();
        }
    }
}
