//! Cancellable one-shot and periodic timers on the tokio runtime.
//!
//! Each timer is a spawned task registered under a [`CancelToken`]. A one-shot
//! timer deregisters itself when it fires, so cancelling it afterwards is a
//! no-op and does not interrupt the callback that is already running. A
//! periodic timer stays registered until cancelled; cancelling it aborts the
//! task at its next suspension point.
//!
//! Must be used from within a tokio runtime.

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};

/// Handle identifying one scheduled timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CancelToken(u64);

#[derive(Debug, Default)]
struct SchedulerInner {
    next_id: AtomicU64,
    timers: Mutex<HashMap<u64, JoinHandle<()>>>,
}

impl SchedulerInner {
    fn timers(&self) -> MutexGuard<'_, HashMap<u64, JoinHandle<()>>> {
        // A poisoned map only means a panicking callback; the handles are still valid.
        self.timers.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn is_armed(&self, id: u64) -> bool {
        self.timers().contains_key(&id)
    }

    fn disarm(&self, id: u64) -> bool {
        self.timers().remove(&id).is_some()
    }
}

impl Drop for SchedulerInner {
    fn drop(&mut self) {
        for (_, handle) in self.timers().drain() {
            handle.abort();
        }
    }
}

/// Timer registry. Clones share the same registry.
#[derive(Debug, Clone, Default)]
pub struct Scheduler {
    inner: Arc<SchedulerInner>,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs `f` once after `delay`.
    pub fn schedule_once<F, Fut>(&self, delay: Duration, f: F) -> CancelToken
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let registry = Arc::downgrade(&self.inner);

        // The registry lock is held across spawn so the task cannot observe the
        // map before its own handle is inserted.
        let mut timers = self.inner.timers();
        let handle = tokio::spawn(async move {
            time::sleep(delay).await;
            if !take_if_armed(&registry, id) {
                return;
            }
            f().await;
        });
        timers.insert(id, handle);
        CancelToken(id)
    }

    /// Runs `f` every `interval`, first after one full interval.
    ///
    /// Ticks never overlap: the next tick is measured from when the previous
    /// callback finished if it overran.
    pub fn schedule_periodic<F, Fut>(&self, interval: Duration, mut f: F) -> CancelToken
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let registry = Arc::downgrade(&self.inner);
        let period = interval.max(Duration::from_millis(1));

        let mut timers = self.inner.timers();
        let handle = tokio::spawn(async move {
            let mut ticker = time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let armed = registry
                    .upgrade()
                    .map(|inner| inner.is_armed(id))
                    .unwrap_or(false);
                if !armed {
                    return;
                }
                f().await;
            }
        });
        timers.insert(id, handle);
        CancelToken(id)
    }

    /// Cancels a timer. Unknown, fired or already-cancelled tokens are ignored.
    ///
    /// Returns true if a pending timer was actually cancelled.
    pub fn cancel(&self, token: CancelToken) -> bool {
        let handle = self.inner.timers().remove(&token.0);
        match handle {
            Some(handle) => {
                handle.abort();
                true
            }
            None => false,
        }
    }

    /// Cancels every registered timer.
    pub fn cancel_all(&self) {
        let handles: Vec<_> = self.inner.timers().drain().map(|(_, h)| h).collect();
        for handle in handles {
            handle.abort();
        }
    }

    pub fn is_pending(&self, token: CancelToken) -> bool {
        self.inner.is_armed(token.0)
    }

    /// Number of registered timers (pending one-shots plus live periodics).
    pub fn active_count(&self) -> usize {
        self.inner.timers().len()
    }
}

fn take_if_armed(registry: &Weak<SchedulerInner>, id: u64) -> bool {
    registry
        .upgrade()
        .map(|inner| inner.disarm(id))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn counter() -> (Arc<AtomicUsize>, impl Fn() -> usize) {
        let count = Arc::new(AtomicUsize::new(0));
        let reader = Arc::clone(&count);
        (count, move || reader.load(Ordering::SeqCst))
    }

    #[tokio::test(start_paused = true)]
    async fn test_once_fires_after_delay_and_deregisters() {
        let scheduler = Scheduler::new();
        let (count, read) = counter();

        let token = scheduler.schedule_once(Duration::from_millis(500), move || async move {
            count.fetch_add(1, Ordering::SeqCst);
        });
        assert!(scheduler.is_pending(token));

        time::sleep(Duration::from_millis(499)).await;
        assert_eq!(read(), 0);

        time::sleep(Duration::from_millis(2)).await;
        assert_eq!(read(), 1);
        assert!(!scheduler.is_pending(token));
        assert_eq!(scheduler.active_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_before_fire_prevents_callback() {
        let scheduler = Scheduler::new();
        let (count, read) = counter();

        let token = scheduler.schedule_once(Duration::from_millis(100), move || async move {
            count.fetch_add(1, Ordering::SeqCst);
        });
        assert!(scheduler.cancel(token));

        time::sleep(Duration::from_millis(200)).await;
        assert_eq!(read(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_is_idempotent() {
        let scheduler = Scheduler::new();
        let (count, _read) = counter();

        let token = scheduler.schedule_once(Duration::from_millis(10), move || async move {
            count.fetch_add(1, Ordering::SeqCst);
        });
        time::sleep(Duration::from_millis(20)).await;

        // Already fired.
        assert!(!scheduler.cancel(token));
        // Already cancelled.
        assert!(!scheduler.cancel(token));
    }

    #[tokio::test(start_paused = true)]
    async fn test_periodic_ticks_until_cancelled() {
        let scheduler = Scheduler::new();
        let (count, read) = counter();

        let token = scheduler.schedule_periodic(Duration::from_millis(100), move || {
            let count = Arc::clone(&count);
            async move {
                count.fetch_add(1, Ordering::SeqCst);
            }
        });

        time::sleep(Duration::from_millis(350)).await;
        assert_eq!(read(), 3);

        scheduler.cancel(token);
        time::sleep(Duration::from_millis(500)).await;
        assert_eq!(read(), 3);
        assert_eq!(scheduler.active_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_periodic_rearm_does_not_leak() {
        let scheduler = Scheduler::new();
        let (count, read) = counter();

        let mut token = None;
        for _ in 0..5 {
            if let Some(previous) = token.take() {
                scheduler.cancel(previous);
            }
            let count = Arc::clone(&count);
            token = Some(scheduler.schedule_periodic(
                Duration::from_millis(100),
                move || {
                    let count = Arc::clone(&count);
                    async move {
                        count.fetch_add(1, Ordering::SeqCst);
                    }
                },
            ));
        }
        assert_eq!(scheduler.active_count(), 1);

        time::sleep(Duration::from_millis(150)).await;
        assert_eq!(read(), 1, "only the latest periodic timer may tick");
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_all_clears_registry() {
        let scheduler = Scheduler::new();
        scheduler.schedule_once(Duration::from_secs(1), || async {});
        scheduler.schedule_periodic(Duration::from_secs(1), || async {});
        assert_eq!(scheduler.active_count(), 2);

        scheduler.cancel_all();
        assert_eq!(scheduler.active_count(), 0);
    }
}
