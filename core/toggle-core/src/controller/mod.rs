//! Optimistic toggle controller.
//!
//! Flips the displayed state the moment the user asks, runs the external
//! command, then verifies against a fresh probe and reconciles. A periodic
//! drift check keeps the display honest when the state changes elsewhere.
//!
//! # Phases
//!
//! ```text
//!            on_appear (absent)                 on_activate
//!   Idle ─────────────────────────▶ Unavailable     │
//!    │                                              ▼
//!    │ probe (evidence)                    Optimistic(target)
//!    ▼                                     │        │        │
//!  Confirmed(s) ◀──── verify (evidence) ───┘        │        └── execute failed ──▶ (previous phase)
//!                                                   │
//!                         verify (no evidence) ─────▶ Unconfirmed(target)
//! ```
//!
//! `on_disappear` moves any phase to `Detached`.
//!
//! # Exclusion
//!
//! Every reconciliation cycle (appear, activation through verification, and
//! periodic ticks) holds the [`ExclusionGuard`] from before its first external
//! call until its last display update. A cycle that cannot take the guard is
//! dropped. An activation holds the guard across the verification delay; the
//! permit travels into the verification timer.
//!
//! # Teardown
//!
//! `on_disappear` bumps an epoch. Timer callbacks capture the epoch they were
//! armed under and no-op if it changed. The display sink is called while the
//! controller's state lock is held, so a `Display` must never call back into
//! the controller.

use chrono::Utc;
use once_cell::sync::Lazy;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use tracing::{debug, info, warn};

use crate::availability::{check_with_timeout, AvailabilityCheck};
use crate::config::ToggleConfig;
use crate::detector::Detector;
use crate::display::Display;
use crate::error::{ExecutionError, Result, ToggleError};
use crate::executor::{CommandSpec, Executor};
use crate::guard::{ExclusionGuard, GuardPermit};
use crate::resource::ResourceProfile;
use crate::scheduler::{CancelToken, Scheduler};
use crate::types::{DetectionResult, Indicator, ResourceAvailability, ToggleSession, ToggleState};


static SHARED_EXECUTOR: Lazy<Arc<Executor>> = Lazy::new(|| Arc::new(Executor::process()));

static SHARED_DETECTORS: Lazy<Mutex<HashMap<String, Arc<Detector>>>> =
    Lazy::new(|| Mutex::new(HashMap::new()));

/// Process-wide executor used when none is injected.
pub fn shared_executor() -> Arc<Executor> {
    Arc::clone(&SHARED_EXECUTOR)
}

/// Process-wide detector for a profile, built on first use.
pub fn shared_detector(profile: &ResourceProfile) -> Result<Arc<Detector>> {
    let mut detectors = SHARED_DETECTORS
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner());
    if let Some(detector) = detectors.get(&profile.id) {
        return Ok(Arc::clone(detector));
    }
    let detector = Arc::new(profile.build_detector()?);
    detectors.insert(profile.id.clone(), Arc::clone(&detector));
    Ok(detector)
}

/// Where the controller is in its state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "phase", content = "state")]
pub enum ControllerPhase {
    /// Not yet appeared, or appeared without any evidence so far.
    Idle,
    /// Resource process absent; nothing is probed or executed.
    Unavailable,
    /// Displayed state is backed by a detection.
    Confirmed(ToggleState),
    /// Toggle in flight; displayed ahead of confirmation.
    Optimistic(ToggleState),
    /// Toggle executed but verification found no evidence either way.
    Unconfirmed(ToggleState),
    /// Torn down by `on_disappear`.
    Detached,
}

/// What `on_activate` did, for host-side logging.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActivationOutcome {
    /// A cycle was already in flight, or the controller is not visible.
    Ignored,
    /// The resource is not running.
    Unavailable,
    /// Every attempt failed; the previous display was restored.
    Failed(ExecutionError),
    /// Command succeeded; verification is scheduled.
    Pending { target: ToggleState, attempts: u32 },
    /// The controller disappeared while the command was running.
    Abandoned,
}

/// Point-in-time view of a controller for hosts and tests.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ControllerSnapshot {
    pub resource: String,
    pub phase: ControllerPhase,
    pub confirmed: ToggleState,
    pub displayed: ToggleState,
    pub indicator: Indicator,
    pub session: Option<ToggleSession>,
    pub periodic_armed: bool,
    pub verification_pending: bool,
    pub cycle_in_flight: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CycleTrigger {
    Appear,
    Periodic,
}

impl CycleTrigger {
    fn as_str(self) -> &'static str {
        match self {
            CycleTrigger::Appear => "appear",
            CycleTrigger::Periodic => "periodic",
        }
    }
}

struct ControllerState {
    config: ToggleConfig,
    phase: ControllerPhase,
    confirmed: ToggleState,
    displayed: ToggleState,
    indicator: Indicator,
    session: Option<ToggleSession>,
    visible: bool,
    epoch: u64,
    periodic: Option<CancelToken>,
    verification: Option<CancelToken>,
}

impl ControllerState {
    fn new(config: ToggleConfig) -> Self {
        Self {
            config,
            phase: ControllerPhase::Idle,
            confirmed: ToggleState::Unknown,
            displayed: ToggleState::Unknown,
            indicator: Indicator::Clear,
            session: None,
            visible: false,
            epoch: 0,
            periodic: None,
            verification: None,
        }
    }

    /// State the next activation flips away from: the last confirmed state,
    /// unless a previous toggle is still displayed unconfirmed.
    fn flip_basis(&self) -> ToggleState {
        match self.phase {
            ControllerPhase::Unconfirmed(target) => target,
            _ => self.confirmed,
        }
    }
}

struct ControllerInner {
    resource: String,
    command: CommandSpec,
    detector: Arc<Detector>,
    executor: Arc<Executor>,
    availability: Arc<dyn AvailabilityCheck>,
    display: Arc<dyn Display>,
    scheduler: Scheduler,
    guard: ExclusionGuard,
    state: Mutex<ControllerState>,
}

/// Builder for [`ToggleController`]. Detector and executor are injected so
/// tests (and hosts with several controllers) can share or replace them.
pub struct ToggleControllerBuilder {
    resource: String,
    command: CommandSpec,
    config: ToggleConfig,
    detector: Arc<Detector>,
    executor: Arc<Executor>,
    availability: Arc<dyn AvailabilityCheck>,
    display: Arc<dyn Display>,
}

impl ToggleControllerBuilder {
    pub fn config(mut self, config: ToggleConfig) -> Self {
        self.config = config;
        self
    }

    pub fn executor(mut self, executor: Arc<Executor>) -> Self {
        self.executor = executor;
        self
    }

    pub fn build(self) -> Result<ToggleController> {
        self.config.validate()?;
        Ok(ToggleController {
            inner: Arc::new(ControllerInner {
                resource: self.resource,
                command: self.command,
                detector: self.detector,
                executor: self.executor,
                availability: self.availability,
                display: self.display,
                scheduler: Scheduler::new(),
                guard: ExclusionGuard::new(),
                state: Mutex::new(ControllerState::new(self.config)),
            }),
        })
    }
}

/// Controller for one resource instance. Cloning yields another handle to the
/// same controller.
#[derive(Clone)]
pub struct ToggleController {
    inner: Arc<ControllerInner>,
}

impl ToggleController {
    /// Starts a builder with the required collaborators. The executor defaults
    /// to the process-wide instance.
    pub fn builder(
        resource: impl Into<String>,
        command: CommandSpec,
        detector: Arc<Detector>,
        availability: Arc<dyn AvailabilityCheck>,
        display: Arc<dyn Display>,
    ) -> ToggleControllerBuilder {
        ToggleControllerBuilder {
            resource: resource.into(),
            command,
            config: ToggleConfig::default(),
            detector,
            executor: shared_executor(),
            availability,
            display,
        }
    }

    /// Controller wired from a resource profile: shared detector and executor,
    /// sysinfo-backed availability and the profile's own tuning.
    pub fn from_profile(profile: &ResourceProfile, display: Arc<dyn Display>) -> Result<Self> {
        Self::builder(
            profile.id.clone(),
            profile.toggle_command.clone(),
            shared_detector(profile)?,
            Arc::new(profile.availability()),
            display,
        )
        .config(profile.tuning.clone())
        .build()
    }

    pub fn resource(&self) -> &str {
        &self.inner.resource
    }

    /// Replaces the configuration. Only allowed while the controller is not
    /// visible.
    pub fn configure(&self, config: ToggleConfig) -> Result<()> {
        config.validate()?;
        let mut state = self.state();
        if state.visible {
            return Err(ToggleError::ConfigLocked);
        }
        state.config = config;
        Ok(())
    }

    pub fn snapshot(&self) -> ControllerSnapshot {
        let state = self.state();
        ControllerSnapshot {
            resource: self.inner.resource.clone(),
            phase: state.phase,
            confirmed: state.confirmed,
            displayed: state.displayed,
            indicator: state.indicator.clone(),
            session: state.session.clone(),
            periodic_armed: state
                .periodic
                .map(|token| self.inner.scheduler.is_pending(token))
                .unwrap_or(false),
            verification_pending: state
                .verification
                .map(|token| self.inner.scheduler.is_pending(token))
                .unwrap_or(false),
            cycle_in_flight: self.inner.guard.is_held(),
        }
    }

    // ─────────────────────────────────────────────────────────────────────
    // Lifecycle
    // ─────────────────────────────────────────────────────────────────────

    /// Host made the toggle visible: reconcile once, then start drift checks.
    pub async fn on_appear(&self) {
        let epoch = {
            let mut state = self.state();
            // A visible but unavailable controller may be re-appeared to retry.
            if state.visible && state.phase != ControllerPhase::Unavailable {
                debug!(resource = %self.inner.resource, "on_appear while already visible");
                return;
            }
            state.visible = true;
            if state.phase == ControllerPhase::Detached {
                state.phase = ControllerPhase::Idle;
            }
            state.epoch
        };
        info!(resource = %self.inner.resource, "Controller appeared");

        let availability = self.check_availability().await;
        if !self.is_current(epoch) {
            return;
        }
        if !availability.process_present {
            self.mark_unavailable();
            return;
        }

        match self.inner.guard.try_acquire() {
            Some(permit) => {
                let result = self.probe().await;
                if self.is_current(epoch) {
                    self.reconcile(&result, CycleTrigger::Appear);
                }
                drop(permit);
            }
            None => {
                debug!(resource = %self.inner.resource, "Initial reconciliation skipped; cycle in flight");
                // The cycle holding the guard may be the running tick; re-arming
                // would abort it mid-probe.
                if self.state().periodic.is_some() {
                    return;
                }
            }
        }

        if self.is_current(epoch) {
            self.arm_periodic();
        }
    }

    /// Host is removing the toggle. Stops every timer and drops any in-flight
    /// session without touching the display.
    pub fn on_disappear(&self) {
        {
            let mut state = self.state();
            state.visible = false;
            state.epoch = state.epoch.wrapping_add(1);
            state.session = None;
            state.phase = ControllerPhase::Detached;
            state.periodic = None;
            state.verification = None;
        }

        // Every timer in this scheduler belongs to this controller.
        self.inner.scheduler.cancel_all();
        self.inner.guard.force_release();
        info!(resource = %self.inner.resource, "Controller disappeared");
    }

    // ─────────────────────────────────────────────────────────────────────
    // User input
    // ─────────────────────────────────────────────────────────────────────

    /// User toggled. Displays the flipped state immediately, then executes and
    /// schedules verification.
    pub async fn on_activate(&self) -> ActivationOutcome {
        let Some(permit) = self.inner.guard.try_acquire() else {
            debug!(resource = %self.inner.resource, "Activation ignored; cycle in flight");
            return ActivationOutcome::Ignored;
        };

        let epoch = {
            let state = self.state();
            if !state.visible {
                debug!(resource = %self.inner.resource, "Activation ignored; controller not visible");
                return ActivationOutcome::Ignored;
            }
            state.epoch
        };

        let availability = self.check_availability().await;
        if !self.is_current(epoch) {
            return ActivationOutcome::Abandoned;
        }
        if !availability.process_present {
            self.mark_unavailable();
            return ActivationOutcome::Unavailable;
        }

        let (target, previous_phase, previous_display, policy) = {
            let mut state = self.state();
            let previous_phase = state.phase;
            let previous_display = state.displayed;
            let target = state.flip_basis().toggled();

            state.session = Some(ToggleSession {
                requested_at: Utc::now(),
                optimistic_state: target,
                verification_deadline: None,
                attempts_used: 0,
            });
            state.phase = ControllerPhase::Optimistic(target);
            self.show_state(&mut state, target);
            self.show_indicator(&mut state, Indicator::Clear);
            (target, previous_phase, previous_display, state.config.retry_policy())
        };
        info!(resource = %self.inner.resource, target = %target, "Optimistic toggle");

        let report = match self.inner.executor.execute(&self.inner.command, &policy).await {
            Ok(report) => report,
            Err(err) => {
                if self.is_current(epoch) {
                    let mut state = self.state();
                    state.session = None;
                    state.phase = previous_phase;
                    self.show_state(&mut state, previous_display);
                    self.show_indicator(
                        &mut state,
                        Indicator::Error(format!("Toggle failed after {} attempt(s)", err.attempts)),
                    );
                }
                warn!(
                    resource = %self.inner.resource,
                    attempts = err.attempts,
                    error = %err.last,
                    "Toggle failed; optimistic state reverted"
                );
                return ActivationOutcome::Failed(err);
            }
        };

        if !self.is_current(epoch) {
            return ActivationOutcome::Abandoned;
        }

        let mut state = self.state();
        let delay = state.config.verification_delay();
        if let Some(session) = state.session.as_mut() {
            session.attempts_used = report.attempts;
            session.verification_deadline =
                chrono::Duration::from_std(delay).ok().map(|delay| Utc::now() + delay);
        }

        let weak = Arc::downgrade(&self.inner);
        let token = self.inner.scheduler.schedule_once(delay, move || async move {
            if let Some(controller) = ToggleController::upgrade(&weak) {
                controller.verify(permit, epoch).await;
            }
        });
        state.verification = Some(token);
        debug!(
            resource = %self.inner.resource,
            delay_ms = delay.as_millis() as u64,
            attempts = report.attempts,
            "Verification scheduled"
        );

        ActivationOutcome::Pending {
            target,
            attempts: report.attempts,
        }
    }

    // ─────────────────────────────────────────────────────────────────────
    // Cycles
    // ─────────────────────────────────────────────────────────────────────

    async fn verify(&self, permit: GuardPermit, epoch: u64) {
        if !self.is_current(epoch) || !permit.is_current() {
            debug!(resource = %self.inner.resource, "Verification fired after teardown; ignoring");
            return;
        }
        self.state().verification = None;

        let result = self.probe().await;
        if !self.is_current(epoch) {
            return;
        }

        {
            let mut state = self.state();
            let target = state
                .session
                .take()
                .map(|session| session.optimistic_state)
                .unwrap_or(state.displayed);

            if result.is_evidence() {
                if result.state != target {
                    info!(
                        resource = %self.inner.resource,
                        optimistic = %target,
                        detected = %result.state,
                        confidence = ?result.confidence,
                        "Drift after toggle; correcting display"
                    );
                }
                self.confirm(&mut state, result.state);
            } else {
                debug!(
                    resource = %self.inner.resource,
                    target = %target,
                    "Verification inconclusive; keeping optimistic state"
                );
                state.phase = ControllerPhase::Unconfirmed(target);
                self.show_indicator(&mut state, Indicator::Unconfirmed);
            }
        }

        drop(permit);
        self.arm_periodic();
    }

    async fn tick(&self, epoch: u64) {
        let Some(permit) = self.inner.guard.try_acquire() else {
            debug!(resource = %self.inner.resource, "Periodic tick skipped; cycle in flight");
            return;
        };
        if !self.is_current(epoch) {
            return;
        }

        let availability = self.check_availability().await;
        if !self.is_current(epoch) {
            return;
        }
        if !availability.process_present {
            self.mark_unavailable();
            drop(permit);
            // Cancels this very timer; nothing may follow.
            self.stop_periodic();
            return;
        }

        let result = self.probe().await;
        if !self.is_current(epoch) {
            return;
        }
        self.reconcile(&result, CycleTrigger::Periodic);
        drop(permit);
        // Replaces this very timer; nothing may await after it.
        self.arm_periodic();
    }

    /// Applies a steady-state detection. Only fresh evidence changes the display.
    fn reconcile(&self, result: &DetectionResult, trigger: CycleTrigger) {
        let mut state = self.state();

        if !result.is_evidence() {
            debug!(
                resource = %self.inner.resource,
                trigger = trigger.as_str(),
                "No evidence; keeping displayed state"
            );
            if state.phase == ControllerPhase::Unavailable {
                state.phase = ControllerPhase::Idle;
                self.show_indicator(&mut state, Indicator::Clear);
            }
            return;
        }

        if state.displayed.is_known() && state.displayed != result.state {
            info!(
                resource = %self.inner.resource,
                trigger = trigger.as_str(),
                displayed = %state.displayed,
                detected = %result.state,
                confidence = ?result.confidence,
                "Drift detected; reconciling"
            );
        }
        self.confirm(&mut state, result.state);
    }

    fn confirm(&self, state: &mut ControllerState, detected: ToggleState) {
        state.confirmed = detected;
        state.phase = ControllerPhase::Confirmed(detected);
        self.show_state(state, detected);
        self.show_indicator(state, Indicator::Clear);
    }

    fn mark_unavailable(&self) {
        let mut state = self.state();
        if state.phase != ControllerPhase::Unavailable {
            info!(resource = %self.inner.resource, "Resource unavailable");
        }
        state.phase = ControllerPhase::Unavailable;
        state.confirmed = ToggleState::Unknown;
        state.session = None;
        self.show_state(&mut state, ToggleState::Unknown);
        self.show_indicator(&mut state, Indicator::Unavailable);
    }

    // ─────────────────────────────────────────────────────────────────────
    // Timers
    // ─────────────────────────────────────────────────────────────────────

    /// Cancels any running drift check and starts a fresh one.
    fn arm_periodic(&self) {
        let mut state = self.state();
        if !state.visible {
            return;
        }
        if let Some(previous) = state.periodic.take() {
            self.inner.scheduler.cancel(previous);
        }

        let epoch = state.epoch;
        let weak = Arc::downgrade(&self.inner);
        let token = self
            .inner
            .scheduler
            .schedule_periodic(state.config.poll_interval(), move || {
                let weak = weak.clone();
                async move {
                    if let Some(controller) = ToggleController::upgrade(&weak) {
                        controller.tick(epoch).await;
                    }
                }
            });
        state.periodic = Some(token);
    }

    fn stop_periodic(&self) {
        let token = self.state().periodic.take();
        if let Some(token) = token {
            self.inner.scheduler.cancel(token);
        }
    }

    // ─────────────────────────────────────────────────────────────────────
    // Helpers
    // ─────────────────────────────────────────────────────────────────────

    fn upgrade(weak: &Weak<ControllerInner>) -> Option<Self> {
        weak.upgrade().map(|inner| Self { inner })
    }

    fn state(&self) -> MutexGuard<'_, ControllerState> {
        self.inner
            .state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn is_current(&self, epoch: u64) -> bool {
        let state = self.state();
        state.visible && state.epoch == epoch
    }

    async fn probe(&self) -> DetectionResult {
        let timeout = self.state().config.probe_timeout();
        self.inner.detector.probe(timeout).await
    }

    async fn check_availability(&self) -> ResourceAvailability {
        let timeout = self.state().config.availability_timeout();
        check_with_timeout(self.inner.availability.as_ref(), timeout).await
    }

    fn show_state(&self, state: &mut ControllerState, value: ToggleState) {
        state.displayed = value;
        self.inner.display.set_state(value);
    }

    fn show_indicator(&self, state: &mut ControllerState, indicator: Indicator) {
        if state.indicator == indicator {
            return;
        }
        self.inner.display.set_indicator(&indicator);
        state.indicator = indicator;
    }
}

impl std::fmt::Debug for ToggleController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToggleController")
            .field("resource", &self.inner.resource)
            .finish_non_exhaustive()
    }
}
