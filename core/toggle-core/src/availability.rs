//! Resource availability checks.
//!
//! Availability gates everything else: when the target process is gone the
//! controller makes no probe and no command call at all.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use sysinfo::System;
use tracing::{debug, warn};

use crate::executor::{CommandRunner, CommandSpec, ProcessCommandRunner};
use crate::types::ResourceAvailability;

#[async_trait]
pub trait AvailabilityCheck: Send + Sync {
    async fn check(&self) -> ResourceAvailability;
}

/// Runs `check` under `timeout`, failing open to [`ResourceAvailability::absent`].
pub async fn check_with_timeout(
    check: &dyn AvailabilityCheck,
    timeout: Duration,
) -> ResourceAvailability {
    match tokio::time::timeout(timeout, check.check()).await {
        Ok(availability) => availability,
        Err(_) => {
            warn!(timeout_ms = timeout.as_millis() as u64, "Availability check timed out");
            ResourceAvailability::absent()
        }
    }
}

/// Looks for a running process by name using sysinfo.
///
/// `session_active` comes from an optional session command (exit status 0
/// means a session is active). Without one it mirrors `process_present`.
pub struct ProcessAvailability {
    process_names: Vec<String>,
    session_command: Option<CommandSpec>,
    runner: Arc<dyn CommandRunner>,
}

impl ProcessAvailability {
    pub fn new(process_names: Vec<String>) -> Self {
        Self {
            process_names,
            session_command: None,
            runner: Arc::new(ProcessCommandRunner),
        }
    }

    pub fn with_session_command(mut self, command: Option<CommandSpec>) -> Self {
        self.session_command = command;
        self
    }

    async fn process_present(&self) -> bool {
        let wanted: Vec<String> = self
            .process_names
            .iter()
            .map(|name| name.to_lowercase())
            .collect();
        if wanted.is_empty() {
            return false;
        }

        let scan = tokio::task::spawn_blocking(move || {
            let mut sys = System::new();
            sys.refresh_processes();
            sys.processes()
                .values()
                .any(|process| matches_process_name(process.name(), &wanted))
        });

        match scan.await {
            Ok(found) => found,
            Err(err) => {
                warn!(error = %err, "Process scan task failed");
                false
            }
        }
    }
}

#[async_trait]
impl AvailabilityCheck for ProcessAvailability {
    async fn check(&self) -> ResourceAvailability {
        if !self.process_present().await {
            debug!(names = ?self.process_names, "Resource process not running");
            return ResourceAvailability::absent();
        }

        let session_active = match &self.session_command {
            Some(command) => match self.runner.run(command).await {
                Ok(_) => true,
                Err(err) => {
                    debug!(error = %err, "Session check reported inactive");
                    false
                }
            },
            None => true,
        };
        ResourceAvailability::present(session_active)
    }
}

/// Fixed answer, for hosts that manage availability themselves.
#[derive(Debug, Clone, Copy)]
pub struct StaticAvailability(pub ResourceAvailability);

#[async_trait]
impl AvailabilityCheck for StaticAvailability {
    async fn check(&self) -> ResourceAvailability {
        self.0
    }
}

/// Case-insensitive exact match against any wanted name (already lowercased).
fn matches_process_name(name: &str, wanted: &[String]) -> bool {
    let name = name.to_lowercase();
    wanted.iter().any(|candidate| *candidate == name)
}
