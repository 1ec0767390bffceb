//! Log setup for togglectl.
//!
//! Logs go to a daily-rolling file under `~/.togglehud/logs` so stdout stays
//! free for command output. Falls back to stderr when the directory is
//! unusable.

use fs_err as fs;
use std::env;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

const LOG_FILE_PREFIX: &str = "togglectl.log";

fn env_filter() -> EnvFilter {
    let debug_enabled = env::var("TOGGLEHUD_DEBUG_LOG")
        .map(|value| matches!(value.as_str(), "1" | "true" | "TRUE" | "yes" | "YES"))
        .unwrap_or(false);
    if debug_enabled {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    }
}

/// Installs the global subscriber. Keep the returned guard alive for the
/// whole process or buffered lines are lost on exit.
pub fn init() -> Option<WorkerGuard> {
    let log_dir = match toggle_core::get_togglehud_dir() {
        Some(dir) => dir.join("logs"),
        None => {
            init_stderr();
            return None;
        }
    };

    if let Err(err) = fs::create_dir_all(&log_dir) {
        init_stderr();
        tracing::warn!(error = %err, "Log directory unavailable; logging to stderr");
        return None;
    }

    let appender = tracing_appender::rolling::daily(&log_dir, LOG_FILE_PREFIX);
    let (writer, guard) = tracing_appender::non_blocking(appender);
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter())
        .with_writer(writer)
        .with_ansi(false)
        .try_init();
    Some(guard)
}

fn init_stderr() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter())
        .with_writer(std::io::stderr)
        .try_init();
}
