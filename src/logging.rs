//! Structured logging: a console sink plus a daily-rotating file sink.
//!
//! Mirrors the source project's `TimedRotatingFileHandler(when="midnight",
//! backupCount=30)`: `tracing-appender`'s `rolling::daily` handles the
//! midnight rotation, and [`prune_old_logs`] handles the 30-day retention
//! that `tracing-appender` does not implement on its own.

use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const LOG_FILE_PREFIX: &str = "orchestrator.log";
const RETENTION_DAYS: u64 = 30;

/// Initialize the global tracing subscriber. The returned [`WorkerGuard`]
/// must be held for the lifetime of the process; dropping it flushes and
/// stops the non-blocking file writer.
pub fn init(log_dir: &str) -> anyhow::Result<WorkerGuard> {
    std::fs::create_dir_all(log_dir)?;
    prune_old_logs(log_dir, RETENTION_DAYS);

    let file_appender = tracing_appender::rolling::daily(log_dir, LOG_FILE_PREFIX);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer())
        .with(fmt::layer().with_writer(non_blocking).with_ansi(false))
        .init();

    Ok(guard)
}

/// Delete rotated log files older than `retention_days`. `tracing-appender`
/// rotates files by appending a date suffix but never deletes old ones; this
/// is the analog of the source's `backupCount=30`.
fn prune_old_logs(log_dir: &str, retention_days: u64) {
    let cutoff = std::time::SystemTime::now()
        .checked_sub(std::time::Duration::from_secs(retention_days * 24 * 60 * 60));
    let Some(cutoff) = cutoff else { return };

    let Ok(entries) = std::fs::read_dir(Path::new(log_dir)) else {
        return;
    };

    for entry in entries.flatten() {
        let path = entry.path();
        let is_rotated_log = path
            .file_name()
            .and_then(|n| n.to_str())
            .map(|n| n.starts_with(LOG_FILE_PREFIX))
            .unwrap_or(false);
        if !is_rotated_log {
            continue;
        }

        if let Ok(metadata) = entry.metadata() {
            if let Ok(modified) = metadata.modified() {
                if modified < cutoff {
                    let _ = std::fs::remove_file(&path);
                }
            }
        }
    }
}
