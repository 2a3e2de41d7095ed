use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::Level;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Debug, Clone, Serialize)]
pub struct LoggingInitInfo {
    pub logs_dir: String,
    pub initialized_at: DateTime<Utc>,
}

/// Initializes the global `tracing` subscriber: stdout human output plus a
/// rolling JSON file under `<state_dir>/logs`. Returns the guard that must
/// be held for the process lifetime to keep the non-blocking writer alive.
pub fn init_tracing(state_dir: &Path, default_filter: &str) -> anyhow::Result<(LoggingInitInfo, WorkerGuard)> {
    let logs_dir: PathBuf = state_dir.join("logs");
    std::fs::create_dir_all(&logs_dir)?;

    let file_appender = tracing_appender::rolling::daily(&logs_dir, "devcrew-engine.log");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    let stdout_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_level(true);
    let file_layer = tracing_subscriber::fmt::layer()
        .json()
        .with_writer(non_blocking)
        .with_target(true);

    tracing_subscriber::registry()
        .with(filter)
        .with(stdout_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| anyhow::anyhow!("failed to install tracing subscriber: {e}"))?;

    Ok((
        LoggingInitInfo {
            logs_dir: logs_dir.display().to_string(),
            initialized_at: Utc::now(),
        },
        guard,
    ))
}

/// Structured event payload logged at job/step lifecycle transitions.
#[derive(Debug, Clone, Serialize)]
pub struct JobLogEvent<'a> {
    pub event: &'a str,
    pub job_id: &'a str,
    pub status: Option<&'a str>,
    pub detail: Option<&'a str>,
}

pub fn log_job_event(level: Level, ev: JobLogEvent<'_>) {
    match level {
        Level::ERROR => tracing::error!(
            target: "devcrew.jobs",
            event = ev.event,
            job_id = ev.job_id,
            status = ev.status.unwrap_or(""),
            detail = ev.detail.unwrap_or(""),
        ),
        Level::WARN => tracing::warn!(
            target: "devcrew.jobs",
            event = ev.event,
            job_id = ev.job_id,
            status = ev.status.unwrap_or(""),
            detail = ev.detail.unwrap_or(""),
        ),
        _ => tracing::info!(
            target: "devcrew.jobs",
            event = ev.event,
            job_id = ev.job_id,
            status = ev.status.unwrap_or(""),
            detail = ev.detail.unwrap_or(""),
        ),
    }
}
