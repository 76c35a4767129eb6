//! Process-wide tracing setup for the CLI and embedding shells.
//!
//! Events go to two places: a compact human-readable stream on stderr and a
//! JSON file per session under the log directory, with span context attached
//! so a chart id can be followed across editing operations.

use std::{
    env, fs,
    path::{Path, PathBuf},
};

use anyhow::Context;
use chrono::{DateTime, Utc};
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

use crate::config::DiagnosticsConfig;

pub const DEFAULT_LOG_FILTER: &str = "info,chordchart_core=trace";
pub const DEFAULT_TRACE_FILE_PREFIX: &str = "chordchart";

/// Keep this alive for the whole session; the file writer stops flushing
/// once it is dropped.
pub struct TelemetryGuard {
    pub session_id: Uuid,
    pub log_file: PathBuf,
    _file_guard: WorkerGuard,
}

pub fn init_tracing(log_dir: impl AsRef<Path>) -> anyhow::Result<TelemetryGuard> {
    init_tracing_with_options(log_dir, DEFAULT_TRACE_FILE_PREFIX, DEFAULT_LOG_FILTER)
}

pub fn init_tracing_from_config(
    log_dir: impl AsRef<Path>,
    config: &DiagnosticsConfig,
) -> anyhow::Result<TelemetryGuard> {
    init_tracing_with_options(log_dir, &config.trace_file_prefix, &config.rust_log_filter)
}

/// `RUST_LOG` wins over `default_filter` when it is set and parses.
pub fn init_tracing_with_options(
    log_dir: impl AsRef<Path>,
    file_prefix: &str,
    default_filter: &str,
) -> anyhow::Result<TelemetryGuard> {
    let log_dir = log_dir.as_ref();
    fs::create_dir_all(log_dir)
        .with_context(|| format!("failed to create log directory: {}", log_dir.display()))?;

    let session_id = Uuid::new_v4();
    let log_file = session_log_file(log_dir, file_prefix, Utc::now());
    let file_name = log_file
        .file_name()
        .context("session log path has no file name")?;
    let (file_writer, file_guard) =
        tracing_appender::non_blocking(tracing_appender::rolling::never(log_dir, file_name));

    let (env_filter, rejected_env) = resolve_filter(default_filter);

    let console_layer = tracing_subscriber::fmt::layer()
        .compact()
        .with_writer(std::io::stderr)
        .with_target(true);

    let file_layer = tracing_subscriber::fmt::layer()
        .with_ansi(false)
        .json()
        .with_current_span(true)
        .with_span_list(true)
        .with_writer(file_writer);

    match tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .with(file_layer)
        .try_init()
    {
        Ok(()) => info!(%session_id, path = %log_file.display(), "tracing initialized"),
        Err(error) => warn!(?error, "tracing already initialized; keeping existing subscriber"),
    }
    if let Some(value) = rejected_env {
        warn!(%value, fallback = default_filter, "RUST_LOG ignored: not a valid filter");
    }

    Ok(TelemetryGuard {
        session_id,
        log_file,
        _file_guard: file_guard,
    })
}

fn session_log_file(log_dir: &Path, file_prefix: &str, started: DateTime<Utc>) -> PathBuf {
    log_dir.join(format!(
        "{file_prefix}-{}.log",
        started.format("%Y%m%d-%H%M%S")
    ))
}

/// The filter to install, plus the `RUST_LOG` value when it was set but
/// could not be parsed.
fn resolve_filter(default_filter: &str) -> (EnvFilter, Option<String>) {
    match env::var(EnvFilter::DEFAULT_ENV) {
        Ok(value) => match EnvFilter::try_new(&value) {
            Ok(filter) => (filter, None),
            Err(_) => (EnvFilter::new(default_filter), Some(value)),
        },
        Err(_) => (EnvFilter::new(default_filter), None),
    }
}
