//! Tracing setup for the ingestion worker.
//!
//! Stdout gets either a compact human format or one JSON object per event
//! (`INGEST_LOG_FORMAT=json`), which is what log shippers in a container deployment expect.
//! A second, non-blocking layer appends to `INGEST_LOG_FILE`, or `logs/ingest-worker.log`
//! when unset. `INGEST_LOG_FILE=off` disables the file sink.
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_subscriber::{EnvFilter, Layer, fmt, prelude::*};

const DEFAULT_LOG_DIR: &str = "logs";
const DEFAULT_LOG_FILE: &str = "ingest-worker.log";

static LOG_GUARD: OnceLock<WorkerGuard> = OnceLock::new();

/// Stdout event format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Single-line human-readable events.
    Compact,
    /// One JSON object per event.
    Json,
}

impl LogFormat {
    fn from_env_value(value: Option<&str>) -> Self {
        match value.map(str::trim) {
            Some(value) if value.eq_ignore_ascii_case("json") => Self::Json,
            _ => Self::Compact,
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
enum FileSink {
    Disabled,
    Path(PathBuf),
}

fn file_sink(value: Option<&str>) -> FileSink {
    match value.map(str::trim) {
        Some(value) if value.eq_ignore_ascii_case("off") => FileSink::Disabled,
        Some(value) if !value.is_empty() => FileSink::Path(PathBuf::from(value)),
        _ => FileSink::Path(Path::new(DEFAULT_LOG_DIR).join(DEFAULT_LOG_FILE)),
    }
}

/// Install the global subscriber.
///
/// Filtering follows `RUST_LOG` and falls back to `info`. Call once, after configuration has
/// been loaded, so `.env` values are visible.
pub fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let format = LogFormat::from_env_value(std::env::var("INGEST_LOG_FORMAT").ok().as_deref());

    let stdout_layer = match format {
        LogFormat::Compact => fmt::layer().with_target(false).compact().boxed(),
        LogFormat::Json => fmt::layer().json().flatten_event(true).boxed(),
    };
    let file_layer = open_file_writer(file_sink(std::env::var("INGEST_LOG_FILE").ok().as_deref()))
        .map(|writer| {
            fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .compact()
        });

    tracing_subscriber::registry()
        .with(env_filter)
        .with(stdout_layer)
        .with(file_layer)
        .init();
}

fn open_file_writer(sink: FileSink) -> Option<NonBlocking> {
    let FileSink::Path(path) = sink else {
        return None;
    };
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty())
        && let Err(err) = std::fs::create_dir_all(parent)
    {
        eprintln!("Failed to create log directory {}: {err}", parent.display());
        return None;
    }
    match std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
    {
        Ok(file) => {
            let (non_blocking, guard) = tracing_appender::non_blocking(file);
            let _ = LOG_GUARD.set(guard);
            Some(non_blocking)
        }
        Err(err) => {
            eprintln!("Failed to open log file {}: {err}", path.display());
            None
        }
    }
}
