//! Log routing for the HTTP front end and background analyses.
//!
//! Every analysis runs inside an `analysis` span carrying `project_id` and `document_path`, so
//! step logs (download, extraction, geocoding, Firestore writes) can be grepped per project even
//! when several executions interleave. Stdout gets a compact human format. The file copy keeps
//! targets and also records when each `analysis` span closes, which gives the wall time of an
//! execution without a metrics backend.
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_subscriber::{EnvFilter, fmt, fmt::format::FmtSpan, prelude::*};

/// Overrides the log file location.
pub const LOG_FILE_ENV: &str = "MINING_AI_LOG_FILE";

const LOG_DIR: &str = "logs";
const LOG_FILE_PREFIX: &str = "mining-analysis.log";

static LOG_GUARD: OnceLock<WorkerGuard> = OnceLock::new();

/// Where the file layer writes.
#[derive(Debug, Clone, PartialEq, Eq)]
enum LogFile {
    /// Append to an explicit path.
    Fixed(PathBuf),
    /// Roll daily under a directory.
    Daily { dir: PathBuf, prefix: String },
}

impl LogFile {
    fn from_env_value(value: Option<String>) -> Self {
        match value.map(|raw| raw.trim().to_string()) {
            Some(path) if !path.is_empty() => Self::Fixed(PathBuf::from(path)),
            _ => Self::Daily {
                dir: PathBuf::from(LOG_DIR),
                prefix: LOG_FILE_PREFIX.to_string(),
            },
        }
    }

    fn open(&self) -> std::io::Result<NonBlocking> {
        let (writer, guard) = match self {
            Self::Fixed(path) => tracing_appender::non_blocking(append_to(path)?),
            Self::Daily { dir, prefix } => {
                std::fs::create_dir_all(dir)?;
                tracing_appender::non_blocking(tracing_appender::rolling::daily(dir, prefix))
            }
        };
        let _ = LOG_GUARD.set(guard);
        Ok(writer)
    }
}

fn append_to(path: &Path) -> std::io::Result<std::fs::File> {
    std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
}

/// Install the global subscriber. `RUST_LOG` filters both layers and defaults to `info`.
///
/// A log file that cannot be opened is reported on stderr and the service keeps logging to
/// stdout only.
pub fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let stdout_layer = fmt::layer().with_target(false).compact();
    let registry = tracing_subscriber::registry()
        .with(env_filter)
        .with(stdout_layer);

    let target = LogFile::from_env_value(std::env::var(LOG_FILE_ENV).ok());
    match target.open() {
        Ok(writer) => {
            let file_layer = fmt::layer()
                .with_writer(writer)
                .with_target(true)
                .with_ansi(false)
                .with_span_events(FmtSpan::CLOSE)
                .compact();
            registry.with(file_layer).init();
        }
        Err(err) => {
            eprintln!("Failed to open log file {target:?}: {err}");
            registry.init();
        }
    }
}
