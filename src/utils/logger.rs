//! Logging setup for the gate binary.
//!
//! stdout carries the decision JSON, so logs go to a file: one per run,
//! `rusty-gate.<timestamp>.log`, in the configured directory or in `logs/`
//! next to the executable.
//!
//! The level comes from `RUST_LOG` and defaults to `info`.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::Local;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// `logs/` beside the executable, or `./logs` when that cannot be found.
pub fn default_log_dir() -> PathBuf {
    std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(|p| p.join("logs")))
        .unwrap_or_else(|| PathBuf::from("logs"))
}

/// File name for a run started now.
pub fn log_file_name() -> String {
    format!("rusty-gate.{}.log", Local::now().format("%Y-%m-%d-%H-%M-%S"))
}

/// Install the global subscriber.
///
/// Returns the writer guard; logs are flushed when it is dropped, so keep it
/// alive until exit. Returns `None` (logging disabled) if the log file cannot
/// be created.
pub fn init_logging(log_dir: Option<&Path>) -> Option<WorkerGuard> {
    let log_dir = log_dir.map(Path::to_path_buf).unwrap_or_else(default_log_dir);

    if let Err(e) = fs::create_dir_all(&log_dir) {
        eprintln!("Warning: Failed to create logs directory {}: {}", log_dir.display(), e);
        return None;
    }

    let log_path = log_dir.join(log_file_name());
    let log_file = match fs::File::create(&log_path) {
        Ok(file) => file,
        Err(e) => {
            eprintln!("Warning: Failed to create log file {}: {}", log_path.display(), e);
            return None;
        }
    };

    let (writer, guard) = tracing_appender::non_blocking(log_file);
    let file_layer = fmt::layer()
        .with_writer(writer)
        .with_ansi(false)
        .with_target(true)
        .with_line_number(true);

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    // A second call (e.g. from tests) keeps the first subscriber.
    if tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer)
        .try_init()
        .is_err()
    {
        return None;
    }

    tracing::info!("Logging initialized - writing to {}", log_path.display());
    Some(guard)
}
