//! File logging for the engine.
use crate::config::data_dir;
use anyhow::{Context, anyhow};
use std::io::LineWriter;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing_subscriber::fmt::time::OffsetTime;

const MAX_LOG_BYTES: u64 = 100 * 1024;

/// Sets up file logging to `<log_dir>/brainwire.log`, defaulting to the data
/// directory. The previous log is moved to `brainwire.log.old` once it
/// exceeds 100KB.
pub fn setup_logging(log_dir: Option<PathBuf>) -> anyhow::Result<()> {
    let log_dir = match log_dir {
        Some(dir) => dir,
        None => data_dir().context("Failed to get data directory")?,
    };
    let log_path = rotate_log(&log_dir)?;

    let log_file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_path)?;

    // Ensure the logs are flushed after every line
    let writer = Mutex::new(LineWriter::new(log_file));

    tracing_subscriber::fmt()
        .with_env_filter("brainwire=debug,brainwire_core=debug,brainwire_providers=debug")
        .with_writer(writer)
        .with_ansi(false)
        .with_timer(OffsetTime::local_rfc_3339()?)
        .try_init()
        .map_err(|e| anyhow!("Failed to initialize logging: {e}"))
}

/// Returns the active log path, moving an oversized log out of the way.
fn rotate_log(log_dir: &Path) -> anyhow::Result<PathBuf> {
    std::fs::create_dir_all(log_dir)?;
    let log_path = log_dir.join("brainwire.log");

    if log_path.exists() && std::fs::metadata(&log_path)?.len() > MAX_LOG_BYTES {
        let backup_path = log_dir.join("brainwire.log.old");
        if backup_path.exists() {
            std::fs::remove_file(&backup_path)?;
        }
        std::fs::rename(&log_path, backup_path)?;
    }
    Ok(log_path)
}
