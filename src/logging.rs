use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

use crate::errors::AppError;

const DEFAULT_FILTER: &str = "ld_provisioner=info,provisioner=info";

/// `<dir>/<command>_<YYYYmmdd_HHMMSS>.log`
pub fn log_file_path(dir: &Path, command: &str, now: chrono::DateTime<chrono::Local>) -> PathBuf {
    dir.join(format!("{}_{}.log", command, now.format("%Y%m%d_%H%M%S")))
}

/// Installs the global subscriber: console output on stderr plus one log
/// file per invocation. Returns the log file path.
pub fn init(dir: &Path, command: &str, json: bool) -> Result<PathBuf, AppError> {
    fs::create_dir_all(dir).map_err(|e| {
        AppError::Config(format!("cannot create log directory {}: {}", dir.display(), e))
    })?;
    let path = log_file_path(dir, command, chrono::Local::now());
    let file = File::create(&path)
        .map_err(|e| AppError::Config(format!("cannot create log file {}: {}", path.display(), e)))?;

    let file_layer = if json {
        fmt::layer()
            .json()
            .with_writer(Mutex::new(file))
            .boxed()
    } else {
        fmt::layer()
            .with_ansi(false)
            .with_target(false)
            .with_writer(Mutex::new(file))
            .boxed()
    };

    tracing_subscriber::registry()
        .with(EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| DEFAULT_FILTER.into()),
        ))
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .with(file_layer)
        .try_init()
        .map_err(|e| AppError::Internal(anyhow::anyhow!("failed to install log subscriber: {}", e)))?;

    Ok(path)
}
