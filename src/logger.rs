//! Logging initialisation via tracing-subscriber.
//!
//! Call [`init`] once at startup, after config is resolved. Logs go to
//! stderr or a file so they never interleave with the console's stdout.

use std::path::Path;

use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::EnvFilter;

use crate::error::AppError;

/// Initialise the global tracing subscriber.
///
/// `level` accepts standard level strings (`"error"` … `"trace"`) or a full
/// `EnvFilter` directive. With `prefer_level`, `level` wins and `RUST_LOG`
/// is only a fallback; otherwise `RUST_LOG` wins.
pub fn init(level: &str, prefer_level: bool, log_file: Option<&Path>) -> Result<(), AppError> {
    let filter = if prefer_level {
        match EnvFilter::try_new(level) {
            Ok(filter) => filter,
            Err(level_err) => EnvFilter::try_from_default_env()
                .map_err(|env_err| {
                    AppError::Logger(format!(
                        "invalid log level '{level}': {level_err}; RUST_LOG parse failed: {env_err}"
                    ))
                })?,
        }
    } else {
        EnvFilter::try_from_default_env()
            .or_else(|_| EnvFilter::try_new(level))
            .map_err(|e| AppError::Logger(format!("invalid log level '{level}': {e}")))?
    };

    let writer = if let Some(path) = log_file {
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|e| {
                AppError::Logger(format!(
                    "failed to open log file '{}': {e}",
                    path.display()
                ))
            })?;
        BoxMakeWriter::new(file)
    } else {
        BoxMakeWriter::new(std::io::stderr)
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        .try_init()
        .map_err(|e| AppError::Logger(format!("failed to set subscriber: {e}")))?;

    Ok(())
}
