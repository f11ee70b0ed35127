//! Tracing setup: everything at the configured level goes to the log file,
//! warnings and errors are echoed to stderr.

use crate::core::error::{PceError, PceResult};
use std::fs::OpenOptions;
use std::path::Path;
use std::sync::Mutex;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, fmt};

pub const DEFAULT_LOG_FILE: &str = "pcectl.log";

pub fn init(verbose: bool, log_file: &Path) -> PceResult<()> {
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_file)
        .map_err(PceError::IoError)?;

    let default_level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let file_layer = fmt::layer()
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .with_target(false);
    let stderr_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .without_time()
        .compact()
        .with_filter(LevelFilter::WARN);

    tracing_subscriber::registry()
        .with(filter)
        .with(file_layer)
        .with(stderr_layer)
        .try_init()
        .map_err(|e| PceError::ConfigError(format!("failed to initialize logging: {}", e)))
}
