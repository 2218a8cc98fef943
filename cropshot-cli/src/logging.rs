// cropshot-cli/src/logging.rs
//
// Log initialization for the CLI. The appenders themselves live in
// cropshot_core::file_logging; this module picks the level and the log file.

use crate::error::CliResult;
use cropshot_core::CoreError;
use cropshot_core::file_logging::{setup_console_logging, setup_file_logging};
use log::LevelFilter;
use std::path::{Path, PathBuf};

/// Returns the current local timestamp formatted as "YYYYMMDD_HHMMSS".
pub fn get_timestamp() -> String {
    chrono::Local::now().format("%Y%m%d_%H%M%S").to_string()
}

/// Path of the run log inside `log_dir` for the given timestamp.
pub fn log_file_path(log_dir: &Path, timestamp: &str) -> PathBuf {
    log_dir.join(format!("cropshot_run_{}.log", timestamp))
}

pub fn level_for(verbose: bool) -> LevelFilter {
    if verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    }
}

/// Initializes logging; returns the log file path when one is written.
pub fn init_logging(log_dir: Option<&Path>, verbose: bool) -> CliResult<Option<PathBuf>> {
    let level = level_for(verbose);
    match log_dir {
        Some(dir) => {
            let path = log_file_path(dir, &get_timestamp());
            setup_file_logging(&path, level).map_err(|e| {
                CoreError::OperationFailed(format!("Setting up log file {}: {}", path.display(), e))
            })?;
            Ok(Some(path))
        }
        None => {
            setup_console_logging(level).map_err(|e| {
                CoreError::OperationFailed(format!("Setting up console logging: {}", e))
            })?;
            Ok(None)
        }
    }
}
