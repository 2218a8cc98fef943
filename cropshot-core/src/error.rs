// ============================================================================
// cropshot-core/src/error.rs
// ============================================================================
//
// ERROR HANDLING: Custom Error Types and Utilities
//
// This module defines the error type used throughout cropshot-core and a few
// helpers for building the command-related variants consistently.
//
// KEY COMPONENTS:
// - CoreError: enum covering I/O, external command, probe, pipeline and
//   configuration failures
// - CoreResult: result alias for core operations
// - command_*_error: constructors for external command failures

use std::io;
use std::path::PathBuf;
use std::process::ExitStatus;
use thiserror::Error;

/// Errors produced by cropshot-core.
#[derive(Error, Debug)]
pub enum CoreError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("Failed to execute {0}: {1}")]
    CommandStart(String, io::Error),

    #[error("Failed to wait for {0}: {1}")]
    CommandWait(String, io::Error),

    #[error("Command {0} failed with status {1}. Stderr: {2}")]
    CommandFailed(String, ExitStatus, String),

    #[error("ffprobe output parsing error: {0}")]
    FfprobeParse(String),

    #[error("Video info error: {0}")]
    VideoInfoError(String),

    #[error("No processable video files found in {0}")]
    NoFilesFound(PathBuf),

    #[error("Path error: {0}")]
    PathError(String),

    #[error("Required external dependency '{0}' not found")]
    DependencyNotFound(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    /// Fatal failure inside the decode/filter/encode state machine.
    #[error("Pipeline error ({stage}): {message}")]
    Pipeline { stage: &'static str, message: String },

    #[error("Operation failed: {0}")]
    OperationFailed(String),
}

/// Result type for cropshot-core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Builds a `CommandStart` error for a command that could not be spawned.
pub fn command_start_error(cmd: impl Into<String>, err: io::Error) -> CoreError {
    CoreError::CommandStart(cmd.into(), err)
}

/// Builds a `CommandWait` error for a command whose exit could not be collected.
pub fn command_wait_error(cmd: impl Into<String>, err: io::Error) -> CoreError {
    CoreError::CommandWait(cmd.into(), err)
}

/// Builds a `CommandFailed` error for a command that exited unsuccessfully.
pub fn command_failed_error(
    cmd: impl Into<String>,
    status: ExitStatus,
    stderr: impl Into<String>,
) -> CoreError {
    CoreError::CommandFailed(cmd.into(), status, stderr.into())
}

/// Builds a `Pipeline` error for the given state machine stage.
pub fn pipeline_error(stage: &'static str, message: impl Into<String>) -> CoreError {
    CoreError::Pipeline {
        stage,
        message: message.into(),
    }
}
