// ============================================================================
// cropshot-cli/src/error.rs
// ============================================================================
//
// CLI ERROR HANDLING: Error types and utilities for the CLI
//
// The CLI reuses CoreError so core failures pass through unchanged; this
// module adds a way to prefix them with what the command was doing.

use cropshot_core::{CoreError, CoreResult};

use std::fmt;

/// Result type for CLI commands.
pub type CliResult<T> = CoreResult<T>;

/// Adds a human-readable prefix to an error on its way out of a command.
pub trait CliErrorContext<T> {
    fn cli_context<C>(self, context: C) -> CliResult<T>
    where
        C: fmt::Display;

    /// Lazy variant of [`cli_context`](CliErrorContext::cli_context).
    fn cli_with_context<C, F>(self, f: F) -> CliResult<T>
    where
        C: fmt::Display,
        F: FnOnce() -> C;
}

impl<T, E> CliErrorContext<T> for Result<T, E>
where
    E: Into<CoreError>,
{
    fn cli_context<C>(self, context: C) -> CliResult<T>
    where
        C: fmt::Display,
    {
        self.map_err(|e| with_context(context, e.into()))
    }

    fn cli_with_context<C, F>(self, f: F) -> CliResult<T>
    where
        C: fmt::Display,
        F: FnOnce() -> C,
    {
        self.map_err(|e| with_context(f(), e.into()))
    }
}

impl<T> CliErrorContext<T> for Option<T> {
    fn cli_context<C>(self, context: C) -> CliResult<T>
    where
        C: fmt::Display,
    {
        self.ok_or_else(|| CoreError::OperationFailed(context.to_string()))
    }

    fn cli_with_context<C, F>(self, f: F) -> CliResult<T>
    where
        C: fmt::Display,
        F: FnOnce() -> C,
    {
        self.ok_or_else(|| CoreError::OperationFailed(f().to_string()))
    }
}

// Configuration problems keep their variant so callers can still match on them.
fn with_context(context: impl fmt::Display, err: CoreError) -> CoreError {
    match err {
        CoreError::Config(msg) => CoreError::Config(format!("{}: {}", context, msg)),
        other => CoreError::OperationFailed(format!("{}: {}", context, other)),
    }
}

/// Suggestion printed under an error, if one fits.
pub fn suggestion_for(err: &CoreError) -> Option<&'static str> {
    match err {
        CoreError::DependencyNotFound(_) => {
            Some("Install ffmpeg (with ffprobe) and make sure both are on your PATH")
        }
        CoreError::NoFilesFound(_) => {
            Some("Supported extensions: .mp4, .mkv, .mov, .avi, .webm")
        }
        CoreError::Config(_) => Some("Check the command-line flags and the --config file"),
        _ => None,
    }
}
