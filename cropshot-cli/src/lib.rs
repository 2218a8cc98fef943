// cropshot-cli/src/lib.rs
//
// Library portion of the cropshot CLI: argument definitions and command logic.

pub mod cli;
pub mod commands;
pub mod error;
pub mod logging;

// Re-export items needed by the binary or integration tests
pub use cli::{Cli, Commands, DetectArgs, RunArgs};
pub use commands::detect::run_detect;
pub use commands::run::run_run;
