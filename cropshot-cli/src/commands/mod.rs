//! Command implementations for the CLI.

/// `cropshot run`: the three-phase batch over an input directory.
pub mod run;

/// `cropshot detect`: crop detection for one file.
pub mod detect;
