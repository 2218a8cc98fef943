// cropshot-cli/src/main.rs
//
// Entry point of the `cropshot` binary: parses arguments, dispatches to the
// command implementations and maps failures to a non-zero exit code.

use clap::Parser;
use console::style;
use cropshot::error::suggestion_for;
use cropshot::{Cli, Commands, run_detect, run_run};
use std::process;

fn main() {
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Run(args) => run_run(args, cli.verbose).map(|summary| {
            log::debug!("Run finished with {} video(s)", summary.videos.len());
        }),
        Commands::Detect(args) => run_detect(args, cli.verbose).map(|_| ()),
    };

    if let Err(e) = result {
        // Logging may not be initialized yet, so errors go straight to stderr.
        eprintln!("{} {}", style("Error:").red().bold(), e);
        if let Some(suggestion) = suggestion_for(&e) {
            eprintln!("  {}", suggestion);
        }
        process::exit(1);
    }
}
