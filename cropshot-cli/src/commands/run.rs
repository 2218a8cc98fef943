// ============================================================================
// cropshot-cli/src/commands/run.rs
// ============================================================================
//
// RUN COMMAND: Batch crop, frame extraction and de-duplication
//
// Settings are layered as: built-in defaults, then the --config JSON file,
// then CROPSHOT_* environment variables, then command-line flags.

use crate::cli::RunArgs;
use crate::error::{CliErrorContext, CliResult};
use crate::logging::init_logging;

use cropshot_core::file_logging::{log_batch_summary, log_run_configuration};
use cropshot_core::{
    BatchSummary, CoreConfig, CoreConfigBuilder, CoreError, FfprobeClient, SidecarSpawner,
    check_dependency, format_elapsed, run_batch, terminal,
};

use std::path::Path;
use std::time::{Duration, Instant};

/// Directory name for intermediates when neither the flags nor the config file name one.
const DEFAULT_INTERMEDIATE_SUBDIR: &str = ".intermediate";
const DEFAULT_LOG_SUBDIR: &str = "logs";

/// Resolves the effective configuration for a run.
pub fn build_config(args: &RunArgs) -> CliResult<CoreConfig> {
    let mut config = match &args.config {
        Some(path) => CoreConfig::from_json_file(path)
            .cli_with_context(|| format!("Loading {}", path.display()))?,
        None => CoreConfig::default(),
    };
    config.apply_env_overrides();

    let defaults = CoreConfig::default();
    let intermediate_dir = match &args.intermediate_dir {
        Some(dir) => dir.clone(),
        None if config.intermediate_dir == defaults.intermediate_dir => {
            args.output_dir.join(DEFAULT_INTERMEDIATE_SUBDIR)
        }
        None => config.intermediate_dir.clone(),
    };
    let log_dir = match &args.log_dir {
        Some(dir) => dir.clone(),
        None if config.log_dir == defaults.log_dir => args.output_dir.join(DEFAULT_LOG_SUBDIR),
        None => config.log_dir.clone(),
    };

    let mut builder = CoreConfigBuilder::from_config(config)
        .input_dir(args.input_dir.clone())
        .output_dir(args.output_dir.clone())
        .intermediate_dir(intermediate_dir)
        .log_dir(log_dir);

    if let Some(v) = args.workers {
        builder = builder.workers(v);
    }
    if let Some(v) = args.sample_fps {
        builder = builder.sample_fps(v);
    }
    if let Some(v) = args.crop_probes {
        builder = builder.crop_probes(v);
    }
    if let Some(v) = args.probe_secs {
        builder = builder.probe_secs(v);
    }
    if let Some(v) = args.safe_margin {
        builder = builder.safe_margin(v);
    }
    if let Some(v) = args.min_crop_ratio {
        builder = builder.min_crop_ratio(v);
    }
    if let Some(v) = args.downscale {
        builder = builder.downscale(v);
    }
    if let Some(v) = args.edge_threshold {
        builder = builder.edge_threshold(v);
    }
    if let Some(v) = args.line_tolerance {
        builder = builder.line_tolerance(v);
    }
    if let Some(v) = args.min_frames {
        builder = builder.min_frames(v);
    }
    if let Some(v) = args.scene_threshold {
        builder = builder.scene_threshold(v);
    }
    if let Some(v) = &args.nvenc_preset {
        builder = builder.nvenc_preset(v);
    }
    if let Some(v) = args.nvenc_cq {
        builder = builder.nvenc_cq(v);
    }
    // Flags can only switch these on (or dedup off); absent flags keep the lower layers.
    if args.delete_intermediate {
        builder = builder.delete_intermediate(true);
    }
    if args.no_dedup {
        builder = builder.deduplicate(false);
    }

    let config = builder.build();
    config.validate()?;
    Ok(config)
}

fn require_directory(path: &Path, what: &str) -> CliResult<()> {
    if path.is_dir() {
        Ok(())
    } else {
        Err(CoreError::PathError(format!(
            "{} '{}' is not a directory",
            what,
            path.display()
        )))
    }
}

/// Checks that ffmpeg and ffprobe can be launched.
pub fn check_tools() -> CliResult<()> {
    check_dependency("ffmpeg")?;
    check_dependency("ffprobe")?;
    Ok(())
}

/// Executes the `run` command.
pub fn run_run(args: RunArgs, verbose: bool) -> CliResult<BatchSummary> {
    require_directory(&args.input_dir, "Input directory")?;
    let config = build_config(&args)?;

    let log_dir = (!args.no_log).then_some(config.log_dir.as_path());
    let log_file = init_logging(log_dir, verbose)?;

    terminal::print_section("Cropshot");
    terminal::print_status("Input", &config.input_dir.display().to_string());
    terminal::print_status("Output", &config.output_dir.display().to_string());
    if let Some(path) = &log_file {
        terminal::print_status("Log file", &path.display().to_string());
    }

    check_tools()?;
    log_run_configuration(&config);

    let start = Instant::now();
    let summary = run_batch(&SidecarSpawner, &FfprobeClient::new(), &config)
        .cli_with_context(|| format!("Processing {}", config.input_dir.display()))?;
    log_batch_summary(&summary);
    print_summary(&summary, start.elapsed());

    Ok(summary)
}

fn print_summary(summary: &BatchSummary, elapsed: Duration) {
    terminal::print_section("Summary");
    for (status, count) in summary.status_counts() {
        terminal::print_status(&status, &count.to_string());
    }
    if !summary.skipped.is_empty() {
        terminal::print_status("skipped", &summary.skipped.len().to_string());
    }
    terminal::print_status("Frames", &summary.total_frames().to_string());
    terminal::print_status("Duplicates", &summary.total_duplicates().to_string());

    let failures: Vec<_> = summary.frames.iter().filter(|f| f.error.is_some()).collect();
    for failed in &failures {
        terminal::print_warning(&format!(
            "No frames from {}: {}",
            failed.video.display(),
            failed.error.as_deref().unwrap_or_default()
        ));
    }
    terminal::print_success(&format!("Finished in {}", format_elapsed(elapsed)));
}
