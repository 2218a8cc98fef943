// cropshot-cli/src/commands/detect.rs
//
// DETECT COMMAND: crop detection for a single file, without transcoding.

use crate::cli::DetectArgs;
use crate::commands::run::check_tools;
use crate::error::{CliErrorContext, CliResult};
use crate::logging::init_logging;

use cropshot_core::external::probe_dimensions;
use cropshot_core::{
    CoreConfig, CoreError, CropDecision, FfprobeClient, SidecarSpawner, detect_crop, terminal,
};

/// Line printed on stdout for a detection result.
pub fn format_decision(decision: Option<&CropDecision>) -> String {
    match decision {
        Some(d) => format!("{} {}", d.rect, d.strategy),
        None => "no crop".to_string(),
    }
}

/// Executes the `detect` command and returns the accepted crop, if any.
pub fn run_detect(args: DetectArgs, verbose: bool) -> CliResult<Option<CropDecision>> {
    if !args.file.is_file() {
        return Err(CoreError::PathError(format!(
            "'{}' is not a file",
            args.file.display()
        )));
    }
    let mut config = match &args.config {
        Some(path) => CoreConfig::from_json_file(path)
            .cli_with_context(|| format!("Loading {}", path.display()))?,
        None => CoreConfig::default(),
    };
    config.apply_env_overrides();
    config.validate()?;

    init_logging(None, verbose)?;
    check_tools()?;

    let probe = FfprobeClient::new();
    let (width, height) = probe_dimensions(&probe, &args.file)
        .cli_with_context(|| format!("Could not read the dimensions of {}", args.file.display()))?;
    terminal::print_status("Dimensions", &format!("{}x{}", width, height));

    let decision = detect_crop(&SidecarSpawner, &probe, &args.file, width, height, &config);
    if let Some(d) = &decision {
        terminal::print_status("Crop", &d.rect.to_string());
        terminal::print_status("Strategy", &d.strategy.to_string());
    }
    println!("{}", format_decision(decision.as_ref()));
    Ok(decision)
}

#[cfg(test)]
mod tests {
    use super::*;
    use cropshot_core::{CropRectangle, DetectionStrategy};

    #[test]
    fn decision_line() {
        let decision = CropDecision {
            rect: CropRectangle::new(0, 76, 1280, 568).unwrap(),
            strategy: DetectionStrategy::Gradient,
        };
        assert_eq!(format_decision(Some(&decision)), "1280:568:0:76 gradient");
        assert_eq!(format_decision(None), "no crop");
    }
}
