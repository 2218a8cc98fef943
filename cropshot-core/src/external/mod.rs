// ============================================================================
// cropshot-core/src/external/mod.rs
// ============================================================================
//
// EXTERNAL TOOLS: Interactions with ffmpeg and ffprobe
//
// This module wraps every external process cropshot launches. Consumers work
// against the FfmpegSpawner and MediaProbe traits, so detection, transcoding
// and extraction can be exercised with the mocks in `mocks` instead of a real
// codec engine.
//
// KEY COMPONENTS:
// - FfmpegSpawner / FfmpegProcess with the ffmpeg-sidecar implementation
// - MediaProbe with the ffprobe-backed implementation
// - Dependency checking

use crate::error::{CoreError, CoreResult};

use std::io;
use std::process::{Command, Stdio};

// ============================================================================
// SUBMODULES
// ============================================================================

/// Traits and implementations for executing ffmpeg commands
pub mod ffmpeg_executor;

/// Metadata queries (ffprobe CLI and crate)
pub mod probe_executor;

/// Mock spawner and probe used by the test suites
pub mod mocks;

// ============================================================================
// RE-EXPORTS
// ============================================================================

pub use ffmpeg_executor::{
    FfmpegProcess, FfmpegSpawner, SidecarProcess, SidecarSpawner, capture_frames,
    run_to_completion,
};
pub use probe_executor::{
    FfprobeClient, MediaProbe, VideoDescriptor, probe_codec, probe_dimensions, probe_duration,
    probe_fps, probe_frame_count,
};

// ============================================================================
// DEPENDENCY CHECKING
// ============================================================================

/// Checks if a required external command is available and executable.
///
/// Runs `<cmd_name> -version` and only looks at whether the process could be
/// started.
///
/// # Returns
///
/// * `Ok(())` - the command was found
/// * `Err(CoreError::DependencyNotFound)` - the command is not on the PATH
/// * `Err(CoreError::CommandStart)` - the command exists but failed to start
pub fn check_dependency(cmd_name: &str) -> CoreResult<()> {
    let result = Command::new(cmd_name)
        .arg("-version")
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status();

    match result {
        Ok(_) => {
            log::debug!("Found dependency: {}", cmd_name);
            Ok(())
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            log::warn!("Dependency '{}' not found.", cmd_name);
            Err(CoreError::DependencyNotFound(cmd_name.to_string()))
        }
        Err(e) => {
            log::error!("Failed to start dependency check command '{}': {}", cmd_name, e);
            Err(CoreError::CommandStart(cmd_name.to_string(), e))
        }
    }
}
