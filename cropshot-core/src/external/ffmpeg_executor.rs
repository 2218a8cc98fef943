// ============================================================================
// cropshot-core/src/external/ffmpeg_executor.rs
// ============================================================================
//
// FFMPEG EXECUTOR: FFmpeg Process Management and Abstraction
//
// Traits for spawning ffmpeg and consuming its event stream, the concrete
// implementation backed by ffmpeg-sidecar, and two helpers that cover the
// ways cropshot drives ffmpeg: run-to-completion (transcode, scene cuts) and
// raw frame capture (gradient sampling, fallback seeks).
//
// KEY COMPONENTS:
// - FfmpegProcess: Trait representing an active FFmpeg process
// - FfmpegSpawner: Trait for creating new FFmpeg processes
// - SidecarSpawner: Concrete implementation using ffmpeg-sidecar

use crate::error::{CoreResult, command_failed_error, command_start_error, command_wait_error};
use ffmpeg_sidecar::child::FfmpegChild as SidecarChild;
use ffmpeg_sidecar::command::FfmpegCommand;
use ffmpeg_sidecar::event::{FfmpegEvent, OutputVideoFrame};
use std::process::ExitStatus;

// --- FFmpeg Execution Abstraction ---

/// Trait representing an active ffmpeg process instance.
pub trait FfmpegProcess {
    /// Processes events from the running command using a provided handler closure.
    fn handle_events<F>(&mut self, handler: F) -> CoreResult<()>
    where
        F: FnMut(FfmpegEvent) -> CoreResult<()>;

    /// Waits for the command to complete and returns its exit status.
    fn wait(&mut self) -> CoreResult<ExitStatus>;
}

/// Trait representing something that can spawn an FfmpegProcess.
///
/// Spawners are shared by reference across the phase 1 workers.
pub trait FfmpegSpawner: Send + Sync {
    type Process: FfmpegProcess;
    /// Spawns the ffmpeg command, consuming the command object.
    fn spawn(&self, cmd: FfmpegCommand) -> CoreResult<Self::Process>;
}

// --- Concrete Implementation using ffmpeg-sidecar ---

/// Wrapper around `ffmpeg_sidecar::child::FfmpegChild` implementing `FfmpegProcess`.
pub struct SidecarProcess(SidecarChild);

impl FfmpegProcess for SidecarProcess {
    fn handle_events<F>(&mut self, mut handler: F) -> CoreResult<()>
    where
        F: FnMut(FfmpegEvent) -> CoreResult<()>,
    {
        let iterator = self.0.iter().map_err(|e| {
            log::error!("Failed to get ffmpeg event iterator: {}", e);
            command_failed_error(
                "ffmpeg (sidecar - get iter)",
                ExitStatus::default(),
                e.to_string(),
            )
        })?;
        for event in iterator {
            handler(event)?;
        }
        Ok(())
    }

    fn wait(&mut self) -> CoreResult<ExitStatus> {
        self.0
            .wait()
            .map_err(|e| command_wait_error("ffmpeg (sidecar)", e))
    }
}

/// Concrete implementation of `FfmpegSpawner` using `ffmpeg-sidecar`.
#[derive(Debug, Clone, Default)]
pub struct SidecarSpawner;

impl FfmpegSpawner for SidecarSpawner {
    type Process = SidecarProcess;

    fn spawn(&self, mut cmd: FfmpegCommand) -> CoreResult<Self::Process> {
        cmd.spawn()
            .map(SidecarProcess)
            .map_err(|e| command_start_error("ffmpeg (sidecar)", e))
    }
}

// --- Helpers ---

/// Collects every log line of a finished process, regardless of level.
fn log_line(event: &FfmpegEvent) -> Option<&str> {
    match event {
        FfmpegEvent::Log(_, line) | FfmpegEvent::Error(line) => Some(line.as_str()),
        _ => None,
    }
}

/// Runs `cmd` to completion and returns its log lines.
///
/// A nonzero exit becomes `CoreError::CommandFailed` carrying the error lines
/// ffmpeg printed.
pub fn run_to_completion<S: FfmpegSpawner>(
    spawner: &S,
    cmd: FfmpegCommand,
    label: &str,
) -> CoreResult<Vec<String>> {
    log::debug!("Running {}: {:?}", label, cmd);
    let mut process = spawner.spawn(cmd)?;

    let mut lines = Vec::new();
    let mut errors = Vec::new();
    process.handle_events(|event| {
        if let FfmpegEvent::Error(line) = &event {
            errors.push(line.clone());
        }
        if let Some(line) = log_line(&event) {
            lines.push(line.to_string());
        }
        Ok(())
    })?;

    let status = process.wait()?;
    if !status.success() {
        log::warn!("{} exited with {}", label, status);
        return Err(command_failed_error(label, status, errors.join("\n")));
    }
    Ok(lines)
}

/// Runs `cmd` and captures up to `limit` raw video frames from its stdout.
///
/// The command must write `-f rawvideo` to `-`. Frames beyond `limit` are
/// drained and dropped. A nonzero exit after at least one frame was captured
/// is only logged, because ffmpeg routinely complains about truncated input
/// at the tail of a file.
pub fn capture_frames<S: FfmpegSpawner>(
    spawner: &S,
    cmd: FfmpegCommand,
    label: &str,
    limit: usize,
) -> CoreResult<Vec<OutputVideoFrame>> {
    log::debug!("Running {}: {:?}", label, cmd);
    let mut process = spawner.spawn(cmd)?;

    let mut frames = Vec::new();
    let mut errors = Vec::new();
    process.handle_events(|event| {
        match event {
            FfmpegEvent::OutputFrame(frame) if frames.len() < limit => frames.push(frame),
            FfmpegEvent::Error(line) => errors.push(line),
            _ => {}
        }
        Ok(())
    })?;

    let status = process.wait()?;
    if !status.success() {
        if frames.is_empty() {
            return Err(command_failed_error(label, status, errors.join("\n")));
        }
        log::debug!(
            "{} exited with {} after {} frame(s); keeping them",
            label,
            status,
            frames.len()
        );
    }
    Ok(frames)
}
