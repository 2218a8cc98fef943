// cropshot-core/src/external/mocks.rs

// --- Mocking Infrastructure (for testing) ---
//
// Thread-safe stand-ins for the ffmpeg spawner and the media probe, so the
// detectors and the orchestrator can be driven without ffmpeg installed.

use super::ffmpeg_executor::{FfmpegProcess, FfmpegSpawner};
use super::probe_executor::{MediaProbe, VideoDescriptor};
use crate::error::{CoreError, CoreResult, command_start_error};
use ffmpeg_sidecar::command::FfmpegCommand;
use ffmpeg_sidecar::event::FfmpegEvent;
use std::collections::{HashMap, HashSet};
use std::io;
use std::path::{Path, PathBuf};
use std::process::ExitStatus;
use std::sync::{Arc, Mutex, MutexGuard};

/// In-memory codec engine for the hardware pipeline.
pub use crate::pipeline::tracing::{OutputRecord, TracingEngine};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Builds an `ExitStatus` carrying the given exit code.
pub fn exit_status(code: i32) -> ExitStatus {
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        ExitStatus::from_raw(code << 8)
    }
    #[cfg(windows)]
    {
        use std::os::windows::process::ExitStatusExt;
        ExitStatus::from_raw(code as u32)
    }
}

/// Mock implementation of FfmpegProcess.
#[derive(Clone)]
pub struct MockFfmpegProcess {
    /// Events to emit when handle_events is called.
    pub events_to_emit: Vec<FfmpegEvent>,
    /// Exit status to return when wait is called.
    pub exit_status: ExitStatus,
}

impl FfmpegProcess for MockFfmpegProcess {
    fn handle_events<F>(&mut self, mut handler: F) -> CoreResult<()>
    where
        F: FnMut(FfmpegEvent) -> CoreResult<()>,
    {
        for event in self.events_to_emit.drain(..) {
            handler(event)?;
        }
        Ok(())
    }

    fn wait(&mut self) -> CoreResult<ExitStatus> {
        Ok(self.exit_status)
    }
}

/// Side effect run when an expectation is matched, given the command args.
pub type SpawnHook = Arc<dyn Fn(&[String]) -> io::Result<()> + Send + Sync>;

/// What the mock does to the filesystem when it "runs" a command.
#[derive(Clone, Default)]
pub enum MockOutput {
    #[default]
    Nothing,
    /// Creates an empty file at the last argument.
    DummyFile,
    Hook(SpawnHook),
}

/// Represents an expected ffmpeg command call and its mock result.
pub struct MockFfmpegExpectation {
    pub arg_pattern: String,
    pub result: CoreResult<MockFfmpegProcess>,
    pub output: MockOutput,
}

/// Mock implementation of FfmpegSpawner supporting multiple expectations.
///
/// Each spawned command consumes the first expectation whose pattern is a
/// substring of any argument. A command with no matching expectation fails
/// to spawn.
#[derive(Clone, Default)]
pub struct MockFfmpegSpawner {
    expectations: Arc<Mutex<Vec<MockFfmpegExpectation>>>,
    received_calls: Arc<Mutex<Vec<Vec<String>>>>,
}

impl MockFfmpegSpawner {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn add_expectation(
        &self,
        arg_pattern: &str,
        result: CoreResult<MockFfmpegProcess>,
        output: MockOutput,
    ) {
        lock(&self.expectations).push(MockFfmpegExpectation {
            arg_pattern: arg_pattern.to_string(),
            result,
            output,
        });
    }

    pub fn add_success_expectation(
        &self,
        arg_pattern: &str,
        events: Vec<FfmpegEvent>,
        create_dummy_output: bool,
    ) {
        let output = if create_dummy_output {
            MockOutput::DummyFile
        } else {
            MockOutput::Nothing
        };
        self.add_expectation(arg_pattern, Ok(process(events, 0)), output);
    }

    /// Succeeds and runs `hook` with the command arguments.
    pub fn add_hook_expectation<H>(&self, arg_pattern: &str, events: Vec<FfmpegEvent>, hook: H)
    where
        H: Fn(&[String]) -> io::Result<()> + Send + Sync + 'static,
    {
        self.add_expectation(
            arg_pattern,
            Ok(process(events, 0)),
            MockOutput::Hook(Arc::new(hook)),
        );
    }

    pub fn add_spawn_error_expectation(&self, arg_pattern: &str, error: CoreError) {
        self.add_expectation(arg_pattern, Err(error), MockOutput::Nothing);
    }

    pub fn add_exit_error_expectation(
        &self,
        arg_pattern: &str,
        events: Vec<FfmpegEvent>,
        exit_code: i32,
    ) {
        self.add_expectation(arg_pattern, Ok(process(events, exit_code)), MockOutput::Nothing);
    }

    pub fn get_received_calls(&self) -> Vec<Vec<String>> {
        lock(&self.received_calls).clone()
    }

    /// Number of expectations not yet consumed.
    pub fn pending_expectations(&self) -> usize {
        lock(&self.expectations).len()
    }
}

fn process(events: Vec<FfmpegEvent>, exit_code: i32) -> MockFfmpegProcess {
    MockFfmpegProcess {
        events_to_emit: events,
        exit_status: exit_status(exit_code),
    }
}

impl FfmpegSpawner for MockFfmpegSpawner {
    type Process = MockFfmpegProcess;

    fn spawn(&self, cmd: FfmpegCommand) -> CoreResult<Self::Process> {
        let args: Vec<String> = cmd
            .get_args()
            .map(|s| s.to_string_lossy().into_owned())
            .collect();
        lock(&self.received_calls).push(args.clone());

        let expectation = {
            let mut expectations = lock(&self.expectations);
            let found = expectations
                .iter()
                .position(|exp| args.iter().any(|arg| arg.contains(&exp.arg_pattern)));
            found.map(|index| expectations.remove(index))
        };

        let Some(expectation) = expectation else {
            log::error!("MockFfmpegSpawner: No expectation found for command args: {:?}", args);
            return Err(command_start_error(
                "ffmpeg (mock)",
                io::Error::new(io::ErrorKind::NotFound, "no matching mock expectation"),
            ));
        };
        log::debug!(
            "MockFfmpegSpawner: Matched expectation with pattern '{}'",
            expectation.arg_pattern
        );

        let process = expectation.result?;
        match expectation.output {
            MockOutput::Nothing => {}
            MockOutput::DummyFile => {
                if let Some(output_path) = args.last().filter(|a| a.as_str() != "-") {
                    let output_path = PathBuf::from(output_path);
                    if let Some(parent) = output_path.parent() {
                        std::fs::create_dir_all(parent)?;
                    }
                    std::fs::File::create(&output_path)?;
                }
            }
            MockOutput::Hook(hook) => hook(&args)?,
        }
        Ok(process)
    }
}

/// Mock implementation of MediaProbe.
#[derive(Clone, Default)]
pub struct MockMediaProbe {
    values: Arc<Mutex<HashMap<(PathBuf, String), String>>>,
    filters: Arc<Mutex<HashSet<String>>>,
    descriptors: Arc<Mutex<HashMap<PathBuf, VideoDescriptor>>>,
    queries: Arc<Mutex<Vec<(PathBuf, String)>>>,
}

impl MockMediaProbe {
    pub fn new() -> Self {
        Default::default()
    }

    /// Sets the answer for `probe_value(path, key)`.
    pub fn set_value(&self, path: &Path, key: &str, value: &str) {
        lock(&self.values).insert((path.to_path_buf(), key.to_string()), value.to_string());
    }

    /// Registers a video, answering the usual keys and `describe`.
    pub fn add_video(&self, descriptor: VideoDescriptor) {
        let path = descriptor.path.clone();
        self.set_value(
            &path,
            "width,height",
            &format!("{},{}", descriptor.width, descriptor.height),
        );
        self.set_value(&path, "width", &descriptor.width.to_string());
        self.set_value(&path, "height", &descriptor.height.to_string());
        self.set_value(&path, "codec_name", &descriptor.codec_id);
        if let Some(duration) = descriptor.duration_seconds {
            self.set_value(&path, "duration", &duration.to_string());
        }
        if let Some(fps) = descriptor.fps {
            self.set_value(&path, "avg_frame_rate", &fps.to_string());
        }
        if let Some(frames) = descriptor.frame_count {
            self.set_value(&path, "nb_frames", &frames.to_string());
        }
        lock(&self.descriptors).insert(path, descriptor);
    }

    pub fn add_filter(&self, name: &str) {
        lock(&self.filters).insert(name.to_string());
    }

    /// Every `(path, key)` passed to `probe_value`, in order.
    pub fn get_queries(&self) -> Vec<(PathBuf, String)> {
        lock(&self.queries).clone()
    }
}

impl MediaProbe for MockMediaProbe {
    fn probe_value(&self, path: &Path, key: &str) -> Option<String> {
        lock(&self.queries).push((path.to_path_buf(), key.to_string()));
        lock(&self.values)
            .get(&(path.to_path_buf(), key.to_string()))
            .cloned()
    }

    fn has_filter(&self, name: &str) -> bool {
        lock(&self.filters).contains(name)
    }

    fn describe(&self, path: &Path) -> CoreResult<VideoDescriptor> {
        lock(&self.descriptors).get(path).cloned().ok_or_else(|| {
            CoreError::VideoInfoError(format!("MockMediaProbe: unknown video {}", path.display()))
        })
    }
}

/// Convenience descriptor for tests.
pub fn descriptor(path: &Path, width: u32, height: u32, codec: &str) -> VideoDescriptor {
    VideoDescriptor {
        path: path.to_path_buf(),
        width,
        height,
        codec_id: codec.to_string(),
        duration_seconds: Some(60.0),
        fps: Some(25.0),
        frame_count: Some(1500),
    }
}
