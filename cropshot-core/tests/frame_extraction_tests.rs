// cropshot-core/tests/frame_extraction_tests.rs

use cropshot_core::config::CoreConfigBuilder;
use cropshot_core::external::mocks::{MockFfmpegSpawner, MockMediaProbe, descriptor};
use cropshot_core::processing::frames::extract_frames;
use ffmpeg_sidecar::event::{FfmpegEvent, OutputVideoFrame};
use image::{Rgb, RgbImage};
use std::io;
use std::path::{Path, PathBuf};
use tempfile::tempdir;

/// Horizontal ramp with alternating row offsets, so no row or column is uniform.
fn ramp(width: u32, height: u32, rising: bool) -> RgbImage {
    RgbImage::from_fn(width, height, |x, y| {
        let v = (x * 3 + (y % 2) * 20) as u8;
        let v = if rising { v } else { 255 - v };
        Rgb([v, v / 2, 255 - v])
    })
}

/// Same picture inside 6-pixel black borders.
fn boxed(width: u32, height: u32) -> RgbImage {
    let inner = ramp(width - 12, height - 12, true);
    RgbImage::from_fn(width, height, |x, y| {
        if x < 6 || y < 6 || x >= width - 6 || y >= height - 6 {
            Rgb([0, 0, 0])
        } else {
            *inner.get_pixel(x - 6, y - 6)
        }
    })
}

/// Black 10-pixel frame around a faint, nearly flat centre.
fn bordered_faint(width: u32, height: u32) -> RgbImage {
    RgbImage::from_fn(width, height, |x, y| {
        if x < 10 || y < 10 || x >= width - 10 || y >= height - 10 {
            Rgb([0, 0, 0])
        } else {
            Rgb([120 + (x % 2) as u8, 120, 120])
        }
    })
}

fn seek_positions(spawner: &MockFfmpegSpawner) -> Vec<String> {
    spawner
        .get_received_calls()
        .iter()
        .filter_map(|call| {
            let pos = call.iter().position(|a| a == "-ss")?;
            Some(call[pos + 1].clone())
        })
        .collect()
}

fn frame_event(img: &RgbImage) -> FfmpegEvent {
    FfmpegEvent::OutputFrame(OutputVideoFrame {
        width: img.width(),
        height: img.height(),
        pix_fmt: "rgb24".to_string(),
        output_index: 0,
        data: img.as_raw().clone(),
        frame_num: 0,
        timestamp: 0.0,
    })
}

/// Hook for the scene command: writes `images` as 1.png, 2.png, ...
fn write_scene_images(images: Vec<RgbImage>) -> impl Fn(&[String]) -> io::Result<()> {
    move |args: &[String]| {
        let pattern = args
            .iter()
            .find(|a| a.ends_with("%d.png"))
            .ok_or_else(|| io::Error::other("no output pattern"))?;
        let dir = Path::new(pattern)
            .parent()
            .ok_or_else(|| io::Error::other("pattern has no parent"))?;
        for (i, img) in images.iter().enumerate() {
            img.save(dir.join(format!("{}.png", i + 1)))
                .map_err(io::Error::other)?;
        }
        Ok(())
    }
}

fn png_names(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}

#[test]
fn test_scene_frames_are_trimmed_and_numbered() -> Result<(), Box<dyn std::error::Error>> {
    let work = tempdir()?;
    let video = work.path().join("clip.mp4");
    let out_dir = work.path().join("frames").join("clip");

    let probe = MockMediaProbe::new();
    probe.add_video(descriptor(&video, 64, 48, "h264"));

    let spawner = MockFfmpegSpawner::new();
    spawner.add_hook_expectation(
        "select=",
        vec![],
        write_scene_images(vec![boxed(64, 48), ramp(64, 48, false), ramp(64, 48, true)]),
    );

    let config = CoreConfigBuilder::new()
        .temp_dir(work.path().to_path_buf())
        .min_frames(3)
        .build();
    let written = extract_frames(&spawner, &probe, &video, &out_dir, &config)?;

    assert_eq!(written, 3);
    // Scene image n sits at n / 25 fps seconds.
    assert_eq!(
        png_names(&out_dir),
        vec!["1_0.04.png", "2_0.08.png", "3_0.12.png"]
    );
    let first = image::open(out_dir.join("1_0.04.png"))?.to_rgb8();
    assert_eq!(first.dimensions(), (52, 36));

    let scene_call = &spawner.get_received_calls()[0];
    assert!(scene_call.iter().any(|a| a == "select='gt(scene\\,0.12)'"));
    Ok(())
}

#[test]
fn test_static_shot_falls_back_to_uniform_sampling() -> Result<(), Box<dyn std::error::Error>> {
    let work = tempdir()?;
    let video = work.path().join("static.mp4");
    let out_dir = work.path().join("static");

    // 10 s at 25 fps
    let probe = MockMediaProbe::new();
    let mut desc = descriptor(&video, 64, 48, "h264");
    desc.duration_seconds = Some(10.0);
    desc.frame_count = Some(250);
    probe.add_video(desc);

    let spawner = MockFfmpegSpawner::new();
    // The only scene cut is a solid frame and gets rejected.
    spawner.add_hook_expectation(
        "select=",
        vec![],
        write_scene_images(vec![RgbImage::from_pixel(64, 48, Rgb([12, 12, 12]))]),
    );
    for i in 0..4 {
        spawner.add_success_expectation(
            "rawvideo",
            vec![frame_event(&ramp(64, 48, i % 2 == 0))],
            false,
        );
    }

    let config = CoreConfigBuilder::new()
        .temp_dir(work.path().to_path_buf())
        .min_frames(4)
        .build();
    let written = extract_frames(&spawner, &probe, &video, &out_dir, &config)?;

    assert_eq!(written, 4);
    // step = 250 / 5 = 50 frames = 2 s
    assert_eq!(
        png_names(&out_dir),
        vec!["1_0.00.png", "2_2.00.png", "3_4.00.png", "4_6.00.png"]
    );
    assert_eq!(seek_positions(&spawner), vec!["0.000", "2.000", "4.000", "6.000"]);
    Ok(())
}

#[test]
fn test_fallback_counts_only_frames_that_survive_trimming() -> Result<(), Box<dyn std::error::Error>>
{
    let work = tempdir()?;
    let video = work.path().join("dark.mp4");
    let out_dir = work.path().join("dark");

    let probe = MockMediaProbe::new();
    let mut desc = descriptor(&video, 64, 48, "h264");
    desc.frame_count = Some(250);
    probe.add_video(desc);

    let spawner = MockFfmpegSpawner::new();
    spawner.add_hook_expectation("select=", vec![], write_scene_images(vec![]));
    for _ in 0..4 {
        spawner.add_success_expectation("rawvideo", vec![frame_event(&bordered_faint(64, 48))], false);
    }
    for i in 0..4 {
        spawner.add_success_expectation(
            "rawvideo",
            vec![frame_event(&ramp(64, 48, i % 2 == 0))],
            false,
        );
    }

    let config = CoreConfigBuilder::new()
        .temp_dir(work.path().to_path_buf())
        .min_frames(4)
        .build();
    let written = extract_frames(&spawner, &probe, &video, &out_dir, &config)?;

    assert_eq!(written, 4);
    assert_eq!(spawner.pending_expectations(), 0);
    // First round: 0, 50, 100, 150 rejected, 200 kept. Second round shifts by 12 frames.
    assert_eq!(
        seek_positions(&spawner),
        vec!["0.000", "2.000", "4.000", "6.000", "8.000", "0.480", "2.480", "4.480"]
    );
    assert_eq!(
        png_names(&out_dir),
        vec!["1_0.48.png", "2_2.48.png", "3_4.48.png", "4_8.00.png"]
    );
    Ok(())
}

#[test]
fn test_fallback_never_revisits_a_position() -> Result<(), Box<dyn std::error::Error>> {
    let work = tempdir()?;
    let video = work.path().join("tiny.mp4");
    let out_dir = work.path().join("tiny");

    // Ten frames: the grid of five positions is exhausted after one round.
    let probe = MockMediaProbe::new();
    let mut desc = descriptor(&video, 64, 48, "h264");
    desc.frame_count = Some(10);
    probe.add_video(desc);

    let spawner = MockFfmpegSpawner::new();
    spawner.add_hook_expectation("select=", vec![], write_scene_images(vec![]));
    for _ in 0..7 {
        spawner.add_success_expectation("rawvideo", vec![frame_event(&bordered_faint(64, 48))], false);
    }
    spawner.add_success_expectation("rawvideo", vec![frame_event(&ramp(64, 48, true))], false);
    for _ in 0..2 {
        spawner.add_success_expectation("rawvideo", vec![frame_event(&bordered_faint(64, 48))], false);
    }

    let config = CoreConfigBuilder::new()
        .temp_dir(work.path().to_path_buf())
        .min_frames(4)
        .build();
    let written = extract_frames(&spawner, &probe, &video, &out_dir, &config)?;

    let seeks = seek_positions(&spawner);
    let mut unique = seeks.clone();
    unique.sort();
    unique.dedup();
    assert_eq!(unique.len(), seeks.len(), "repeated seek in {seeks:?}");
    assert_eq!(seeks.len(), 10);
    assert_eq!(written, 1);
    assert_eq!(png_names(&out_dir), vec!["1_0.20.png"]);
    Ok(())
}

#[test]
fn test_fallback_stops_when_seeking_fails() -> Result<(), Box<dyn std::error::Error>> {
    let work = tempdir()?;
    let video = work.path().join("short.mp4");
    let out_dir = work.path().join("short");

    let probe = MockMediaProbe::new();
    probe.add_video(descriptor(&video, 64, 48, "h264"));

    let spawner = MockFfmpegSpawner::new();
    spawner.add_hook_expectation("select=", vec![], write_scene_images(vec![]));
    spawner.add_success_expectation("rawvideo", vec![frame_event(&ramp(64, 48, true))], false);
    spawner.add_exit_error_expectation("rawvideo", vec![], 1);

    let config = CoreConfigBuilder::new()
        .temp_dir(work.path().to_path_buf())
        .min_frames(4)
        .build();
    let written = extract_frames(&spawner, &probe, &video, &out_dir, &config)?;

    assert_eq!(written, 1);
    assert_eq!(spawner.get_received_calls().len(), 3);
    Ok(())
}

#[test]
fn test_unknown_length_skips_fallback() -> Result<(), Box<dyn std::error::Error>> {
    let work = tempdir()?;
    let video = work.path().join("mystery.mp4");
    let out_dir = work.path().join("mystery");

    let probe = MockMediaProbe::new();
    let spawner = MockFfmpegSpawner::new();
    spawner.add_hook_expectation("select=", vec![], write_scene_images(vec![ramp(64, 48, true)]));

    let config = CoreConfigBuilder::new()
        .temp_dir(work.path().to_path_buf())
        .min_frames(4)
        .build();
    let written = extract_frames(&spawner, &probe, &video, &out_dir, &config)?;

    assert_eq!(written, 1);
    assert_eq!(spawner.get_received_calls().len(), 1);
    Ok(())
}

#[test]
fn test_scene_command_failure_is_an_error() {
    let work = tempdir().unwrap();
    let video: PathBuf = work.path().join("broken.mp4");
    let probe = MockMediaProbe::new();
    let spawner = MockFfmpegSpawner::new();
    spawner.add_exit_error_expectation("select=", vec![], 1);

    let config = CoreConfigBuilder::new()
        .temp_dir(work.path().to_path_buf())
        .build();
    let result = extract_frames(&spawner, &probe, &video, &work.path().join("out"), &config);
    assert!(result.is_err());
}
