// cropshot-core/tests/crop_detection_tests.rs

use cropshot_core::config::CoreConfigBuilder;
use cropshot_core::error::CoreError;
use cropshot_core::external::mocks::{MockFfmpegSpawner, MockMediaProbe, descriptor};
use cropshot_core::processing::crop_detection::{
    CropRectangle, DetectionStrategy, detect_crop, detect_crop_ffmpeg, is_good_crop,
};
use cropshot_core::processing::gradient::detect_crop_gradient;
use ffmpeg_sidecar::event::{FfmpegEvent, LogLevel, OutputVideoFrame};
use image::{Rgb, RgbImage};
use std::path::Path;

fn cropdetect_line(crop: &str) -> FfmpegEvent {
    FfmpegEvent::Log(
        LogLevel::Info,
        format!("[Parsed_cropdetect_0 @ 0x55d1c] x1:0 x2:1279 y1:80 y2:639 w:1280 h:560 x:0 y:80 pts:250 t:10.000000 crop={crop}"),
    )
}

/// Checkerboard frame with `bar` black rows at top and bottom.
fn letterboxed(width: u32, height: u32, bar: u32) -> RgbImage {
    RgbImage::from_fn(width, height, |x, y| {
        if y < bar || y >= height - bar {
            Rgb([0, 0, 0])
        } else if ((x / 8) + (y / 8)) % 2 == 0 {
            Rgb([220, 220, 220])
        } else {
            Rgb([40, 40, 40])
        }
    })
}

fn frame_event(img: &RgbImage, frame_num: u32) -> FfmpegEvent {
    FfmpegEvent::OutputFrame(OutputVideoFrame {
        width: img.width(),
        height: img.height(),
        pix_fmt: "rgb24".to_string(),
        output_index: 0,
        data: img.as_raw().clone(),
        frame_num,
        timestamp: frame_num as f32 * 10.0,
    })
}

#[test]
fn test_letterbox_from_cropdetect_probes() {
    let src = Path::new("/videos/letterbox.mp4");
    let probe = MockMediaProbe::new();
    probe.add_video(descriptor(src, 1280, 720, "h264"));

    let spawner = MockFfmpegSpawner::new();
    for _ in 0..3 {
        spawner.add_success_expectation(
            "cropdetect=",
            vec![cropdetect_line("1280:560:0:80")],
            false,
        );
    }

    let config = CoreConfigBuilder::new().safe_margin(0).build();
    let decision = detect_crop(&spawner, &probe, src, 1280, 720, &config).expect("crop expected");

    assert_eq!(decision.strategy, DetectionStrategy::Ffmpeg);
    assert_eq!(decision.rect, CropRectangle::new(0, 80, 1280, 560).unwrap());

    // Probe windows at 15s, 30s and 45s of the 60s source.
    let calls = spawner.get_received_calls();
    assert_eq!(calls.len(), 3);
    for (call, start) in calls.iter().zip(["15.000", "30.000", "45.000"]) {
        let pos = call.iter().position(|a| a == "-ss").unwrap();
        assert_eq!(call[pos + 1], start);
        assert!(call.iter().any(|a| a == "cuda"));
    }
}

#[test]
fn test_letterbox_with_default_margin_is_clamped_to_frame() {
    let src = Path::new("/videos/letterbox.mp4");
    let probe = MockMediaProbe::new();
    probe.add_video(descriptor(src, 1280, 720, "h264"));

    let spawner = MockFfmpegSpawner::new();
    for _ in 0..3 {
        spawner.add_success_expectation(
            "cropdetect=",
            vec![cropdetect_line("1280:560:0:80")],
            false,
        );
    }

    let config = CoreConfigBuilder::new().build();
    let decision = detect_crop(&spawner, &probe, src, 1280, 720, &config).expect("crop expected");

    // 4px margin on every side; the widened columns fall back inside the frame.
    assert_eq!(decision.strategy, DetectionStrategy::Ffmpeg);
    assert_eq!(decision.rect, CropRectangle::new(0, 76, 1280, 568).unwrap());
    assert!(decision.rect.right() <= 1280 && decision.rect.bottom() <= 720);
    assert_eq!(decision.rect.height % 2, 0);
}

#[test]
fn test_probe_union_is_expanded_by_margin() {
    let src = Path::new("/videos/drifting.mkv");
    let probe = MockMediaProbe::new();
    probe.add_video(descriptor(src, 1280, 720, "hevc"));

    let spawner = MockFfmpegSpawner::new();
    spawner.add_success_expectation("cropdetect=", vec![cropdetect_line("1280:560:0:80")], false);
    spawner.add_success_expectation("cropdetect=", vec![cropdetect_line("1272:552:4:84")], false);
    // A failed window contributes nothing.
    spawner.add_exit_error_expectation("cropdetect=", vec![], 1);

    let config = CoreConfigBuilder::new().safe_margin(4).build();
    let rect = detect_crop_ffmpeg(&spawner, &probe, src, &config).unwrap();
    assert_eq!(rect, CropRectangle::new(0, 76, 1284, 568).unwrap());

    let clamped = rect.clamp_to(1280, 720).unwrap();
    assert_eq!(clamped, CropRectangle::new(0, 76, 1280, 568).unwrap());
}

#[test]
fn test_unknown_duration_skips_probes() {
    let src = Path::new("/videos/stream.ts.mp4");
    let probe = MockMediaProbe::new();
    probe.set_value(src, "width,height", "1280,720");

    let spawner = MockFfmpegSpawner::new();
    let config = CoreConfigBuilder::new().build();
    assert_eq!(detect_crop_ffmpeg(&spawner, &probe, src, &config), None);
    assert!(spawner.get_received_calls().is_empty());
}

#[test]
fn test_gradient_fallback_finds_letterbox() {
    let src = Path::new("/videos/dark_bars.mp4");
    let probe = MockMediaProbe::new();
    probe.add_video(descriptor(src, 1280, 720, "h264"));

    let spawner = MockFfmpegSpawner::new();
    // cropdetect sees the full frame, which is not a worthwhile crop.
    for _ in 0..3 {
        spawner.add_success_expectation("cropdetect=", vec![cropdetect_line("1280:720:0:0")], false);
    }
    let frames: Vec<FfmpegEvent> = (0..4)
        .map(|i| frame_event(&letterboxed(640, 360, 40), i))
        .collect();
    spawner.add_success_expectation("scale=640:360", frames, false);

    let config = CoreConfigBuilder::new().build();
    let decision = detect_crop(&spawner, &probe, src, 1280, 720, &config).expect("crop expected");

    assert_eq!(decision.strategy, DetectionStrategy::Gradient);
    let rect = decision.rect;
    assert!((76..=84).contains(&rect.y), "y = {}", rect.y);
    assert!((556..=564).contains(&rect.height), "h = {}", rect.height);
    assert!(rect.x <= 16, "x = {}", rect.x);
    assert!(rect.right() >= 1264, "right = {}", rect.right());
    assert_eq!(spawner.pending_expectations(), 0);
}

#[test]
fn test_borderless_video_needs_no_crop() {
    let src = Path::new("/videos/full.mp4");
    let probe = MockMediaProbe::new();
    probe.add_video(descriptor(src, 1280, 720, "h264"));

    let spawner = MockFfmpegSpawner::new();
    for _ in 0..3 {
        spawner.add_success_expectation("cropdetect=", vec![cropdetect_line("1280:720:0:0")], false);
    }
    let frames: Vec<FfmpegEvent> = (0..3)
        .map(|i| frame_event(&letterboxed(640, 360, 0), i))
        .collect();
    spawner.add_success_expectation("scale=640:360", frames, false);

    let config = CoreConfigBuilder::new().build();
    assert!(detect_crop(&spawner, &probe, src, 1280, 720, &config).is_none());
}

#[test]
fn test_gradient_sampling_failure_is_not_fatal() {
    let spawner = MockFfmpegSpawner::new();
    spawner.add_spawn_error_expectation(
        "rawvideo",
        CoreError::OperationFailed("no decoder".to_string()),
    );
    let config = CoreConfigBuilder::new().build();
    let rect = detect_crop_gradient(&spawner, Path::new("/videos/x.mp4"), 1280, 720, &config);
    assert_eq!(rect, None);
}

#[test]
fn test_detection_is_repeatable() {
    let run = || {
        let src = Path::new("/videos/again.mp4");
        let probe = MockMediaProbe::new();
        probe.add_video(descriptor(src, 1280, 720, "h264"));
        let spawner = MockFfmpegSpawner::new();
        for _ in 0..3 {
            spawner.add_success_expectation("cropdetect=", vec![cropdetect_line("1280:720:0:0")], false);
        }
        let frames: Vec<FfmpegEvent> = (0..2)
            .map(|i| frame_event(&letterboxed(640, 360, 40), i))
            .collect();
        spawner.add_success_expectation("scale=640:360", frames, false);
        detect_crop(&spawner, &probe, src, 1280, 720, &CoreConfigBuilder::new().build())
            .map(|d| d.rect)
    };
    assert_eq!(run(), run());
}

#[test]
fn test_good_crop_threshold_is_strict() {
    // A quarter of 720 is 180: a 540-row crop sits exactly at the limit.
    let at_limit = CropRectangle::new(0, 90, 1280, 540).unwrap();
    let below = CropRectangle::new(0, 90, 1280, 539).unwrap();
    assert!(!is_good_crop(&at_limit, 1280, 720, 0.25));
    assert!(is_good_crop(&below, 1280, 720, 0.25));
}
