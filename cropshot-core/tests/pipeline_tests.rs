// cropshot-core/tests/pipeline_tests.rs
//
// Drives the decode -> crop -> encode state machine against the in-memory
// tracing engine.

use cropshot_core::config::CoreConfig;
use cropshot_core::error::CoreError;
use cropshot_core::external::mocks::TracingEngine;
use cropshot_core::pipeline::{
    Packet, PipelineJob, PipelineState, PixelFormat, Rational, StreamInfo, run_pipeline,
};
use cropshot_core::processing::CropRectangle;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::path::Path;

fn crop() -> CropRectangle {
    CropRectangle::new(0, 140, 1920, 800).unwrap()
}

fn run(engine: &mut TracingEngine) -> Result<cropshot_core::pipeline::PipelineStats, CoreError> {
    run_pipeline(
        engine,
        Path::new("/videos/in.mkv"),
        Path::new("/videos/out.mp4"),
        crop(),
        &CoreConfig::default(),
    )
}

fn output_pts(engine: &TracingEngine) -> Vec<Option<i64>> {
    engine.outputs()[0].packets.iter().map(|p| p.pts).collect()
}

#[test]
fn test_successful_job_releases_every_reference() {
    let mut engine = TracingEngine::new(5);
    let ledger = engine.shared_ledger();

    let stats = run(&mut engine).unwrap();

    assert_eq!(stats.packets_read, 10);
    assert_eq!(stats.video_packets, 5);
    assert_eq!(stats.frames_decoded, 5);
    assert_eq!(stats.frames_filtered, 5);
    assert_eq!(stats.packets_written, 5);
    assert_eq!(ledger.outstanding(), 0);
    // device, decoder pool, encoder pool
    assert_eq!(ledger.freed(), 3);

    let outputs = engine.outputs();
    assert_eq!(outputs.len(), 1);
    assert!(outputs[0].finalized);
    assert_eq!(outputs[0].path, Path::new("/videos/out.mp4"));
    assert!(outputs[0].packets.iter().all(|p| p.stream_index == 0));
}

#[test]
fn test_flush_drains_each_stage_in_order() {
    let mut engine = TracingEngine::new(3);
    run(&mut engine).unwrap();

    let markers: Vec<&str> = engine
        .calls()
        .iter()
        .map(String::as_str)
        .filter(|c| c.ends_with("(null)") || *c == "finish_output")
        .collect();
    assert_eq!(
        markers,
        vec!["send_packet(null)", "push_frame(null)", "send_frame(null)", "finish_output"]
    );

    // Every encoded packet is written before the output is finalized.
    let calls = engine.calls();
    let finish = calls.iter().position(|c| c == "finish_output").unwrap();
    let last_write = calls.iter().rposition(|c| c == "write_packet").unwrap();
    assert!(last_write < finish);
}

#[test]
fn test_teardown_order_and_frees() {
    let mut engine = TracingEngine::new(2);
    let ledger = engine.shared_ledger();
    run(&mut engine).unwrap();

    assert_eq!(
        ledger.events(),
        vec![
            "teardown frames",
            "teardown graph",
            "teardown decoder pool",
            "free frames#2",
            "teardown decoder",
            "teardown encoder pool",
            "free frames#3",
            "teardown encoder",
            "free device#1",
            "teardown device",
            "teardown input",
            "teardown output",
        ]
    );
}

#[test]
fn test_encoder_failure_abandons_output() {
    let mut engine = TracingEngine::new(6).fail_on("send_frame", 3);
    let ledger = engine.shared_ledger();

    let err = run(&mut engine).unwrap_err();

    assert!(err.to_string().contains("injected failure in send_frame"), "{err}");
    assert_eq!(ledger.outstanding(), 0);
    assert_eq!(ledger.freed(), 3);
    let outputs = engine.outputs();
    assert_eq!(outputs.len(), 1);
    assert!(!outputs[0].finalized);
    assert!(engine.calls().iter().any(|c| c == "abandon_output"));
    assert!(!engine.calls().iter().any(|c| c == "send_packet(null)"));
}

#[test]
fn test_failed_job_stays_failed() {
    let mut engine = TracingEngine::new(4).fail_on("read_packet", 2);
    let config = CoreConfig::default();
    let mut job = PipelineJob::open(
        &mut engine,
        Path::new("in.mkv"),
        Path::new("out.mp4"),
        crop(),
        &config,
    )
    .unwrap();

    assert!(job.run().is_err());
    assert_eq!(job.state(), PipelineState::Failed);
    assert!(job.step().is_err());
}

#[test]
fn test_panic_in_engine_still_releases_references() {
    let mut engine = TracingEngine::new(4).panic_on("pull_frame", 2);
    let ledger = engine.shared_ledger();

    let result = catch_unwind(AssertUnwindSafe(|| run(&mut engine)));

    assert!(result.is_err());
    assert_eq!(ledger.outstanding(), 0);
    assert_eq!(ledger.freed(), 3);
    assert!(engine.calls().iter().any(|c| c == "abandon_output"));
    let teardown: Vec<String> = ledger
        .events()
        .into_iter()
        .filter(|e| e.starts_with("teardown"))
        .collect();
    assert_eq!(teardown.len(), 9);
}

#[test]
fn test_decoder_without_hardware_format_fails_to_open() {
    let mut engine =
        TracingEngine::new(2).with_offered_formats(vec![PixelFormat::Nv12, PixelFormat::Yuv420p]);
    let ledger = engine.shared_ledger();

    let err = run(&mut engine).unwrap_err();

    assert!(err.to_string().contains("no hardware format available"), "{err}");
    assert_eq!(ledger.outstanding(), 0);
    assert!(engine.outputs().is_empty());
    assert!(!engine.calls().iter().any(|c| c == "open_encoder"));
}

#[test]
fn test_unattached_pool_is_fatal() {
    let mut engine = TracingEngine::new(2).ignore_pool_attach();
    let ledger = engine.shared_ledger();

    let err = run(&mut engine).unwrap_err();

    assert!(
        matches!(err, CoreError::Pipeline { stage: "open", .. }),
        "unexpected error: {err}"
    );
    assert_eq!(ledger.outstanding(), 0);
}

#[test]
fn test_decoder_supplied_pool_is_reused() {
    let mut engine = TracingEngine::new(3).decoder_allocates_pool();
    run(&mut engine).unwrap();

    let allocs = engine.calls().iter().filter(|c| *c == "alloc_hw_frames").count();
    assert_eq!(allocs, 1, "only the encoder pool is allocated by the job");
    assert!(!engine.calls().iter().any(|c| c == "set_decoder_hw_frames"));
}

#[test]
fn test_missing_frame_contexts_are_repaired() {
    let mut engine = TracingEngine::new(4).strip_decoded_hw_context();
    let ledger = engine.shared_ledger();

    let stats = run(&mut engine).unwrap();

    // Decoded frames get the decoder pool, filtered frames the encoder pool.
    assert_eq!(stats.context_repairs, 8);
    assert_eq!(stats.packets_written, 4);
    assert_eq!(ledger.outstanding(), 0);
}

#[test]
fn test_filtered_frames_without_pts_take_the_source_pts() {
    let mut engine = TracingEngine::new(3).drop_filter_pts();
    let stats = run(&mut engine).unwrap();

    assert_eq!(stats.restored_pts, 3);
    assert_eq!(output_pts(&engine), vec![Some(0), Some(3600), Some(7200)]);
}

#[test]
fn test_buffering_graph_restores_pts_from_the_originating_frame() {
    let mut engine = TracingEngine::new(4).delay_filter_output().drop_filter_pts();
    let ledger = engine.shared_ledger();

    let stats = run(&mut engine).unwrap();

    assert_eq!(stats.restored_pts, 4);
    assert_eq!(stats.packets_written, 4);
    assert_eq!(
        output_pts(&engine),
        vec![Some(0), Some(3600), Some(7200), Some(10800)]
    );
    assert_eq!(ledger.outstanding(), 0);
}

#[test]
fn test_buffering_graph_keeps_source_pts() {
    let mut engine = TracingEngine::new(3).delay_filter_output();
    let stats = run(&mut engine).unwrap();

    assert_eq!(stats.restored_pts, 0);
    assert_eq!(stats.rewritten_pts, 0);
    assert_eq!(output_pts(&engine), vec![Some(0), Some(3600), Some(7200)]);
}

#[test]
fn test_decoded_pts_are_made_strictly_increasing() {
    let packets = [Some(0), Some(2), Some(2), None, Some(1), Some(7)]
        .into_iter()
        .map(|pts| Packet::new(0, pts))
        .collect();
    let mut engine = TracingEngine::new(0).with_packets(packets);

    let stats = run(&mut engine).unwrap();

    assert_eq!(stats.rewritten_pts, 3);
    assert_eq!(
        output_pts(&engine),
        vec![Some(0), Some(7200), Some(10800), Some(14400), Some(18000), Some(25200)]
    );
}

#[test]
fn test_packets_are_rescaled_to_the_output_timebase() {
    let mut engine = TracingEngine::new(3).with_output_time_base(Rational::new(1, 1000));
    run(&mut engine).unwrap();

    let packets = &engine.outputs()[0].packets;
    let pts: Vec<Option<i64>> = packets.iter().map(|p| p.pts).collect();
    assert_eq!(pts, vec![Some(0), Some(40), Some(80)]);
    assert!(packets.iter().all(|p| p.duration == 40 && p.dts == p.pts));
}

#[test]
fn test_codec_without_hardware_decoder_uses_software_path() {
    let stream = StreamInfo {
        index: 0,
        codec_id: "prores".to_string(),
        width: 1920,
        height: 1080,
        time_base: Some(Rational::new(1, 25)),
        sample_aspect: Some(Rational::new(1, 1)),
    };
    let mut engine = TracingEngine::new(3).with_stream(stream);
    let ledger = engine.shared_ledger();

    let stats = run(&mut engine).unwrap();

    assert_eq!(stats.packets_written, 3);
    assert!(!engine.calls().iter().any(|c| c == "set_decoder_hw_frames"));
    // device and encoder pool only
    assert_eq!(ledger.freed(), 2);
    assert_eq!(ledger.outstanding(), 0);
}

#[test]
fn test_crop_larger_than_decoded_frame_is_rejected() {
    let mut engine = TracingEngine::new(2);
    let ledger = engine.shared_ledger();

    let err = run_pipeline(
        &mut engine,
        Path::new("in.mkv"),
        Path::new("out.mp4"),
        CropRectangle::new(0, 8, 1920, 1080).unwrap(),
        &CoreConfig::default(),
    )
    .unwrap_err();

    assert!(matches!(err, CoreError::Config(_)), "unexpected error: {err}");
    assert_eq!(ledger.outstanding(), 0);
}

const ENGINE_OPS: [&str; 16] = [
    "open_input",
    "read_packet",
    "create_hw_device",
    "alloc_hw_frames",
    "open_decoder",
    "send_packet",
    "receive_frame",
    "build_graph",
    "push_frame",
    "pull_frame",
    "open_encoder",
    "send_frame",
    "receive_packet",
    "open_output",
    "write_packet",
    "finish_output",
];

#[test]
fn test_every_injected_fault_releases_every_reference() {
    let mut clean = TracingEngine::new(4);
    run(&mut clean).unwrap();

    for op in ENGINE_OPS {
        let calls = clean
            .calls()
            .iter()
            .filter(|c| c.as_str() == op || c.strip_suffix("(null)") == Some(op))
            .count();
        assert!(calls > 0, "{op} is never called");

        for nth in 1..=calls {
            let mut engine = TracingEngine::new(4).fail_on(op, nth);
            let ledger = engine.shared_ledger();
            assert!(run(&mut engine).is_err(), "failing {op} #{nth} did not fail the job");
            assert_eq!(ledger.outstanding(), 0, "references leaked after failing {op} #{nth}");

            let mut engine = TracingEngine::new(4).panic_on(op, nth);
            let ledger = engine.shared_ledger();
            let result = catch_unwind(AssertUnwindSafe(|| run(&mut engine)));
            assert!(result.is_err(), "panic in {op} #{nth} did not propagate");
            assert_eq!(ledger.outstanding(), 0, "references leaked after panic in {op} #{nth}");
        }
    }
}
