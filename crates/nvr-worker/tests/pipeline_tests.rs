//! End-to-end scenarios over the assembled pipeline.

mod common;

use std::sync::Arc;
use std::time::Duration;

use chrono::{TimeZone, Utc};
use nvr_models::{
    CodecParams, DetectionZone, EncodedPacket, ObjectFilter, ObjectFilterMode, RecordingState,
    ZonePoint,
};
use nvr_worker::{Clock, ManualClock, MonitorConfig, RecordingOptions, SystemClock, WorkerError};

use common::{build_pipeline, person, wait_until, write_model, write_segment};

fn options() -> RecordingOptions {
    RecordingOptions {
        pre_buffer_secs: 5,
        post_buffer_secs: 10,
        max_file_duration_secs: 300,
        codec: CodecParams::default(),
    }
}

#[test]
fn test_recording_lifecycle_with_pre_and_post_roll() {
    let clock = ManualClock::new(Utc.with_ymd_and_hms(2024, 6, 1, 8, 0, 0).unwrap());
    let t = build_pipeline(Arc::new(clock.clone()), vec![person()]);
    let p = &t.pipeline;

    p.enable_recording("driveway", options()).unwrap();

    // Five seconds of 10 fps video with a keyframe every second
    let mut pts = 0;
    let mut feed = |seconds: u32| {
        for _ in 0..seconds * 10 {
            let keyframe = pts % 1000 == 0;
            assert!(p
                .feed_packet("driveway", EncodedPacket::new(vec![7; 64], pts, keyframe))
                .unwrap());
            pts += 100;
        }
        clock.advance(Duration::from_secs(seconds as u64));
        p.tick();
    };

    feed(5);
    assert_eq!(p.get_state("driveway"), RecordingState::Buffering);

    p.ingest_detection_event("driveway", &[person()], clock.now())
        .unwrap();
    assert_eq!(p.get_state("driveway"), RecordingState::Recording);
    let files = t.writer.files();
    assert_eq!(files.len(), 1);
    assert_eq!(files[0].packets.len(), 50);
    assert_eq!(files[0].packets[0].pts_ms, 0);

    // Events stop; a new one inside the post-roll keeps the same file
    feed(4);
    assert_eq!(p.get_state("driveway"), RecordingState::PostRoll);
    let resumed_at = clock.now();
    p.ingest_detection_event("driveway", &[person()], resumed_at)
        .unwrap();
    assert_eq!(p.get_state("driveway"), RecordingState::Recording);
    assert_eq!(t.writer.files().len(), 1);

    // Ten quiet seconds close the file
    for _ in 0..10 {
        feed(1);
    }
    assert_eq!(p.get_state("driveway"), RecordingState::Idle);

    let rows = t.store.recordings();
    assert_eq!(rows.len(), 1);
    assert!(rows[0].is_complete);
    assert_eq!(rows[0].end_time, Some(resumed_at + chrono::Duration::seconds(10)));
    assert_eq!(rows[0].size_bytes, 64 * (50 + 140));
    assert!(rows[0].file_path.contains("driveway_20240601_080005_detection.mp4"));

    let stats = p.get_stats("driveway").unwrap();
    assert_eq!(stats.recordings_created, 1);
    assert_eq!(stats.events_processed, 2);
    assert_eq!(stats.buffer_flushes, 1);

    p.shutdown();
}

#[test]
fn test_monitor_detections_start_recording() {
    let t = build_pipeline(Arc::new(SystemClock), vec![person()]);
    let p = &t.pipeline;
    let segments = t.dir.path().join("segments");
    write_segment(&segments, "seg_0001.ts");

    p.enable_recording("porch", options()).unwrap();
    p.start_monitor(
        "porch",
        MonitorConfig {
            model_path: write_model(t.dir.path()),
            threshold: 0.0,
            detection_interval: Duration::ZERO,
            segment_dir: segments,
        },
    )
    .unwrap();

    assert!(wait_until(|| p.get_state("porch") == RecordingState::Recording));
    let status = p.monitor_status("porch").unwrap();
    assert!(status.model_loaded);
    assert!(status.detections_forwarded >= 1);

    p.shutdown();
    assert_eq!(p.get_state("porch"), RecordingState::Idle);
    assert!(t.store.recordings().iter().all(|r| r.is_complete));
    assert!(t.writer.files().iter().all(|f| f.finished));
}

#[test]
fn test_zone_filter_suppresses_recording() {
    let t = build_pipeline(Arc::new(SystemClock), vec![person()]);
    let p = &t.pipeline;
    let segments = t.dir.path().join("segments");
    write_segment(&segments, "seg_0001.ts");

    // Person centre is (0.25, 0.35): outside the right-half zone
    t.store
        .set_zones(
            "yard",
            vec![DetectionZone::new(
                "right",
                "yard",
                vec![
                    ZonePoint::new(0.5, 0.0),
                    ZonePoint::new(1.0, 0.0),
                    ZonePoint::new(1.0, 1.0),
                    ZonePoint::new(0.5, 1.0),
                ],
            )],
        )
        .unwrap();
    t.store
        .set_object_filter("yard", ObjectFilter::from_list(ObjectFilterMode::Include, "person"))
        .unwrap();

    p.enable_recording("yard", options()).unwrap();
    p.start_monitor(
        "yard",
        MonitorConfig {
            model_path: write_model(t.dir.path()),
            threshold: 0.5,
            detection_interval: Duration::ZERO,
            segment_dir: segments,
        },
    )
    .unwrap();

    assert!(wait_until(|| p
        .monitor_status("yard")
        .map(|s| s.segments_processed >= 1)
        .unwrap_or(false)));
    assert_eq!(p.monitor_status("yard").unwrap().detections_forwarded, 0);
    assert_eq!(p.get_state("yard"), RecordingState::Buffering);
    p.shutdown();
}

#[test]
fn test_segment_task_runs_through_pool() {
    let t = build_pipeline(Arc::new(SystemClock), vec![person()]);
    let p = &t.pipeline;
    let segments = t.dir.path().join("segments");
    std::fs::create_dir_all(&segments).unwrap();
    let external = write_segment(&t.dir.path().join("elsewhere"), "clip.ts");

    p.enable_recording("gate", options()).unwrap();
    p.start_monitor(
        "gate",
        MonitorConfig {
            model_path: write_model(t.dir.path()),
            threshold: 0.0,
            detection_interval: Duration::ZERO,
            segment_dir: segments,
        },
    )
    .unwrap();
    assert!(wait_until(|| p
        .monitor_status("gate")
        .map(|s| s.model_loaded)
        .unwrap_or(false)));

    assert!(p.submit_segment_task("gate", external, 2.0, Utc::now()));
    assert!(wait_until(|| p.pool_stats().completed == 1));
    assert!(wait_until(|| p.get_state("gate") == RecordingState::Recording));
    assert_eq!(t.decoder.decoded.load(std::sync::atomic::Ordering::SeqCst), 1);

    // Tasks for streams without a monitor fail inside the pool
    assert!(p.submit_live_packet_task(
        "unknown",
        EncodedPacket::new(vec![1; 8], 0, true),
        CodecParams::default()
    ));
    assert!(wait_until(|| p.pool_stats().failed == 1));
    assert!(!p.submit_segment_task("../bad", "x.ts".into(), 1.0, Utc::now()));

    p.shutdown();
}

#[test]
fn test_empty_segment_directory_restarts_transport() {
    let t = build_pipeline(Arc::new(SystemClock), vec![person()]);
    let p = &t.pipeline;

    p.start_monitor(
        "alley",
        MonitorConfig {
            model_path: write_model(t.dir.path()),
            threshold: 0.0,
            detection_interval: Duration::ZERO,
            segment_dir: t.dir.path().join("missing"),
        },
    )
    .unwrap();

    assert!(wait_until(|| t
        .transport
        .starts
        .load(std::sync::atomic::Ordering::SeqCst)
        >= 1));
    assert!(t.dir.path().join("missing").is_dir());
    assert!(p.monitor_status("alley").unwrap().running);
    p.shutdown();
}

#[test]
fn test_stop_and_shutdown_are_idempotent() {
    let t = build_pipeline(Arc::new(SystemClock), vec![person()]);
    let p = &t.pipeline;

    p.stop_monitor("never-started").unwrap();
    p.disable_recording("never-enabled").unwrap();
    assert!(matches!(
        p.ingest_motion_event("never-enabled", Utc::now()),
        Err(WorkerError::StreamNotFound(_))
    ));
    assert!(p.stop_monitor("").is_err());

    p.shutdown();
    p.shutdown();
    assert!(!p.submit_segment_task("cam1", "seg.ts".into(), 1.0, Utc::now()));
}
