mod common;

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use common::{
    face_x_for, test_config, wait_until, CountingDevice, FakeLoader, FixedCascade,
    RecordingController,
};
use image::GrayImage;
use receptionist_core::detection::domain::cascade::Cascade;
use receptionist_core::detection::domain::detection_result::SnapshotProvider;
use receptionist_core::detection::infrastructure::feature_detector::DetectorState;
use receptionist_core::pipeline::capture_training_image_use_case::{
    CaptureOutcome, CaptureTrainingImageUseCase, FaceSaveOutcome,
};
use receptionist_core::pipeline::pipeline_controller::{PipelineController, PipelineError};
use receptionist_core::recognition::infrastructure::image_preprocessor::ImagePreprocessor;
use receptionist_core::shared::log_sink::{MemoryLogSink, NullLogSink};
use receptionist_core::shared::region::{FeatureKind, Region};

fn pipeline(device: CountingDevice, loader: FakeLoader) -> Arc<PipelineController> {
    let mut config = test_config();
    config.cascades.eyes = Some("eyes.onnx".into());
    config.cascades.mouth = Some("mouth.onnx".into());
    Arc::new(
        PipelineController::from_config(
            &config,
            Box::new(device),
            Arc::new(loader),
            Arc::new(NullLogSink),
        )
        .unwrap(),
    )
}

fn running_pipeline() -> Arc<PipelineController> {
    let p = pipeline(
        CountingDevice::paced(Duration::from_millis(2)),
        FakeLoader::standard(Duration::ZERO),
    );
    p.start().unwrap();
    assert!(wait_until(Duration::from_secs(5), || p
        .capture_frame_and_faces()
        .is_some()));
    p
}

#[test]
fn start_logs_ready_and_stop_is_bounded_and_idempotent() {
    let sink = Arc::new(MemoryLogSink::new());
    let p = PipelineController::from_config(
        &test_config(),
        Box::new(CountingDevice::paced(Duration::from_millis(2))),
        Arc::new(FakeLoader::standard(Duration::ZERO)),
        sink.clone(),
    )
    .unwrap();

    p.start().unwrap();
    assert!(p.is_running());
    assert!(matches!(p.start(), Err(PipelineError::AlreadyStarted)));
    assert!(sink.contains("Ready..."));
    assert!(wait_until(Duration::from_secs(5), || p
        .detector()
        .cycle_count()
        >= 3));

    let started = Instant::now();
    p.stop().unwrap();
    assert!(started.elapsed() < Duration::from_secs(2));
    assert!(!p.is_running());
    assert!(!p.source().is_capturing());
    assert_eq!(p.detector().state(), DetectorState::Stopped);

    p.stop().unwrap();
    assert!(matches!(p.start(), Err(PipelineError::Stopped)));
}

#[test]
fn stop_unblocks_a_device_waiting_for_frames() {
    let p = pipeline(CountingDevice::burst(1), FakeLoader::standard(Duration::ZERO));
    p.start().unwrap();
    assert!(wait_until(Duration::from_secs(5), || p
        .capture_frame_and_faces()
        .is_some()));

    let started = Instant::now();
    p.stop().unwrap();
    assert!(started.elapsed() < Duration::from_secs(2));
}

#[test]
fn stop_before_start_is_harmless() {
    let p = pipeline(
        CountingDevice::paced(Duration::from_millis(2)),
        FakeLoader::standard(Duration::ZERO),
    );
    p.stop().unwrap();
    assert!(!p.is_running());
}

#[test]
fn missing_cascade_aborts_construction() {
    let mut config = test_config();
    config.cascades.nose = Some("missing.onnx".into());
    let result = PipelineController::from_config(
        &config,
        Box::new(CountingDevice::paced(Duration::from_millis(2))),
        Arc::new(FakeLoader::standard(Duration::ZERO)),
        Arc::new(NullLogSink),
    );
    assert!(matches!(result, Err(PipelineError::Configuration(_))));
}

#[test]
fn no_controller_is_notified_after_stop() {
    let p = running_pipeline();
    let recorder = Arc::new(RecordingController::default());
    p.add_ui_controller(recorder.clone());
    assert!(wait_until(Duration::from_secs(5), || recorder.calls() >= 2));

    p.stop().unwrap();
    let calls_at_stop = recorder.calls();
    thread::sleep(Duration::from_millis(50));

    assert_eq!(recorder.calls(), calls_at_stop);
    assert_eq!(p.detector().controller_count(), 0);
}

#[test]
fn snapshot_pairs_frame_with_its_own_result() {
    let p = running_pipeline();
    let deadline = Instant::now() + Duration::from_millis(300);
    let mut checked = 0;
    let mut last_cycle = 0;
    while Instant::now() < deadline {
        let snapshot = p.capture_frame_and_faces().unwrap();
        let face = snapshot.result.faces()[0].face();
        assert_eq!(face.x, face_x_for(snapshot.frame.index()));
        assert!(snapshot.result.cycle() >= last_cycle);
        last_cycle = snapshot.result.cycle();
        checked += 1;
    }
    p.stop().unwrap();
    assert!(checked > 0);
    assert!(last_cycle > 1);
}

#[test]
fn published_features_lie_within_their_face() {
    let p = running_pipeline();
    let snapshot = p.capture_frame_and_faces().unwrap();
    p.stop().unwrap();

    let detected = &snapshot.result.faces()[0];
    assert_eq!(detected.features_of(FeatureKind::Eyes).count(), 2);
    assert_eq!(detected.features_of(FeatureKind::Mouth).count(), 2);
    for feature in detected.features() {
        assert!(
            detected.face().contains(feature),
            "{feature:?} outside {:?}",
            detected.face()
        );
    }
}

#[test]
fn slow_detector_sees_latest_frame_and_never_blocks_capture() {
    let p = pipeline(
        CountingDevice::burst(50),
        FakeLoader::standard(Duration::from_millis(30)),
    );
    p.start().unwrap();

    assert!(wait_until(Duration::from_millis(500), || p
        .source()
        .frames_captured()
        == 50));
    assert!(p.detector().cycle_count() < 50);

    assert!(wait_until(Duration::from_secs(5), || p
        .capture_frame_and_faces()
        .is_some_and(|s| s.frame.index() == 49)));
    p.stop().unwrap();
    assert!(p.detector().cycle_count() < 50);
}

#[test]
fn detector_reads_the_configured_capture_ring() {
    let p = pipeline(
        CountingDevice::paced(Duration::from_millis(2)),
        FakeLoader::standard(Duration::ZERO),
    );
    assert_eq!(p.source().ring().capacity(), test_config().frame_capacity);
    p.start().unwrap();

    assert!(wait_until(Duration::from_secs(5), || p
        .source()
        .frames_captured()
        > 80));
    p.stop().unwrap();

    // A detector that keeps up leaves nothing to evict.
    assert_eq!(p.source().ring().dropped_count(), 0);
    assert!(p.detector().cycle_count() > 0);
}

#[test]
fn slow_detector_backlog_is_bounded_by_ring_capacity() {
    let mut config = test_config();
    config.frame_capacity = 4;
    let p = PipelineController::from_config(
        &config,
        Box::new(CountingDevice::burst(50)),
        Arc::new(FakeLoader::standard(Duration::from_millis(100))),
        Arc::new(NullLogSink),
    )
    .unwrap();
    p.start().unwrap();

    assert!(wait_until(Duration::from_secs(2), || p
        .source()
        .frames_captured()
        == 50));
    assert!(p.source().ring().len() <= 4);
    assert!(wait_until(Duration::from_secs(5), || p
        .capture_frame_and_faces()
        .is_some_and(|s| s.frame.index() == 49)));
    p.stop().unwrap();

    let dropped = p.source().ring().dropped_count();
    assert!(dropped > 0);
    assert!(dropped + p.detector().cycle_count() <= 50);
}

#[test]
fn device_failure_ends_running_state_before_stop() {
    let p = pipeline(
        CountingDevice::disconnecting(5),
        FakeLoader::standard(Duration::ZERO),
    );
    p.start().unwrap();

    assert!(wait_until(Duration::from_secs(5), || !p.is_running()));
    assert_eq!(p.source().frames_captured(), 5);
    p.stop().unwrap();
}

#[test]
fn capture_command_saves_detected_faces() {
    let p = running_pipeline();
    let dir = tempfile::tempdir().unwrap();
    let use_case = CaptureTrainingImageUseCase::new(
        p.clone(),
        ImagePreprocessor::default().with_base_path(dir.path()),
        Arc::new(NullLogSink),
    );
    let mut names = |_: usize, _: &Region, _: &GrayImage| Some("carol.png".to_string());

    let outcome = use_case.execute(&mut names);
    p.stop().unwrap();

    let CaptureOutcome::Faces(faces) = &outcome else {
        panic!("expected faces, got {outcome:?}");
    };
    assert_eq!(faces.len(), 1);
    assert!(matches!(faces[0].1, FaceSaveOutcome::Saved(_)));
    let saved = image::open(dir.path().join("carol.png")).unwrap();
    assert_eq!((saved.width(), saved.height()), (150, 200));
}

#[test]
fn capture_command_reports_no_faces() {
    let loader = FakeLoader::new(|kind| -> Box<dyn Cascade> {
        Box::new(FixedCascade { kind, hits: vec![] })
    });
    let p = pipeline(CountingDevice::paced(Duration::from_millis(2)), loader);
    p.start().unwrap();
    assert!(wait_until(Duration::from_secs(5), || p
        .capture_frame_and_faces()
        .is_some()));

    let dir = tempfile::tempdir().unwrap();
    let use_case = CaptureTrainingImageUseCase::new(
        p.clone(),
        ImagePreprocessor::default().with_base_path(dir.path()),
        Arc::new(NullLogSink),
    );
    let mut names =
        |_: usize, _: &Region, _: &GrayImage| -> Option<String> { panic!("no faces to name") };
    let outcome = use_case.execute(&mut names);
    p.stop().unwrap();

    assert!(matches!(outcome, CaptureOutcome::NoFaces));
    assert!(p.capture_frame_and_faces().unwrap().result.is_empty());
}
