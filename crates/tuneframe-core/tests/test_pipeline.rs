#[allow(dead_code)]
mod common;

use std::sync::atomic::Ordering;
use std::sync::{Arc, Mutex};

use common::*;
use tuneframe_core::error::TuneframeError;
use tuneframe_core::frame::Camera;
use tuneframe_core::kernels::Kernels;
use tuneframe_core::pipeline::{
    run_assembly, run_assembly_reported, AssemblyConfig, InterpolationConfig, ProgressReporter,
    SequenceExpectations, SlotState, TargetSlot,
};
use tuneframe_core::quality::{upstream, QualityFlags, SlotOutcome};
use tuneframe_core::sequence::wavelength_of_identifier;
use tuneframe_core::store::Keyword;

/// 58310 repeats every 45 s over 24 positions; the side reference frame
/// (wavelength 3, first polarization) sits at position 13.
const CADENCE: f64 = 45.0;
const REFERENCE_LOCATION: usize = 13;
const CYCLES: usize = 64;

fn reference_time(cycle: usize) -> f64 {
    cycle as f64 * CADENCE + REFERENCE_LOCATION as f64 * CADENCE / 24.0
}

fn stream_58310() -> Vec<tuneframe_core::frame::FrameHeader> {
    synthetic_stream(&builtin_tables(), 58310, 0.0, CYCLES)
}

fn config_at(begin: f64, end: f64) -> AssemblyConfig {
    AssemblyConfig {
        begin,
        end,
        camera: Camera::Side,
        reference_wavelength: REFERENCE_WAVELENGTH,
        ..AssemblyConfig::default()
    }
}

fn run(
    config: &AssemblyConfig,
    source: &MemorySource,
) -> (RecordingSink, Arc<CountingKernels>, tuneframe_core::pipeline::AssemblyReport) {
    let tables = builtin_tables();
    let kernels = Arc::new(CountingKernels::default());
    let mut sink = RecordingSink::default();
    let report = run_assembly(config, &tables, source, &mut sink, kernels.clone() as Arc<dyn Kernels>)
        .expect("assembly runs");
    (sink, kernels, report)
}

/// Record id of the synthetic frame at `location` in `cycle`.
fn record_id(cycle: usize, location: usize) -> u64 {
    1000 + (cycle * 24 + location) as u64
}

// ---------------------------------------------------------------------------
// Full products
// ---------------------------------------------------------------------------

#[test]
fn test_complete_stream_emits_full_products() {
    let source = MemorySource::new(stream_58310());
    let config = config_at(reference_time(30), reference_time(46));
    let (sink, kernels, report) = run(&config, &source);

    assert_eq!(sink.records.len(), 2);
    assert_eq!(report.count(SlotOutcome::Emitted), 2);
    for record in &sink.records {
        assert_eq!(record.outcome, SlotOutcome::Emitted);
        assert!(record.quality.is_empty(), "unexpected flags {:?}", record.quality.names());
        // 12 channels of 26 samples each
        assert_eq!(record.frames_used, 12 * 26);
        assert_eq!(record.sources.len(), 12 * 26);
        assert!(record.sources.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(record.segments.len(), 12);
        for w in 0..6 {
            assert!(record.segments.contains_key(&format!("I{w}")));
            assert!(record.segments.contains_key(&format!("V{w}")));
        }
        let intensity = &record.segments["I3"];
        assert_eq!(intensity.dim(), (IMAGE_SIZE, IMAGE_SIZE));
        assert!(intensity.iter().all(|v| v.is_finite()));
        assert_eq!(record.keyword("QUALITY"), Some(&Keyword::Bitmask(0)));
        assert_eq!(record.keyword("TINTNUM"), Some(&Keyword::Int(26)));
        assert_eq!(record.keyword("CADENCE"), Some(&Keyword::Double(45.0)));
        assert_eq!(record.keyword("HFLID"), Some(&Keyword::Int(58310)));
        assert_eq!(record.keyword("CAMERA"), Some(&Keyword::Int(2)));
    }

    assert_eq!(kernels.interpolations.load(Ordering::SeqCst), 24);
    assert_eq!(kernels.calibrations.load(Ordering::SeqCst), 12);
}

#[test]
fn test_explicit_point_count_sees_whole_window() {
    // 70 samples reach 35 cycles either side of the reference.
    let source = MemorySource::new(synthetic_stream(&builtin_tables(), 58310, 0.0, 140));
    let config = AssemblyConfig {
        interpolation: InterpolationConfig {
            points: Some(70),
            ..InterpolationConfig::default()
        },
        ..config_at(reference_time(70), reference_time(86))
    };
    let (sink, _, report) = run(&config, &source);

    assert_eq!(sink.records.len(), 2);
    for record in &sink.records {
        assert_eq!(record.outcome, SlotOutcome::Emitted, "{:?}", record.quality.names());
        assert_eq!(record.frames_used, 12 * 70);
        assert_eq!(record.keyword("TINTNUM"), Some(&Keyword::Int(70)));
    }
    // Frames shared by both slots survive eviction in between.
    assert_eq!(source.loads(), report.frames_loaded);
    assert!(report.frames_loaded < 2 * 12 * 70);
}

#[test]
fn test_frames_shared_between_slots_load_and_fill_once() {
    let source = MemorySource::new(stream_58310());
    let config = config_at(reference_time(30), reference_time(46));
    let (_sink, kernels, report) = run(&config, &source);

    assert_eq!(source.loads(), report.frames_loaded);
    assert!(report.frames_loaded < 2 * 12 * 26);
    assert_eq!(kernels.gap_fills.load(Ordering::SeqCst), report.frames_loaded);
}

#[test]
fn test_combined_cameras_assemble_full_stokes() {
    let tables = builtin_tables();
    // 58312 side: 48 positions every 90 s; side reference at position 25
    let frames = synthetic_stream(&tables, 58312, 0.0, 30);
    let t = 20.0 * 90.0 + 25.0 * 90.0 / 48.0;
    let source = MemorySource::new(frames);
    let config = AssemblyConfig {
        expectations: SequenceExpectations {
            cadence: Some(90.0),
            channels: Some(48),
            npol: Some(8),
            polarization_type: Some(1),
        },
        ..config_at(t, t)
    };
    let (sink, _kernels, _report) = run(&config, &source);

    let record = &sink.records[0];
    assert_eq!(record.outcome, SlotOutcome::Emitted, "flags {:?}", record.quality.names());
    assert_eq!(record.frames_used, 48 * 14);
    assert_eq!(record.segments.len(), 24);
    assert!(record.segments.contains_key("Q0"));
    assert!(record.segments.contains_key("U5"));
}

// ---------------------------------------------------------------------------
// Empty products
// ---------------------------------------------------------------------------

#[test]
fn test_missing_reference_emits_empty_without_kernel_calls() {
    let frames: Vec<_> = stream_58310()
        .into_iter()
        .filter(|f| !(f.camera == Camera::Side && wavelength_of_identifier(f.filter_id) == Some(3)))
        .collect();
    let source = MemorySource::new(frames);
    let config = config_at(reference_time(30), reference_time(30));
    let (sink, kernels, _report) = run(&config, &source);

    let record = &sink.records[0];
    assert_eq!(record.outcome, SlotOutcome::EmittedEmpty);
    assert_eq!(
        record.quality,
        QualityFlags::TARGET_FILTERGRAM_MISSING | QualityFlags::NO_DATA
    );
    assert!(record.segments.is_empty());
    assert_eq!(record.frames_used, 0);
    assert_eq!(kernels.total(), 0);
    assert_eq!(source.loads(), 0);
}

#[test]
fn test_target_outside_data_is_empty() {
    let source = MemorySource::new(stream_58310());
    let config = config_at(100_000.0, 100_000.0);
    let (sink, _, _) = run(&config, &source);
    assert_eq!(
        sink.records[0].quality,
        QualityFlags::TARGET_FILTERGRAM_MISSING | QualityFlags::NO_DATA
    );
}

#[test]
fn test_reference_without_limb_fit_is_empty() {
    let mut frames = stream_58310();
    frames[30 * 24 + REFERENCE_LOCATION].limb.x0 = f64::NAN;
    let source = MemorySource::new(frames);
    let config = config_at(reference_time(30), reference_time(30));
    let (sink, kernels, _) = run(&config, &source);

    let q = sink.records[0].quality;
    assert!(q.contains(QualityFlags::LIMBFIT_ISSUE | QualityFlags::TARGET_FILTERGRAM_MISSING));
    assert!(q.contains(QualityFlags::NO_DATA));
    assert_eq!(kernels.total(), 0);
}

#[test]
fn test_unknown_sequence_sets_no_framelist_info() {
    let mut frames = stream_58310();
    for f in &mut frames {
        f.sequence_id = 99_999;
    }
    let source = MemorySource::new(frames);
    let config = config_at(reference_time(30), reference_time(30));
    let (sink, _, _) = run(&config, &source);

    assert_eq!(
        sink.records[0].quality,
        QualityFlags::NO_FRAMELIST_INFO | QualityFlags::NO_DATA
    );
}

#[test]
fn test_reference_needs_a_known_cadence() {
    let mut frames = synthetic_stream(&builtin_tables(), 58310, 0.0, 2);
    for f in &mut frames {
        f.sequence_id = 4242;
    }
    let source = MemorySource::new(frames);
    let config = AssemblyConfig {
        expectations: SequenceExpectations::none(),
        ..config_at(600.0, 600.0)
    };
    let (sink, kernels, _) = run(&config, &source);

    let record = &sink.records[0];
    assert_eq!(
        record.quality,
        QualityFlags::TARGET_FILTERGRAM_MISSING | QualityFlags::NO_DATA
    );
    assert_eq!(record.keyword("HFLID"), None);
    assert_eq!(kernels.total(), 0);
}

#[test]
fn test_framelist_size_checked_before_cadence() {
    let tables = builtin_tables();
    let frames = synthetic_stream(&tables, 58400, 0.0, 40);
    let reference = frames
        .iter()
        .find(|f| {
            f.camera == Camera::Side && wavelength_of_identifier(f.filter_id) == Some(3) && f.time >= 1200.0
        })
        .expect("reference frame")
        .time;
    let source = MemorySource::new(frames);

    let mut config = config_at(reference, reference);
    config.expectations.cadence = Some(60.0);
    let (sink, _, _) = run(&config, &source);
    assert!(sink.records[0].quality.contains(QualityFlags::WRONG_FRAMELIST_SIZE));
    assert!(!sink.records[0].quality.contains(QualityFlags::WRONG_CADENCE));

    config.expectations.channels = None;
    config.expectations.cadence = Some(75.0);
    let (sink, _, _) = run(&config, &source);
    assert_eq!(
        sink.records[0].quality,
        QualityFlags::WRONG_CADENCE | QualityFlags::NO_DATA
    );
}

#[test]
fn test_unknown_wavelength_selection() {
    let source = MemorySource::new(stream_58310());
    let mut config = config_at(reference_time(30), reference_time(30));
    config.wavelengths = Some(vec![3, 7]);
    let (sink, kernels, _) = run(&config, &source);

    assert!(sink.records[0].quality.contains(QualityFlags::WRONG_WAVELENGTH_NUM));
    assert_eq!(kernels.total(), 0);
}

#[test]
fn test_too_few_interpolants_empties_slot_before_kernels() {
    let mut source = MemorySource::new(stream_58310());
    // Drop the images of channel 1 (side, position 1) for the whole window.
    for cycle in 15..45 {
        source.payloads.remove(&record_id(cycle, 1));
    }
    let config = config_at(reference_time(30), reference_time(30));
    let (sink, kernels, _) = run(&config, &source);

    let record = &sink.records[0];
    assert_eq!(record.outcome, SlotOutcome::EmittedEmpty);
    assert!(record.quality.contains(
        QualityFlags::NOT_ENOUGH_INTERPOLANTS | QualityFlags::LOW_INTERP_NUM | QualityFlags::NO_DATA
    ));
    assert!(record.segments.is_empty());
    assert_eq!(kernels.total(), 0);
}

// ---------------------------------------------------------------------------
// Degraded products
// ---------------------------------------------------------------------------

#[test]
fn test_one_missing_image_degrades() {
    let mut source = MemorySource::new(stream_58310());
    source.payloads.remove(&record_id(25, 1));
    let config = config_at(reference_time(30), reference_time(30));
    let (sink, _, _) = run(&config, &source);

    let record = &sink.records[0];
    assert_eq!(record.outcome, SlotOutcome::EmittedDegraded);
    assert_eq!(record.quality, QualityFlags::LOW_INTERP_NUM);
    assert_eq!(record.frames_used, 12 * 26 - 1);
    assert!(!record.segments.is_empty());
}

#[test]
fn test_missing_temperatures_degrade() {
    let mut source = MemorySource::new(stream_58310());
    source.temperatures = None;
    let config = config_at(reference_time(30), reference_time(30));
    let (sink, _, _) = run(&config, &source);

    assert_eq!(sink.records[0].outcome, SlotOutcome::EmittedDegraded);
    assert_eq!(sink.records[0].quality, QualityFlags::NO_TEMP);
}

#[test]
fn test_missing_transient_list_degrades() {
    let mut source = MemorySource::new(stream_58310());
    if let Some(payload) = source.payloads.get_mut(&record_id(28, 5)) {
        payload.transient_defects = None;
    }
    let config = config_at(reference_time(30), reference_time(30));
    let (sink, _, _) = run(&config, &source);

    assert_eq!(sink.records[0].quality, QualityFlags::NO_COSMIC_RAY);
}

#[test]
fn test_upstream_eclipse_propagates() {
    let mut frames = stream_58310();
    frames[28 * 24 + 5].quality = upstream::ECLIPSE;
    let source = MemorySource::new(frames);
    let config = config_at(reference_time(30), reference_time(30));
    let (sink, _, _) = run(&config, &source);

    let record = &sink.records[0];
    assert_eq!(record.quality, QualityFlags::ECLIPSE | QualityFlags::POOR_QUALITY);
    assert_eq!(record.source_quality, upstream::ECLIPSE);
    assert_eq!(record.keyword("QUALLEV0"), Some(&Keyword::Bitmask(upstream::ECLIPSE as u64)));
}

#[test]
fn test_limb_outlier_is_rejected() {
    let mut frames = stream_58310();
    frames[25 * 24 + 1].limb.x0 += 5.0;
    let source = MemorySource::new(frames);
    let config = config_at(reference_time(30), reference_time(30));
    let (sink, _, _) = run(&config, &source);

    let record = &sink.records[0];
    assert_eq!(record.outcome, SlotOutcome::EmittedDegraded);
    assert_eq!(record.quality, QualityFlags::LIMBFIT_ISSUE | QualityFlags::LOW_INTERP_NUM);
    assert_eq!(record.frames_used, 12 * 26 - 1);
    assert!(!record.sources.contains(&record_id(25, 1)));
}

#[test]
fn test_unfillable_frame_flags_no_gapfill() {
    let mut source = MemorySource::new(stream_58310());
    if let Some(payload) = source.payloads.get_mut(&record_id(27, 3)) {
        payload.image.fill(f32::NAN);
    }
    let config = config_at(reference_time(30), reference_time(30));
    let (sink, _, _) = run(&config, &source);

    let record = &sink.records[0];
    assert_eq!(record.outcome, SlotOutcome::EmittedDegraded);
    assert_eq!(record.quality, QualityFlags::NO_GAPFILL);
    assert!(record.segments["I0"].iter().all(|v| v.is_finite()));
}

// ---------------------------------------------------------------------------
// Reporting and validation
// ---------------------------------------------------------------------------

#[derive(Default)]
struct StateRecorder {
    states: Mutex<Vec<SlotState>>,
    finished: Mutex<usize>,
}

impl ProgressReporter for StateRecorder {
    fn slot_state(&self, _slot: &TargetSlot, state: SlotState) {
        self.states.lock().unwrap().push(state);
    }

    fn slot_finished(&self, _slot: &TargetSlot, _report: &tuneframe_core::pipeline::SlotReport) {
        *self.finished.lock().unwrap() += 1;
    }
}

#[test]
fn test_reporter_sees_every_state() {
    let tables = builtin_tables();
    let source = MemorySource::new(stream_58310());
    let config = config_at(reference_time(30), reference_time(30));
    let recorder = Arc::new(StateRecorder::default());
    let mut sink = RecordingSink::default();

    run_assembly_reported(
        &config,
        &tables,
        &source,
        &mut sink,
        Arc::new(CountingKernels::default()),
        recorder.clone(),
    )
    .unwrap();

    assert_eq!(
        *recorder.states.lock().unwrap(),
        vec![
            SlotState::Initialized,
            SlotState::ResolvingSequence,
            SlotState::LocatingChannels,
            SlotState::Interpolating,
            SlotState::Assembling,
            SlotState::Emitted,
        ]
    );
    assert_eq!(*recorder.finished.lock().unwrap(), 1);
}

#[test]
fn test_invalid_config_aborts_run() {
    let tables = builtin_tables();
    let source = MemorySource::new(Vec::new());
    let mut sink = RecordingSink::default();
    let config = config_at(100.0, 50.0);

    let result = run_assembly(&config, &tables, &source, &mut sink, Arc::new(CountingKernels::default()));
    assert!(matches!(result, Err(TuneframeError::InvalidConfig(_))));
    assert!(sink.records.is_empty());
}
