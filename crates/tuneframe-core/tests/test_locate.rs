#[allow(dead_code)]
mod common;

use tuneframe_core::frame::{Camera, FrameHeader, LimbGeometry, TuningState};
use tuneframe_core::locate::{
    locate_channel, ChannelSearch, ChannelTarget, Direction, IdentifierCheck, SearchWindow, WindowSplit,
};
use tuneframe_core::quality::upstream;
use tuneframe_core::tables::IdentifierOffset;

/// Twelve tuning states repeating every 45 s, one frame every 3.75 s.
const STATES: usize = 12;
const SPACING: f64 = 3.75;
const REFERENCE: usize = 100;

fn state(k: usize) -> TuningState {
    TuningState {
        wavelength: [k as i32, 0, 0, 0],
        polarization: [0, 0, 0],
    }
}

fn stream(len: usize) -> Vec<FrameHeader> {
    (0..len)
        .map(|i| FrameHeader {
            index: i,
            record_id: i as u64,
            time: i as f64 * SPACING,
            tuning: state(i % STATES),
            camera: Camera::Side,
            focus: 0,
            quality: 0,
            sequence_id: 1,
            wavelength_table_id: 0,
            polarization_table_id: 0,
            filter_id: 10000 + (i % STATES) as i32,
            framelist_position: (i % STATES) as i32,
            geometry_id: common::FULL_GEOMETRY,
            limb: LimbGeometry::default(),
            tuning_loop_open: false,
            keywords_complete: true,
        })
        .collect()
}

fn search(delta: i64, points: usize) -> ChannelSearch {
    let channel = (REFERENCE as i64 + delta) as usize % STATES;
    ChannelSearch {
        reference_index: REFERENCE,
        delta,
        grouping: delta,
        target: ChannelTarget {
            tuning: state(channel),
            camera: Camera::Side,
            focus: 0,
            identifier: None,
        },
        window: SearchWindow::for_points(REFERENCE as f64 * SPACING, points, 45.0),
        split: WindowSplit::LineOfSight,
        sequence_length: STATES,
        points,
    }
}

fn corrupt(frame: &mut FrameHeader) {
    frame.tuning.wavelength = [99, 99, 99, 99];
}

// ---------------------------------------------------------------------------
// Window and direction
// ---------------------------------------------------------------------------

#[test]
fn test_window_for_points() {
    let w = SearchWindow::for_points(375.0, 4, 45.0);
    assert_eq!(w.left, 90.0);
    assert_eq!(w.right, 135.0);
    assert_eq!(w.earliest(), 240.0);
    assert_eq!(w.latest(), 510.0);

    let w = SearchWindow::for_points(0.0, 26, 45.0);
    assert_eq!(w.left, 585.0);
    assert_eq!(w.right, 630.0);
}

#[test]
fn test_direction_split() {
    assert_eq!(Direction::from_grouping(0), Direction::AtOrBefore);
    assert_eq!(Direction::from_grouping(-3), Direction::AtOrBefore);
    assert_eq!(Direction::from_grouping(3), Direction::After);
    assert_eq!(Direction::AtOrBefore.split(26), (12, 13));
    assert_eq!(Direction::After.split(26), (13, 12));
    assert_eq!(Direction::After.split(0), (0, 0));
}

#[test]
fn test_averaging_swaps_bounds_after_reference() {
    let mut s = search(2, 4);
    assert_eq!(s.bounds(), (90.0, 135.0));
    s.split = WindowSplit::Averaging;
    assert_eq!(s.bounds(), (135.0, 90.0));

    let mut before = search(-2, 4);
    before.split = WindowSplit::Averaging;
    assert_eq!(before.bounds(), (90.0, 135.0));
}

// ---------------------------------------------------------------------------
// Locating
// ---------------------------------------------------------------------------

#[test]
fn test_channel_after_reference() {
    let frames = stream(200);
    let located = locate_channel(&frames, &search(2, 4));
    assert_eq!(located.anchor, Some(102));
    assert_eq!(located.frames, vec![Some(78), Some(90), Some(102), Some(114)]);
    assert_eq!(located.available(), 4);
    assert_eq!(located.indices().collect::<Vec<_>>(), vec![78, 90, 102, 114]);
}

#[test]
fn test_channel_before_reference() {
    let frames = stream(200);
    let located = locate_channel(&frames, &search(-2, 4));
    assert_eq!(located.anchor, Some(98));
    assert_eq!(located.frames, vec![Some(86), Some(98), Some(110), Some(122)]);
}

#[test]
fn test_anchor_scans_past_displaced_frame() {
    let mut frames = stream(200);
    corrupt(&mut frames[102]);
    frames[103].tuning = state(102 % STATES);

    let located = locate_channel(&frames, &search(2, 4));
    assert_eq!(located.anchor, Some(103));
    assert_eq!(located.frames, vec![Some(78), Some(90), Some(103), Some(114)]);
}

#[test]
fn test_anchor_scan_is_time_bounded() {
    let mut frames = stream(200);
    corrupt(&mut frames[102]);
    let mut s = search(2, 4);
    s.window.right = 20.0;

    let located = locate_channel(&frames, &s);
    assert_eq!(located.anchor, None);
    assert_eq!(located.frames, vec![Some(78), Some(90), None, None]);
    assert_eq!(located.available(), 2);
}

#[test]
fn test_unusable_frames_are_skipped() {
    let mut frames = stream(200);
    frames[90].quality = upstream::MISSING_SEGMENT;

    let located = locate_channel(&frames, &search(2, 4));
    assert_eq!(located.frames, vec![None, Some(78), Some(102), Some(114)]);
}

#[test]
fn test_incomplete_keywords_are_skipped() {
    let mut frames = stream(200);
    frames[114].keywords_complete = false;

    // The next sample of the channel still lies inside the window.
    let located = locate_channel(&frames, &search(2, 4));
    assert_eq!(located.frames, vec![Some(78), Some(90), Some(102), Some(126)]);
}

#[test]
fn test_stream_edges() {
    let frames = stream(110);
    let located = locate_channel(&frames, &search(2, 4));
    assert_eq!(located.frames, vec![Some(78), Some(90), Some(102), None]);

    let located = locate_channel(&[], &search(2, 4));
    assert_eq!(located.anchor, None);
    assert_eq!(located.available(), 0);
    assert_eq!(located.frames.len(), 4);
}

#[test]
fn test_focus_and_camera_must_match() {
    let mut frames = stream(200);
    frames[90].focus = 3;
    frames[114].camera = Camera::Front;

    let located = locate_channel(&frames, &search(2, 4));
    assert_eq!(located.frames, vec![None, Some(78), Some(102), Some(126)]);
}

// ---------------------------------------------------------------------------
// Identifier rule
// ---------------------------------------------------------------------------

#[test]
fn test_identifier_offset_rule() {
    let rule = IdentifierOffset {
        camera: Camera::Side,
        period: 72,
        block: 24,
        selected: 1,
        offset: 100_000,
    };
    assert!(rule.applies_to(Camera::Side));
    assert!(!rule.applies_to(Camera::Front));
    assert_eq!(rule.apply(10090, 30), 110_090);
    assert_eq!(rule.apply(10090, 6), 10090);
    assert_eq!(rule.apply(10090, 102), 110_090);
}

#[test]
fn test_identifier_check_separates_duplicate_states() {
    let rule = IdentifierOffset {
        camera: Camera::Side,
        period: 72,
        block: 24,
        selected: 1,
        offset: 100_000,
    };
    let mut frame = stream(1).remove(0);
    frame.filter_id = 10090;
    frame.framelist_position = 30;

    let mut target = ChannelTarget {
        tuning: frame.tuning,
        camera: Camera::Side,
        focus: 0,
        identifier: Some(IdentifierCheck {
            expected: 110_090,
            rule,
        }),
    };
    assert!(target.matches(&frame));

    frame.framelist_position = 6;
    assert!(!target.matches(&frame));

    target.identifier = None;
    assert!(target.matches(&frame));
}
