//! Bounded, direction-aware search for the frames of one channel around a
//! target time.

use serde::{Deserialize, Serialize};

use crate::frame::{Camera, FrameHeader, TuningState};
use crate::tables::IdentifierOffset;

/// Identifier a frame must carry under a sequence's offset rule.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct IdentifierCheck {
    pub expected: i32,
    pub rule: IdentifierOffset,
}

/// Fields a frame must match to count as a sample of a channel.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ChannelTarget {
    pub tuning: TuningState,
    pub camera: Camera,
    pub focus: i32,
    pub identifier: Option<IdentifierCheck>,
}

impl ChannelTarget {
    pub fn matches(&self, frame: &FrameHeader) -> bool {
        frame.tuning == self.tuning
            && frame.camera == self.camera
            && frame.focus == self.focus
            && self.identifier.is_none_or(|check| {
                check.rule.apply(frame.filter_id, frame.framelist_position) == check.expected
            })
    }
}

/// Where a channel sits relative to the reference frame in framelist order.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
    AtOrBefore,
    After,
}

impl Direction {
    pub fn from_grouping(grouping: i64) -> Self {
        if grouping > 0 {
            Self::After
        } else {
            Self::AtOrBefore
        }
    }

    /// Positions sought (backward, forward) around the anchor for `points` samples.
    pub fn split(self, points: usize) -> (usize, usize) {
        let half = points / 2;
        match self {
            Self::AtOrBefore => (half.saturating_sub(1), half),
            Self::After => (half, half.saturating_sub(1)),
        }
    }
}

/// Which half-width bounds each side of the walk.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum WindowSplit {
    /// Backward walks use the left half-width and forward walks the right one.
    #[default]
    LineOfSight,
    /// Channels after the reference swap the two half-widths.
    Averaging,
}

impl std::fmt::Display for WindowSplit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::LineOfSight => write!(f, "Line of sight"),
            Self::Averaging => write!(f, "Averaging"),
        }
    }
}

/// Asymmetric time window around a target time, in seconds.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SearchWindow {
    pub target_time: f64,
    pub left: f64,
    pub right: f64,
}

impl SearchWindow {
    /// Window wide enough for `points` samples of a channel repeating every
    /// `cadence` seconds, padded by one cadence.
    pub fn for_points(target_time: f64, points: usize, cadence: f64) -> Self {
        let half = (points / 2) as f64;
        Self {
            target_time,
            left: (half - 1.0).max(0.0) * cadence + cadence,
            right: half * cadence + cadence,
        }
    }

    /// Earliest time any search in this window can reach.
    pub fn earliest(&self) -> f64 {
        self.target_time - self.left.max(self.right)
    }

    pub fn latest(&self) -> f64 {
        self.target_time + self.left.max(self.right)
    }

    fn offset(&self, frame: &FrameHeader) -> f64 {
        frame.time - self.target_time
    }
}

/// Everything needed to locate one channel.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ChannelSearch {
    /// Index of the reference frame in the frame slice.
    pub reference_index: usize,
    /// Framelist distance from the reference entry to the channel.
    pub delta: i64,
    /// Zero when the channel shares the reference frame's window, `delta` otherwise.
    pub grouping: i64,
    pub target: ChannelTarget,
    pub window: SearchWindow,
    pub split: WindowSplit,
    /// Raw framelist length bounding the anchor scan.
    pub sequence_length: usize,
    /// Number of interpolation samples wanted.
    pub points: usize,
}

impl ChannelSearch {
    pub fn direction(&self) -> Direction {
        Direction::from_grouping(self.grouping)
    }

    /// Half-widths bounding the (backward, forward) walks.
    pub fn bounds(&self) -> (f64, f64) {
        match (self.split, self.direction()) {
            (WindowSplit::Averaging, Direction::After) => (self.window.right, self.window.left),
            _ => (self.window.left, self.window.right),
        }
    }
}

/// Frames found for one channel.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Located {
    /// Directly located frame nearest the reference.
    pub anchor: Option<usize>,
    /// One slot per interpolation sample, earliest first.
    pub frames: Vec<Option<usize>>,
}

impl Located {
    pub fn available(&self) -> usize {
        self.frames.iter().filter(|f| f.is_some()).count()
    }

    pub fn indices(&self) -> impl Iterator<Item = usize> + '_ {
        self.frames.iter().flatten().copied()
    }
}

/// Locate the anchor and companion frames of a channel.
///
/// `frames` must be ordered by time. A sample that cannot be found is `None`;
/// nothing here is an error.
pub fn locate_channel(frames: &[FrameHeader], search: &ChannelSearch) -> Located {
    let theoretical = search.reference_index as i64 + search.delta;
    let anchor = find_anchor(frames, search, theoretical);
    let start = anchor.map_or(theoretical, |a| a as i64);

    let (back_count, forward_count) = search.direction().split(search.points);
    let (back_bound, forward_bound) = search.bounds();

    let mut backward = walk(frames, search, start, -1, back_count, back_bound);
    let forward = walk(frames, search, start, 1, forward_count, forward_bound);

    backward.reverse();
    let mut located = backward;
    located.push(anchor);
    located.extend(forward);
    Located {
        anchor,
        frames: located,
    }
}

fn frame_at(frames: &[FrameHeader], index: i64) -> Option<&FrameHeader> {
    usize::try_from(index).ok().and_then(|i| frames.get(i))
}

fn find_anchor(frames: &[FrameHeader], search: &ChannelSearch, theoretical: i64) -> Option<usize> {
    let window = &search.window;
    let target = &search.target;

    if let Some(frame) = frame_at(frames, theoretical) {
        let offset = window.offset(frame);
        if frame.is_usable() && target.matches(frame) && offset >= -window.left && offset <= window.right {
            return Some(theoretical as usize);
        }
    }

    let forward = search.grouping > 0;
    for step in 1..search.sequence_length.max(1) as i64 {
        let k = if forward { theoretical + step } else { theoretical - step };
        let Some(frame) = frame_at(frames, k) else {
            if (forward && k >= frames.len() as i64) || (!forward && k < 0) {
                break;
            }
            continue;
        };
        let offset = window.offset(frame);
        let in_bound = if forward {
            offset <= window.right
        } else {
            offset >= -window.left
        };
        if !in_bound {
            break;
        }
        if frame.is_usable() && target.matches(frame) {
            return Some(k as usize);
        }
    }
    None
}

/// Walk `count` samples away from `start` in steps of `step`, skipping
/// unusable frames and mismatching frames inside `bound`. Once a mismatching
/// frame lies outside `bound` the remaining samples on this side are `None`.
fn walk(
    frames: &[FrameHeader],
    search: &ChannelSearch,
    start: i64,
    step: i64,
    count: usize,
    bound: f64,
) -> Vec<Option<usize>> {
    let window = &search.window;
    let target = &search.target;
    let len = frames.len() as i64;
    let within = |frame: &FrameHeader| {
        let offset = window.offset(frame);
        if step < 0 {
            offset >= -bound
        } else {
            offset <= bound
        }
    };

    let mut out = Vec::with_capacity(count);
    let mut k = if step < 0 {
        (start + step).min(len - 1)
    } else {
        (start + step).max(0)
    };
    for _ in 0..count {
        while let Some(frame) = frame_at(frames, k) {
            if !frame.is_usable() {
                k += step;
                continue;
            }
            if !target.matches(frame) && within(frame) {
                k += step;
                continue;
            }
            break;
        }
        match frame_at(frames, k) {
            Some(frame) if frame.is_usable() && target.matches(frame) && within(frame) => {
                out.push(Some(k as usize));
            }
            _ => out.push(None),
        }
        if (0..len).contains(&k) {
            k += step;
        }
    }
    out
}
