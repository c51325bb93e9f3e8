use serde::{Deserialize, Serialize};

use crate::consts::{
    DEFAULT_LIMB_TOLERANCE, DEFAULT_STEP_SECONDS, DEFAULT_TEMPERATURES, FRONT_SIDE_CENTRE_OFFSET,
    INTERPOLATION_PAD_SECONDS, INTERPOLATION_SPAN_FACTOR, LIMB_RADIUS_TOLERANCE_FACTOR,
};
use crate::error::{Result, TuneframeError};
use crate::frame::{Camera, Temperatures};
use crate::locate::{SearchWindow, WindowSplit};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AssemblyConfig {
    /// First target time, in seconds.
    pub begin: f64,
    /// Last target time (inclusive).
    pub end: f64,
    /// Spacing of target times.
    pub step: f64,
    /// Tuning family index of the reference wavelength.
    pub reference_wavelength: usize,
    pub camera: Camera,
    pub expectations: SequenceExpectations,
    pub interpolation: InterpolationConfig,
    pub limb: LimbConfig,
    /// Wavelengths to calibrate. All wavelengths of the sequence when absent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wavelengths: Option<Vec<usize>>,
    pub default_temperatures: Temperatures,
}

impl Default for AssemblyConfig {
    fn default() -> Self {
        Self {
            begin: 0.0,
            end: 0.0,
            step: DEFAULT_STEP_SECONDS,
            reference_wavelength: 3,
            camera: Camera::Side,
            expectations: SequenceExpectations::default(),
            interpolation: InterpolationConfig::default(),
            limb: LimbConfig::default(),
            wavelengths: None,
            default_temperatures: Temperatures {
                front: DEFAULT_TEMPERATURES[0],
                side: DEFAULT_TEMPERATURES[1],
            },
        }
    }
}

/// What the resolved sequence must look like. A `None` skips that check.
///
/// A config file without an `[expectations]` table gets the defaults; a
/// table that is present lists exactly the checks to run.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SequenceExpectations {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cadence: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channels: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub npol: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub polarization_type: Option<i32>,
}

impl Default for SequenceExpectations {
    fn default() -> Self {
        Self {
            cadence: Some(45.0),
            channels: Some(12),
            npol: Some(2),
            polarization_type: Some(2),
        }
    }
}

impl SequenceExpectations {
    /// No checks at all.
    pub fn none() -> Self {
        Self {
            cadence: None,
            channels: None,
            npol: None,
            polarization_type: None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InterpolationConfig {
    /// Averaging span the interpolation set must cover, in seconds.
    pub averaging_span: f64,
    /// Samples per channel. Derived from the span and cadence when absent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub points: Option<usize>,
    /// Fewest samples a channel may have. Two fewer than `points` when absent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_points: Option<usize>,
    pub window_split: WindowSplit,
}

impl Default for InterpolationConfig {
    fn default() -> Self {
        Self {
            averaging_span: DEFAULT_STEP_SECONDS,
            points: None,
            min_points: None,
            window_split: WindowSplit::default(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LimbConfig {
    /// Largest centre deviation from the consensus, in pixels.
    pub tolerance: f64,
    /// Radius tolerance as a multiple of `tolerance`.
    pub radius_factor: f64,
    /// Disk centre of the front camera relative to the side camera.
    pub camera_offset: [f64; 2],
}

impl Default for LimbConfig {
    fn default() -> Self {
        Self {
            tolerance: DEFAULT_LIMB_TOLERANCE,
            radius_factor: LIMB_RADIUS_TOLERANCE_FACTOR,
            camera_offset: FRONT_SIDE_CENTRE_OFFSET,
        }
    }
}

impl AssemblyConfig {
    /// Reject settings no slot could be assembled with.
    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: String| Err(TuneframeError::InvalidConfig(msg));
        if !self.begin.is_finite() || !self.end.is_finite() {
            return invalid("begin and end must be finite".into());
        }
        if self.end < self.begin {
            return invalid(format!("end {} is before begin {}", self.end, self.begin));
        }
        if !(self.step > 0.0) {
            return invalid(format!("step must be positive, got {}", self.step));
        }
        if !(self.interpolation.averaging_span > 0.0) {
            return invalid("averaging span must be positive".into());
        }
        if let Some(points) = self.interpolation.points {
            if points < 2 {
                return invalid(format!("at least 2 interpolation points are needed, got {points}"));
            }
            if self.interpolation.min_points.is_some_and(|min| min > points) {
                return invalid("min_points exceeds points".into());
            }
        }
        if self.expectations.cadence.is_some_and(|c| !(c > 0.0)) {
            return invalid("expected cadence must be positive".into());
        }
        if !(self.limb.tolerance > 0.0) || !(self.limb.radius_factor > 0.0) {
            return invalid("limb tolerances must be positive".into());
        }
        if self.wavelengths.as_ref().is_some_and(|w| w.is_empty()) {
            return invalid("wavelength selection is empty".into());
        }
        Ok(())
    }

    /// Samples per channel for a sequence with the given cadence: enough to
    /// span the averaging window plus padding, rounded up to an even count.
    pub fn interpolation_points(&self, cadence: f64) -> usize {
        if let Some(points) = self.interpolation.points {
            return points;
        }
        let span = self.interpolation.averaging_span * INTERPOLATION_SPAN_FACTOR + INTERPOLATION_PAD_SECONDS;
        let n = (span / cadence).ceil().max(2.0) as usize;
        n.saturating_add(n % 2)
    }

    pub fn minimum_points(&self, points: usize) -> usize {
        self.interpolation
            .min_points
            .unwrap_or_else(|| points.saturating_sub(2))
            .min(points)
    }

    /// Time added on both sides of the run when querying headers, so the
    /// first and last slots see their whole window. Also the eviction margin.
    pub fn query_padding(&self, max_cadence: f64) -> f64 {
        let span = self.interpolation.averaging_span * INTERPOLATION_SPAN_FACTOR
            + INTERPOLATION_PAD_SECONDS
            + 2.0 * max_cadence;
        let window = SearchWindow::for_points(0.0, self.interpolation_points(max_cadence), max_cadence);
        span.max(window.left.max(window.right) + max_cadence)
    }

    /// Target times from `begin` to `end`, `step` apart.
    pub fn target_times(&self) -> Vec<f64> {
        let count = ((self.end - self.begin) / self.step + 1e-9).floor().max(0.0) as usize + 1;
        (0..count).map(|i| self.begin + i as f64 * self.step).collect()
    }
}
