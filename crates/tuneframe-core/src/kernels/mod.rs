//! Numeric kernels the engine hands pixels to: gap filling, temporal
//! interpolation and polarization calibration.

pub mod cpu;

use ndarray::Array2;

use crate::error::Result;
use crate::frame::{Camera, LimbGeometry, Temperatures};
use crate::mask::ValidityMask;

pub use cpu::CpuKernels;

/// Per-pixel error codes written by the kernels.
pub mod pixel_error {
    pub const NONE: u8 = 0;
    pub const FILLED: u8 = 1;
    pub const UNFILLED: u8 = 2;
    pub const EXCLUDED: u8 = 3;
}

/// Status a kernel reports alongside its output. A failure here degrades
/// or empties the slot; an `Err` from a kernel aborts the run.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum KernelStatus {
    Success,
    Failed(i32),
}

impl KernelStatus {
    pub fn is_success(self) -> bool {
        matches!(self, Self::Success)
    }
}

#[derive(Clone, Debug)]
pub struct GapFilled {
    pub image: Array2<f32>,
    pub errors: Array2<u8>,
    pub status: KernelStatus,
}

/// Time and geometry of a frame, or of the interpolation target.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FrameGeometry {
    pub time: f64,
    pub camera: Camera,
    pub limb: LimbGeometry,
}

#[derive(Clone, Copy)]
pub struct InterpolationFrame<'a> {
    pub image: &'a Array2<f32>,
    pub errors: &'a Array2<u8>,
    pub geometry: FrameGeometry,
}

#[derive(Clone, Debug)]
pub struct Interpolated {
    pub image: Array2<f32>,
    pub errors: Array2<u8>,
    pub status: KernelStatus,
}

/// Interpolated channels of one wavelength.
pub struct CalibrationInput<'a> {
    pub wavelength: usize,
    /// Channel images in framelist order.
    pub images: Vec<&'a Array2<f32>>,
    /// Commanded polarization positions of each channel.
    pub polarization: Vec<[i32; 3]>,
    pub polarization_type: i32,
    pub temperatures: Temperatures,
}

#[derive(Clone, Debug)]
pub struct Calibrated {
    /// Named output images, e.g. `I3`, `V3`.
    pub images: Vec<(String, Array2<f32>)>,
    pub status: KernelStatus,
}

/// Kernel implementation used by the orchestrator. Calls from different
/// channels and wavelengths run concurrently.
pub trait Kernels: Send + Sync {
    fn name(&self) -> &str;

    fn gap_fill(&self, image: &Array2<f32>, mask: &ValidityMask) -> Result<GapFilled>;

    fn interpolate(&self, frames: &[InterpolationFrame<'_>], target: &FrameGeometry) -> Result<Interpolated>;

    fn calibrate(&self, input: &CalibrationInput<'_>) -> Result<Calibrated>;
}
