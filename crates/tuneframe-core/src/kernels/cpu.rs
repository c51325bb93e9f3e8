use ndarray::Array2;
use rayon::prelude::*;

use crate::consts::PARALLEL_PIXEL_THRESHOLD;
use crate::error::{Result, TuneframeError};
use crate::mask::{MaskValue, ValidityMask};

use super::{
    pixel_error, CalibrationInput, Calibrated, FrameGeometry, GapFilled, InterpolationFrame,
    Interpolated, KernelStatus, Kernels,
};

/// Status code reported when a kernel receives no usable input.
const STATUS_NO_INPUT: i32 = -1;

/// Status code reported when input images disagree in size.
const STATUS_SHAPE_MISMATCH: i32 = -2;

/// Reference kernels on the CPU using Rayon for row parallelism.
///
/// Gap filling averages valid 4-neighbours, interpolation is a Gaussian
/// time-weighted mean and calibration a fixed demodulation. None of them
/// model the instrument.
pub struct CpuKernels;

impl Kernels for CpuKernels {
    fn name(&self) -> &str {
        "CPU/Rayon"
    }

    fn gap_fill(&self, image: &Array2<f32>, mask: &ValidityMask) -> Result<GapFilled> {
        let (h, w) = image.dim();
        if mask.dims() != (h, w) {
            return Err(TuneframeError::Kernel {
                kernel: "gap_fill".into(),
                reason: format!("mask is {:?}, image is {:?}", mask.dims(), (h, w)),
            });
        }

        let fill_row = |r: usize| -> (Vec<f32>, Vec<u8>) {
            let mut values = Vec::with_capacity(w);
            let mut codes = Vec::with_capacity(w);
            for c in 0..w {
                let (v, e) = match mask.get(r, c) {
                    MaskValue::NotMissing => (image[[r, c]], pixel_error::NONE),
                    MaskValue::Excluded => (f32::NAN, pixel_error::EXCLUDED),
                    MaskValue::MustFill => fill_pixel(image, mask, r, c),
                };
                values.push(v);
                codes.push(e);
            }
            (values, codes)
        };

        let rows: Vec<(Vec<f32>, Vec<u8>)> = if h * w >= PARALLEL_PIXEL_THRESHOLD {
            (0..h).into_par_iter().map(fill_row).collect()
        } else {
            (0..h).map(fill_row).collect()
        };

        let mut filled = Array2::<f32>::zeros((h, w));
        let mut errors = Array2::<u8>::zeros((h, w));
        for (r, (values, codes)) in rows.into_iter().enumerate() {
            for c in 0..w {
                filled[[r, c]] = values[c];
                errors[[r, c]] = codes[c];
            }
        }

        let unfilled = errors.iter().filter(|&&e| e == pixel_error::UNFILLED).count();
        let status = if unfilled == 0 {
            KernelStatus::Success
        } else {
            KernelStatus::Failed(unfilled as i32)
        };
        Ok(GapFilled {
            image: filled,
            errors,
            status,
        })
    }

    fn interpolate(&self, frames: &[InterpolationFrame<'_>], target: &FrameGeometry) -> Result<Interpolated> {
        let Some(first) = frames.first() else {
            return Ok(Interpolated {
                image: Array2::zeros((0, 0)),
                errors: Array2::zeros((0, 0)),
                status: KernelStatus::Failed(STATUS_NO_INPUT),
            });
        };
        let (h, w) = first.image.dim();
        if frames.iter().any(|f| f.image.dim() != (h, w) || f.errors.dim() != (h, w)) {
            return Ok(Interpolated {
                image: Array2::zeros((h, w)),
                errors: Array2::zeros((h, w)),
                status: KernelStatus::Failed(STATUS_SHAPE_MISMATCH),
            });
        }

        let weights = time_weights(frames, target.time);

        let interpolate_row = |r: usize| -> (Vec<f32>, Vec<u8>) {
            let mut values = Vec::with_capacity(w);
            let mut codes = Vec::with_capacity(w);
            for c in 0..w {
                let mut sum = 0.0f64;
                let mut norm = 0.0f64;
                for (frame, &weight) in frames.iter().zip(&weights) {
                    let v = frame.image[[r, c]];
                    if v.is_finite() && frame.errors[[r, c]] <= pixel_error::FILLED {
                        sum += weight * v as f64;
                        norm += weight;
                    }
                }
                if norm > 0.0 {
                    values.push((sum / norm) as f32);
                    codes.push(pixel_error::NONE);
                } else {
                    values.push(f32::NAN);
                    codes.push(pixel_error::UNFILLED);
                }
            }
            (values, codes)
        };

        let rows: Vec<(Vec<f32>, Vec<u8>)> = if h * w >= PARALLEL_PIXEL_THRESHOLD {
            (0..h).into_par_iter().map(interpolate_row).collect()
        } else {
            (0..h).map(interpolate_row).collect()
        };

        let mut image = Array2::<f32>::zeros((h, w));
        let mut errors = Array2::<u8>::zeros((h, w));
        for (r, (values, codes)) in rows.into_iter().enumerate() {
            for c in 0..w {
                image[[r, c]] = values[c];
                errors[[r, c]] = codes[c];
            }
        }
        Ok(Interpolated {
            image,
            errors,
            status: KernelStatus::Success,
        })
    }

    fn calibrate(&self, input: &CalibrationInput<'_>) -> Result<Calibrated> {
        let failed = |code| Calibrated {
            images: Vec::new(),
            status: KernelStatus::Failed(code),
        };
        let Some(first) = input.images.first() else {
            return Ok(failed(STATUS_NO_INPUT));
        };
        let dim = first.dim();
        if input.images.iter().any(|img| img.dim() != dim) {
            return Ok(failed(STATUS_SHAPE_MISMATCH));
        }

        let c = &input.images;
        let w = input.wavelength;
        let n = c.len() as f32;
        let intensity = c.iter().fold(Array2::<f32>::zeros(dim), |acc, img| acc + *img) / n;

        let mut images = vec![(format!("I{w}"), intensity)];
        if input.polarization_type == 1 && c.len() >= 4 {
            images.push((format!("Q{w}"), (c[0] - c[1]) / 2.0));
            images.push((format!("U{w}"), (c[2] - c[3]) / 2.0));
            images.push((format!("V{w}"), ((c[0] + c[1]) - (c[2] + c[3])) / 4.0));
        } else if c.len() >= 2 {
            images.push((format!("V{w}"), (c[0] - c[1]) / 2.0));
        }
        Ok(Calibrated {
            images,
            status: KernelStatus::Success,
        })
    }
}

/// Mean of the finite, not-missing 4-neighbours of a pixel.
fn fill_pixel(image: &Array2<f32>, mask: &ValidityMask, r: usize, c: usize) -> (f32, u8) {
    let (h, w) = image.dim();
    let neighbours = [
        (r.wrapping_sub(1), c),
        (r + 1, c),
        (r, c.wrapping_sub(1)),
        (r, c + 1),
    ];
    let mut sum = 0.0f64;
    let mut count = 0usize;
    for (nr, nc) in neighbours {
        if nr >= h || nc >= w || mask.get(nr, nc) != MaskValue::NotMissing {
            continue;
        }
        let v = image[[nr, nc]];
        if v.is_finite() {
            sum += v as f64;
            count += 1;
        }
    }
    if count == 0 {
        (f32::NAN, pixel_error::UNFILLED)
    } else {
        ((sum / count as f64) as f32, pixel_error::FILLED)
    }
}

/// Gaussian weights in time, with the width set by the frames' spread.
fn time_weights(frames: &[InterpolationFrame<'_>], target_time: f64) -> Vec<f64> {
    let first = frames.iter().map(|f| f.geometry.time).fold(f64::INFINITY, f64::min);
    let last = frames.iter().map(|f| f.geometry.time).fold(f64::NEG_INFINITY, f64::max);
    let sigma = ((last - first) / 2.0).max(1.0);
    frames
        .iter()
        .map(|f| {
            let dt = (f.geometry.time - target_time) / sigma;
            (-dt * dt).exp()
        })
        .collect()
}
