//! Per-pixel validity masks built from the sensor crop and defect lists.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use ndarray::{Array2, Zip};
use tracing::debug;

use crate::consts::PARALLEL_PIXEL_THRESHOLD;
use crate::error::{Result, TuneframeError};
use crate::frame::FramePayload;
use crate::tables::{CropSpec, SensorGeometry, StaticTables};

/// Tri-state value of one mask pixel.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum MaskValue {
    NotMissing = 0,
    MustFill = 1,
    Excluded = 2,
}

impl MaskValue {
    pub fn from_u8(v: u8) -> Self {
        match v {
            0 => Self::NotMissing,
            1 => Self::MustFill,
            _ => Self::Excluded,
        }
    }
}

/// Mask over a frame's pixel grid, stored as the `u8` codes of [`MaskValue`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ValidityMask {
    data: Array2<u8>,
}

impl ValidityMask {
    pub fn new(data: Array2<u8>) -> Self {
        Self { data }
    }

    pub fn get(&self, row: usize, col: usize) -> MaskValue {
        MaskValue::from_u8(self.data[[row, col]])
    }

    pub fn dims(&self) -> (usize, usize) {
        self.data.dim()
    }

    pub fn count(&self, value: MaskValue) -> usize {
        self.data.iter().filter(|&&v| v == value as u8).count()
    }

    pub fn as_array(&self) -> &Array2<u8> {
        &self.data
    }

    pub fn into_array(self) -> Array2<u8> {
        self.data
    }
}

/// Crop mask of a geometry for an image of `height` x `width`: active pixels
/// are `NotMissing`, everything else `Excluded`.
pub fn crop_mask(geometry: &SensorGeometry, height: usize, width: usize) -> Array2<u8> {
    let mut mask = Array2::from_elem((height, width), MaskValue::Excluded as u8);
    let layout = geometry.readout.layout();
    let lines = layout.line_factor * height / 2;
    let samples = layout.sample_factor * width / 2;
    let active_lines = lines.saturating_sub(geometry.overscan_rows / 2);
    let active_samples = samples.saturating_sub(geometry.overscan_columns / 2);
    let skip_y = geometry.overscan_rows / 2;
    let skip_x = geometry.overscan_columns / 2;

    for (k, quadrant) in layout.quadrants.iter().enumerate() {
        let place = |corner: usize, extent: usize, offset: usize| -> Option<usize> {
            let pos = if corner == 0 {
                Some(offset)
            } else {
                extent.checked_sub(offset + 1)
            };
            pos.filter(|&p| p < extent)
        };

        for j in 0..active_lines {
            let Some(row) = place(quadrant.y_corner, height, j + skip_y) else {
                continue;
            };
            let columns = |i: usize| place(quadrant.x_corner, width, i + skip_x);
            let (skip, take) = match &geometry.crop {
                CropSpec::Full => (0, active_samples),
                CropSpec::Runs { skip, take } => {
                    let line = k * active_lines + j;
                    (
                        skip.get(line).copied().unwrap_or(active_samples),
                        take.get(line).copied().unwrap_or(0),
                    )
                }
                CropSpec::Circle { radius_fraction } => {
                    circle_run(*radius_fraction, height, width, row, active_samples, &columns)
                }
            };
            let end = skip.saturating_add(take).min(active_samples);
            for i in skip..end {
                if let Some(col) = columns(i) {
                    mask[[row, col]] = MaskValue::NotMissing as u8;
                }
            }
        }
    }
    mask
}

/// Skip/take run of one quadrant line inside a disk centred on the image.
fn circle_run(
    radius_fraction: f64,
    height: usize,
    width: usize,
    row: usize,
    samples: usize,
    columns: impl Fn(usize) -> Option<usize>,
) -> (usize, usize) {
    let cy = (height as f64 - 1.0) / 2.0;
    let cx = (width as f64 - 1.0) / 2.0;
    let radius = radius_fraction * height.min(width) as f64 / 2.0;
    let dy = row as f64 - cy;
    let inside = |i: usize| {
        columns(i).is_some_and(|col| {
            let dx = col as f64 - cx;
            dx * dx + dy * dy <= radius * radius
        })
    };
    match (0..samples).position(inside) {
        Some(skip) => {
            let take = (skip..samples).take_while(|&i| inside(i)).count();
            (skip, take)
        }
        None => (samples, 0),
    }
}

fn mark_defects(mask: &mut Array2<u8>, defects: &[usize]) {
    let width = mask.ncols();
    let total = mask.len();
    for &idx in defects {
        if idx >= total {
            continue;
        }
        let cell = &mut mask[[idx / width, idx % width]];
        if *cell == MaskValue::NotMissing as u8 {
            *cell = MaskValue::MustFill as u8;
        }
    }
}

/// Builds validity masks, memoising the crop mask of every geometry and size.
pub struct MaskBuilder<'a> {
    tables: &'a StaticTables,
    crops: Mutex<HashMap<(i32, usize, usize), Arc<Array2<u8>>>>,
}

impl<'a> MaskBuilder<'a> {
    pub fn new(tables: &'a StaticTables) -> Self {
        Self {
            tables,
            crops: Mutex::new(HashMap::new()),
        }
    }

    /// Crop mask for a geometry id and image size, built once per pair.
    pub fn crop(&self, geometry_id: i32, height: usize, width: usize) -> Result<Arc<Array2<u8>>> {
        let key = (geometry_id, height, width);
        if let Some(mask) = self.lock().get(&key) {
            return Ok(Arc::clone(mask));
        }
        let geometry = self
            .tables
            .geometry(geometry_id)
            .ok_or(TuneframeError::UnknownGeometry(geometry_id))?;
        let mask = Arc::new(crop_mask(geometry, height, width));
        debug!(geometry_id, height, width, readout = %geometry.readout, "Built crop mask");
        self.lock().insert(key, Arc::clone(&mask));
        Ok(mask)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<(i32, usize, usize), Arc<Array2<u8>>>> {
        self.crops.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Mask of one frame.
    ///
    /// Non-finite pixels and listed defects inside the crop must be filled.
    /// When a transient list exists, `count_override` limits how many
    /// permanent defects apply. Defect indices outside the image are ignored.
    pub fn build_mask(
        &self,
        permanent: &[usize],
        transient: Option<&[usize]>,
        count_override: Option<usize>,
        geometry_id: i32,
        image: &Array2<f32>,
    ) -> Result<ValidityMask> {
        let (height, width) = image.dim();
        let mut mask = self.crop(geometry_id, height, width)?.as_ref().clone();

        let flag_non_finite = |m: &mut u8, &v: &f32| {
            if *m == MaskValue::NotMissing as u8 && !v.is_finite() {
                *m = MaskValue::MustFill as u8;
            }
        };
        if height * width >= PARALLEL_PIXEL_THRESHOLD {
            Zip::from(&mut mask).and(image).par_for_each(flag_non_finite);
        } else {
            Zip::from(&mut mask).and(image).for_each(flag_non_finite);
        }

        let permanent_count = match (transient, count_override) {
            (Some(_), Some(n)) => n.min(permanent.len()),
            _ => permanent.len(),
        };
        mark_defects(&mut mask, &permanent[..permanent_count]);
        if let Some(transient) = transient {
            mark_defects(&mut mask, transient);
        }
        Ok(ValidityMask::new(mask))
    }

    pub fn build_for_payload(&self, payload: &FramePayload, geometry_id: i32) -> Result<ValidityMask> {
        self.build_mask(
            &payload.permanent_defects,
            payload.transient_defects.as_deref(),
            payload.defect_count_override,
            geometry_id,
            &payload.image,
        )
    }
}
