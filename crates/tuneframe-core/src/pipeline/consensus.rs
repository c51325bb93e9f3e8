use crate::frame::{Camera, FrameHeader};

use super::config::LimbConfig;

/// Median limb geometry of a reference set of frames. Frames whose fit
/// strays from it are rejected from interpolation.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LimbConsensus {
    pub x0: f64,
    pub y0: f64,
    pub rsun: f64,
    /// Camera the median was taken on.
    pub camera: Camera,
}

impl LimbConsensus {
    /// Median of the finite fits of `frames`. `None` when none has a finite fit.
    pub fn from_frames<'a>(frames: impl IntoIterator<Item = &'a FrameHeader>) -> Option<Self> {
        let mut xs = Vec::new();
        let mut ys = Vec::new();
        let mut rs = Vec::new();
        let mut camera = None;
        for frame in frames {
            let limb = frame.limb;
            if limb.x0.is_finite() && limb.y0.is_finite() && limb.rsun.is_finite() {
                xs.push(limb.x0);
                ys.push(limb.y0);
                rs.push(limb.rsun);
                camera.get_or_insert(frame.camera);
            }
        }
        Some(Self {
            x0: median(&mut xs)?,
            y0: median(&mut ys)?,
            rsun: median(&mut rs)?,
            camera: camera?,
        })
    }

    /// Whether a frame's fit agrees with the consensus. With `combine_cameras`
    /// a frame of the other camera is compared after shifting by the camera offset.
    pub fn accepts(&self, frame: &FrameHeader, config: &LimbConfig, combine_cameras: bool) -> bool {
        let limb = frame.limb;
        if limb.rsun.is_nan() || (limb.rsun - self.rsun).abs() > config.radius_factor * config.tolerance {
            return false;
        }
        let (mut x, mut y) = (self.x0, self.y0);
        if combine_cameras && frame.camera != self.camera {
            let [dx, dy] = config.camera_offset;
            match self.camera {
                Camera::Front => {
                    x -= dx;
                    y -= dy;
                }
                Camera::Side => {
                    x += dx;
                    y += dy;
                }
            }
        }
        !limb.x0.is_nan()
            && !limb.y0.is_nan()
            && (limb.x0 - x).abs() <= config.tolerance
            && (limb.y0 - y).abs() <= config.tolerance
    }
}

fn median(values: &mut [f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    values.sort_by(f64::total_cmp);
    let mid = values.len() / 2;
    Some(if values.len() % 2 == 0 {
        (values[mid - 1] + values[mid]) / 2.0
    } else {
        values[mid]
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::{LimbGeometry, TuningState};

    fn frame(camera: Camera, x0: f64, y0: f64, rsun: f64) -> FrameHeader {
        FrameHeader {
            index: 0,
            record_id: 0,
            time: 0.0,
            tuning: TuningState::default(),
            camera,
            focus: 0,
            quality: 0,
            sequence_id: 0,
            wavelength_table_id: 0,
            polarization_table_id: 0,
            filter_id: 0,
            framelist_position: 0,
            geometry_id: 0,
            limb: LimbGeometry { x0, y0, rsun },
            tuning_loop_open: false,
            keywords_complete: true,
        }
    }

    #[test]
    fn test_median_ignores_failed_fits() {
        let frames = [
            frame(Camera::Side, 10.0, 20.0, 100.0),
            frame(Camera::Side, 12.0, 22.0, 102.0),
            frame(Camera::Side, 50.0, 21.0, 101.0),
            frame(Camera::Side, f64::NAN, 0.0, 0.0),
        ];
        let consensus = LimbConsensus::from_frames(&frames).unwrap();
        assert_eq!(consensus.x0, 12.0);
        assert_eq!(consensus.y0, 21.0);
        assert_eq!(consensus.rsun, 101.0);
        assert_eq!(consensus.camera, Camera::Side);

        let failed = [frame(Camera::Side, f64::NAN, f64::NAN, f64::NAN)];
        assert!(LimbConsensus::from_frames(&failed).is_none());
    }

    #[test]
    fn test_tolerances() {
        let config = LimbConfig::default();
        let consensus = LimbConsensus::from_frames(&[frame(Camera::Side, 10.0, 20.0, 100.0)]).unwrap();

        assert!(consensus.accepts(&frame(Camera::Side, 10.7, 19.3, 101.4), &config, false));
        assert!(!consensus.accepts(&frame(Camera::Side, 10.9, 20.0, 100.0), &config, false));
        assert!(!consensus.accepts(&frame(Camera::Side, 10.0, 20.0, 101.5), &config, false));
        assert!(!consensus.accepts(&frame(Camera::Side, 10.0, 20.0, f64::NAN), &config, false));
    }

    #[test]
    fn test_other_camera_is_shifted() {
        let config = LimbConfig::default();
        let [dx, dy] = config.camera_offset;
        let consensus = LimbConsensus::from_frames(&[frame(Camera::Side, 10.0, 20.0, 100.0)]).unwrap();
        let front = frame(Camera::Front, 10.0 + dx, 20.0 + dy, 100.0);

        assert!(consensus.accepts(&front, &config, true));
        assert!(!consensus.accepts(&front, &config, false));
    }
}
