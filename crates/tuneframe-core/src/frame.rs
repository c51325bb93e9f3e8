use ndarray::Array2;
use serde::{Deserialize, Serialize};

use crate::consts::{CAMERA_FRONT_ID, CAMERA_SIDE_ID};
use crate::quality::upstream;

/// One of the two physical cameras.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Camera {
    Front,
    Side,
}

impl Camera {
    pub fn hardware_id(self) -> i32 {
        match self {
            Self::Front => CAMERA_FRONT_ID,
            Self::Side => CAMERA_SIDE_ID,
        }
    }

    pub fn from_hardware_id(id: i32) -> Option<Self> {
        match id {
            CAMERA_FRONT_ID => Some(Self::Front),
            CAMERA_SIDE_ID => Some(Self::Side),
            _ => None,
        }
    }

    pub fn other(self) -> Self {
        match self {
            Self::Front => Self::Side,
            Self::Side => Self::Front,
        }
    }
}

impl std::fmt::Display for Camera {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Front => write!(f, "front"),
            Self::Side => write!(f, "side"),
        }
    }
}

/// Commanded mechanism positions: four wavelength selectors, three polarization selectors.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TuningState {
    pub wavelength: [i32; 4],
    pub polarization: [i32; 3],
}

/// Limb fit of a frame: disk centre and radius in pixels. NaN when the fit failed.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct LimbGeometry {
    pub x0: f64,
    pub y0: f64,
    pub rsun: f64,
}

impl Default for LimbGeometry {
    fn default() -> Self {
        Self {
            x0: f64::NAN,
            y0: f64::NAN,
            rsun: f64::NAN,
        }
    }
}

impl LimbGeometry {
    pub fn centre_known(&self) -> bool {
        !self.x0.is_nan() && !self.y0.is_nan()
    }
}

fn default_true() -> bool {
    true
}

/// Keywords of one raw exposure, as delivered by the frame source.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FrameHeader {
    /// Position in the source's time-ordered stream.
    #[serde(default)]
    pub index: usize,
    pub record_id: u64,
    /// Observation time in seconds.
    pub time: f64,
    pub tuning: TuningState,
    pub camera: Camera,
    /// Focus block id.
    pub focus: i32,
    /// Upstream quality bitfield.
    #[serde(default)]
    pub quality: u32,
    pub sequence_id: i32,
    pub wavelength_table_id: i32,
    pub polarization_table_id: i32,
    pub filter_id: i32,
    /// Position within the running framelist cycle.
    pub framelist_position: i32,
    pub geometry_id: i32,
    #[serde(default)]
    pub limb: LimbGeometry,
    #[serde(default)]
    pub tuning_loop_open: bool,
    /// False when any keyword the engine needs could not be read.
    #[serde(default = "default_true")]
    pub keywords_complete: bool,
}

impl FrameHeader {
    /// A frame takes part in matching only when its keywords are complete
    /// and its image segment was not flagged missing upstream.
    pub fn is_usable(&self) -> bool {
        self.keywords_complete && self.quality & upstream::MISSING_SEGMENT == 0
    }
}

/// Lazily loaded pixel data of a frame.
#[derive(Clone, Debug)]
pub struct FramePayload {
    pub image: Array2<f32>,
    /// Flat row-major indices of permanently bad pixels.
    pub permanent_defects: Vec<usize>,
    /// Flat indices of transient defects (cosmic-ray hits), when detected.
    pub transient_defects: Option<Vec<usize>>,
    /// Number of permanent defects that still apply once transient defects are known.
    pub defect_count_override: Option<usize>,
}

impl FramePayload {
    pub fn new(image: Array2<f32>) -> Self {
        Self {
            image,
            permanent_defects: Vec::new(),
            transient_defects: None,
            defect_count_override: None,
        }
    }

    pub fn dims(&self) -> (usize, usize) {
        self.image.dim()
    }
}

/// Instrument temperatures used by polarization calibration.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Temperatures {
    pub front: f64,
    pub side: f64,
}
