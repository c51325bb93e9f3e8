use serde::{Deserialize, Serialize};

use crate::frame::Camera;

/// Per-camera parameters of a sequence.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CameraVariant {
    /// Seconds between repetitions of the framelist.
    pub cadence: f64,
    /// Declared number of channels the camera takes part in.
    pub channels: usize,
    /// Whether the channels of both cameras are combined.
    pub combine: bool,
    /// Channels per wavelength.
    pub npol: usize,
    /// 1 = full Stokes, 2 = circular polarization only.
    pub polarization_type: i32,
}

/// One raw framelist position.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameRow {
    pub fid: i32,
    pub camera: Camera,
}

/// Shifts the identifiers of one block of a repeated framelist so that
/// duplicated tuning states stay distinguishable.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentifierOffset {
    /// Only requests for this camera use the rule.
    pub camera: Camera,
    pub period: i32,
    pub block: i32,
    pub selected: i32,
    pub offset: i32,
}

impl IdentifierOffset {
    pub fn applies_to(&self, camera: Camera) -> bool {
        self.camera == camera
    }

    /// Identifier of a frame or row at `position` within the framelist cycle.
    pub fn apply(&self, fid: i32, position: i32) -> i32 {
        if self.period <= 0 || self.block <= 0 {
            return fid;
        }
        if position.rem_euclid(self.period) / self.block == self.selected {
            fid + self.offset
        } else {
            fid
        }
    }
}

/// Row of the sequence table.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SequenceDefinition {
    pub id: i32,
    #[serde(default)]
    pub name: String,
    pub frames: Vec<FrameRow>,
    pub front: CameraVariant,
    pub side: CameraVariant,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identifier_offset: Option<IdentifierOffset>,
}

impl SequenceDefinition {
    pub fn variant(&self, camera: Camera) -> &CameraVariant {
        match camera {
            Camera::Front => &self.front,
            Camera::Side => &self.side,
        }
    }

    /// Raw framelist length, both cameras included.
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }
}

#[derive(Debug, Deserialize)]
pub(super) struct SequenceFile {
    #[serde(default, rename = "sequence")]
    pub sequences: Vec<SequenceDefinition>,
}
