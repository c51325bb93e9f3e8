use serde::{Deserialize, Serialize};

/// Which read-out quadrants of the sensor are active.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ReadoutMode {
    #[serde(rename = "EFGH")]
    Efgh,
    #[serde(rename = "EF")]
    Ef,
    #[serde(rename = "FG")]
    Fg,
    #[serde(rename = "GH")]
    Gh,
    #[serde(rename = "HE")]
    He,
    E,
    F,
    G,
    H,
}

/// One read-out quadrant: the corner it starts from.
///
/// A corner flag of 0 means the quadrant is read from the low edge in
/// increasing index order, 1 from the high edge in decreasing order.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Quadrant {
    pub x_corner: usize,
    pub y_corner: usize,
}

/// Quadrant arrangement of a read-out mode.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct QuadrantLayout {
    pub quadrants: Vec<Quadrant>,
    /// Lines per quadrant, in units of half the image height.
    pub line_factor: usize,
    /// Samples per line, in units of half the image width.
    pub sample_factor: usize,
}

impl ReadoutMode {
    fn encoding(self) -> &'static [usize] {
        match self {
            Self::Efgh => &[4, 0, 0, 1, 0, 1, 1, 0, 1, 1, 1],
            Self::Ef => &[2, 0, 0, 1, 0, 2, 1],
            Self::Fg => &[2, 1, 0, 1, 1, 1, 2],
            Self::Gh => &[2, 1, 1, 0, 1, 2, 1],
            Self::He => &[2, 0, 1, 0, 0, 1, 2],
            Self::E => &[1, 0, 0, 2, 2],
            Self::F => &[1, 1, 0, 2, 2],
            Self::G => &[1, 1, 1, 2, 2],
            Self::H => &[1, 0, 1, 2, 2],
        }
    }

    pub fn layout(self) -> QuadrantLayout {
        let code = self.encoding();
        let nq = code[0];
        let quadrants = (0..nq)
            .map(|k| Quadrant {
                x_corner: code[2 * k + 1],
                y_corner: code[2 * k + 2],
            })
            .collect();
        QuadrantLayout {
            quadrants,
            line_factor: code[2 * nq + 1],
            sample_factor: code[2 * nq + 2],
        }
    }
}

impl std::fmt::Display for ReadoutMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Efgh => "EFGH",
            Self::Ef => "EF",
            Self::Fg => "FG",
            Self::Gh => "GH",
            Self::He => "HE",
            Self::E => "E",
            Self::F => "F",
            Self::G => "G",
            Self::H => "H",
        };
        write!(f, "{name}")
    }
}

/// Active region of each quadrant line, after overscan is removed.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CropSpec {
    /// Every line is taken whole.
    #[default]
    Full,
    /// Disk centred on the image, radius as a fraction of the shorter half-axis.
    Circle { radius_fraction: f64 },
    /// Explicit skip/take runs, quadrant-major, one pair per active line.
    /// Lines without a run are excluded.
    Runs { skip: Vec<usize>, take: Vec<usize> },
}

impl std::fmt::Display for CropSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Full => write!(f, "full"),
            Self::Circle { radius_fraction } => write!(f, "circle ({radius_fraction:.2})"),
            Self::Runs { skip, .. } => write!(f, "runs ({} lines)", skip.len()),
        }
    }
}

/// Row of the sensor-geometry table.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SensorGeometry {
    pub id: i32,
    pub readout: ReadoutMode,
    #[serde(default)]
    pub overscan_rows: usize,
    #[serde(default)]
    pub overscan_columns: usize,
    #[serde(default)]
    pub crop: CropSpec,
}

#[derive(Debug, Deserialize)]
pub(super) struct GeometryFile {
    #[serde(default, rename = "geometry")]
    pub geometries: Vec<SensorGeometry>,
}
