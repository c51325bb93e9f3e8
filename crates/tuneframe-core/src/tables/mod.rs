//! Static configuration tables: observing sequences, mechanism positions and
//! sensor geometries. Loaded once and held as process-wide read-only state.

mod geometry;
mod sequences;

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::OnceLock;

use serde::Deserialize;
use tracing::debug;

use crate::error::{Result, TuneframeError};

pub use geometry::{CropSpec, Quadrant, QuadrantLayout, ReadoutMode, SensorGeometry};
pub use sequences::{CameraVariant, FrameRow, IdentifierOffset, SequenceDefinition};

pub const SEQUENCES_FILE: &str = "sequences.toml";
pub const WAVELENGTH_POSITIONS_FILE: &str = "wavelength_positions.toml";
pub const POLARIZATION_POSITIONS_FILE: &str = "polarization_positions.toml";
pub const GEOMETRIES_FILE: &str = "geometries.toml";

const BUILTIN_SEQUENCES: &str = include_str!("../../data/sequences.toml");
const BUILTIN_WAVELENGTH_POSITIONS: &str = include_str!("../../data/wavelength_positions.toml");
const BUILTIN_POLARIZATION_POSITIONS: &str =
    include_str!("../../data/polarization_positions.toml");
const BUILTIN_GEOMETRIES: &str = include_str!("../../data/geometries.toml");

static TABLES: OnceLock<StaticTables> = OnceLock::new();

#[derive(Debug, Deserialize)]
struct PositionEntry<P> {
    index: i32,
    positions: P,
}

#[derive(Debug, Deserialize)]
struct PositionFile<P> {
    #[serde(default = "Vec::new")]
    entries: Vec<PositionEntry<P>>,
}

/// The four static tables, joined by the sequence resolver and the mask builder.
#[derive(Clone, Debug, Default)]
pub struct StaticTables {
    sequences: BTreeMap<i32, SequenceDefinition>,
    wavelength_positions: BTreeMap<i32, [i32; 4]>,
    polarization_positions: BTreeMap<i32, [i32; 3]>,
    geometries: BTreeMap<i32, SensorGeometry>,
}

impl StaticTables {
    /// Tables compiled into the library.
    pub fn builtin() -> Result<Self> {
        Self::from_sources(
            BUILTIN_SEQUENCES,
            BUILTIN_WAVELENGTH_POSITIONS,
            BUILTIN_POLARIZATION_POSITIONS,
            BUILTIN_GEOMETRIES,
        )
    }

    /// Load the four table files from a directory.
    pub fn from_dir(dir: &Path) -> Result<Self> {
        let read = |name: &str| {
            let path = dir.join(name);
            std::fs::read_to_string(&path).map_err(|source| TuneframeError::TableFile { path, source })
        };
        Self::from_sources(
            &read(SEQUENCES_FILE)?,
            &read(WAVELENGTH_POSITIONS_FILE)?,
            &read(POLARIZATION_POSITIONS_FILE)?,
            &read(GEOMETRIES_FILE)?,
        )
    }

    pub fn from_sources(
        sequences: &str,
        wavelength_positions: &str,
        polarization_positions: &str,
        geometries: &str,
    ) -> Result<Self> {
        let sequences: sequences::SequenceFile = parse(SEQUENCES_FILE, sequences)?;
        let wavelengths: PositionFile<[i32; 4]> =
            parse(WAVELENGTH_POSITIONS_FILE, wavelength_positions)?;
        let polarizations: PositionFile<[i32; 3]> =
            parse(POLARIZATION_POSITIONS_FILE, polarization_positions)?;
        let geometries: geometry::GeometryFile = parse(GEOMETRIES_FILE, geometries)?;
        for sequence in &sequences.sequences {
            for variant in [&sequence.front, &sequence.side] {
                if !(variant.cadence.is_finite() && variant.cadence > 0.0) {
                    return Err(TuneframeError::InvalidSequence {
                        id: sequence.id,
                        reason: format!("cadence must be positive, got {}", variant.cadence),
                    });
                }
            }
        }

        let tables = Self {
            sequences: sequences.sequences.into_iter().map(|s| (s.id, s)).collect(),
            wavelength_positions: wavelengths
                .entries
                .into_iter()
                .map(|e| (e.index, e.positions))
                .collect(),
            polarization_positions: polarizations
                .entries
                .into_iter()
                .map(|e| (e.index, e.positions))
                .collect(),
            geometries: geometries.geometries.into_iter().map(|g| (g.id, g)).collect(),
        };
        debug!(
            sequences = tables.sequences.len(),
            wavelength_positions = tables.wavelength_positions.len(),
            polarization_positions = tables.polarization_positions.len(),
            geometries = tables.geometries.len(),
            "Static tables loaded"
        );
        Ok(tables)
    }

    pub fn sequence(&self, id: i32) -> Option<&SequenceDefinition> {
        self.sequences.get(&id)
    }

    pub fn sequences(&self) -> impl Iterator<Item = &SequenceDefinition> {
        self.sequences.values()
    }

    pub fn wavelength_positions(&self, index: i32) -> Option<[i32; 4]> {
        self.wavelength_positions.get(&index).copied()
    }

    pub fn polarization_positions(&self, index: i32) -> Option<[i32; 3]> {
        self.polarization_positions.get(&index).copied()
    }

    pub fn geometry(&self, id: i32) -> Option<&SensorGeometry> {
        self.geometries.get(&id)
    }

    pub fn geometries(&self) -> impl Iterator<Item = &SensorGeometry> {
        self.geometries.values()
    }

    pub fn insert_sequence(&mut self, sequence: SequenceDefinition) {
        self.sequences.insert(sequence.id, sequence);
    }

    pub fn insert_geometry(&mut self, geometry: SensorGeometry) {
        self.geometries.insert(geometry.id, geometry);
    }
}

fn parse<T: serde::de::DeserializeOwned>(name: &str, contents: &str) -> Result<T> {
    toml::from_str(contents).map_err(|source| TuneframeError::InvalidTable {
        name: name.to_string(),
        source,
    })
}

/// Install the process-wide tables. The first call wins; later calls return
/// the tables already installed.
pub fn init(tables: StaticTables) -> &'static StaticTables {
    TABLES.get_or_init(|| tables)
}

/// Process-wide tables installed by [`init`].
pub fn get() -> Result<&'static StaticTables> {
    TABLES.get().ok_or(TuneframeError::TablesNotInitialised)
}
