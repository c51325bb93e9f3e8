use std::cell::Cell;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};

use ndarray::Array2;
use tuneframe_core::consts::FRONT_SIDE_CENTRE_OFFSET;
use tuneframe_core::error::Result;
use tuneframe_core::frame::{Camera, FrameHeader, FramePayload, LimbGeometry, Temperatures};
use tuneframe_core::kernels::{
    CalibrationInput, Calibrated, CpuKernels, FrameGeometry, GapFilled, InterpolationFrame, Interpolated,
    Kernels,
};
use tuneframe_core::mask::ValidityMask;
use tuneframe_core::sequence::{resolve_sequence, ChannelEntry, SequenceRequest};
use tuneframe_core::store::{FrameSource, ProductRecord, ProductSink};
use tuneframe_core::tables::StaticTables;

/// Wavelength tuning table id used by synthetic streams.
pub const HWLTID: i32 = 23;
/// Polarization tuning table id used by synthetic streams.
pub const HPLTID: i32 = 20;
/// Reference wavelength index used by synthetic streams.
pub const REFERENCE_WAVELENGTH: usize = 3;
/// Side length of synthetic images.
pub const IMAGE_SIZE: usize = 8;
/// Full-frame sensor geometry in the built-in table.
pub const FULL_GEOMETRY: i32 = 81;

pub fn builtin_tables() -> StaticTables {
    StaticTables::builtin().expect("built-in tables parse")
}

/// Channel entry of every framelist position, both cameras.
pub fn entries_by_location(tables: &StaticTables, sequence_id: i32) -> BTreeMap<usize, ChannelEntry> {
    let mut merged = BTreeMap::new();
    for camera in [Camera::Front, Camera::Side] {
        let request = SequenceRequest {
            sequence_id,
            wavelength_table_id: HWLTID,
            polarization_table_id: HPLTID,
            reference_wavelength: REFERENCE_WAVELENGTH,
            camera,
        };
        let layout = resolve_sequence(tables, &request).expect("sequence resolves");
        for entry in layout.entries {
            merged.entry(entry.location).or_insert(entry);
        }
    }
    merged
}

/// Limb fit of a synthetic frame: centred on the front camera, shifted by
/// the camera offset on the side camera.
pub fn synthetic_limb(camera: Camera) -> LimbGeometry {
    let c = (IMAGE_SIZE as f64 - 1.0) / 2.0;
    match camera {
        Camera::Front => LimbGeometry { x0: c, y0: c, rsun: 3.0 },
        Camera::Side => LimbGeometry {
            x0: c - FRONT_SIDE_CENTRE_OFFSET[0],
            y0: c - FRONT_SIDE_CENTRE_OFFSET[1],
            rsun: 3.0,
        },
    }
}

/// Headers of `cycles` repetitions of a sequence starting at `start`, with the
/// framelist spread evenly over each cadence.
pub fn synthetic_stream(tables: &StaticTables, sequence_id: i32, start: f64, cycles: usize) -> Vec<FrameHeader> {
    let definition = tables.sequence(sequence_id).expect("sequence exists");
    let cadence = definition.front.cadence;
    let entries = entries_by_location(tables, sequence_id);
    let len = definition.len();

    let mut frames = Vec::with_capacity(cycles * len);
    for cycle in 0..cycles {
        for (location, row) in definition.frames.iter().enumerate() {
            let entry = &entries[&location];
            let index = frames.len();
            frames.push(FrameHeader {
                index,
                record_id: 1000 + index as u64,
                time: start + cycle as f64 * cadence + location as f64 * cadence / len as f64,
                tuning: entry.tuning,
                camera: row.camera,
                focus: 0,
                quality: 0,
                sequence_id,
                wavelength_table_id: HWLTID,
                polarization_table_id: HPLTID,
                filter_id: row.fid,
                framelist_position: location as i32,
                geometry_id: FULL_GEOMETRY,
                limb: synthetic_limb(row.camera),
                tuning_loop_open: false,
                keywords_complete: true,
            });
        }
    }
    frames
}

/// Uniform image whose value encodes the frame's record id.
pub fn synthetic_payload(header: &FrameHeader) -> FramePayload {
    let value = 100.0 + (header.record_id % 97) as f32;
    let mut payload = FramePayload::new(Array2::from_elem((IMAGE_SIZE, IMAGE_SIZE), value));
    payload.transient_defects = Some(Vec::new());
    payload
}

/// Frame source held in memory.
pub struct MemorySource {
    pub frames: Vec<FrameHeader>,
    pub payloads: HashMap<u64, FramePayload>,
    pub temperatures: Option<Temperatures>,
    loads: Cell<usize>,
}

impl MemorySource {
    /// Source with a synthetic payload for every frame.
    pub fn new(frames: Vec<FrameHeader>) -> Self {
        let payloads = frames.iter().map(|f| (f.record_id, synthetic_payload(f))).collect();
        Self {
            frames,
            payloads,
            temperatures: Some(Temperatures { front: 21.5, side: 22.0 }),
            loads: Cell::new(0),
        }
    }

    pub fn loads(&self) -> usize {
        self.loads.get()
    }
}

impl FrameSource for MemorySource {
    fn headers(&self, start: f64, end: f64) -> Result<Vec<FrameHeader>> {
        Ok(self
            .frames
            .iter()
            .filter(|f| f.time >= start && f.time <= end)
            .cloned()
            .collect())
    }

    fn load(&self, header: &FrameHeader) -> Result<Option<FramePayload>> {
        self.loads.set(self.loads.get() + 1);
        Ok(self.payloads.get(&header.record_id).cloned())
    }

    fn temperatures(&self, _time: f64) -> Result<Option<Temperatures>> {
        Ok(self.temperatures)
    }
}

/// Sink keeping every record.
#[derive(Default)]
pub struct RecordingSink {
    pub records: Vec<ProductRecord>,
}

impl ProductSink for RecordingSink {
    fn write(&mut self, record: &ProductRecord) -> Result<()> {
        self.records.push(record.clone());
        Ok(())
    }
}

/// CPU kernels that count their calls.
#[derive(Default)]
pub struct CountingKernels {
    pub gap_fills: AtomicUsize,
    pub interpolations: AtomicUsize,
    pub calibrations: AtomicUsize,
}

impl CountingKernels {
    pub fn total(&self) -> usize {
        self.gap_fills.load(Ordering::SeqCst)
            + self.interpolations.load(Ordering::SeqCst)
            + self.calibrations.load(Ordering::SeqCst)
    }
}

impl Kernels for CountingKernels {
    fn name(&self) -> &str {
        "counting"
    }

    fn gap_fill(&self, image: &Array2<f32>, mask: &ValidityMask) -> Result<GapFilled> {
        self.gap_fills.fetch_add(1, Ordering::SeqCst);
        CpuKernels.gap_fill(image, mask)
    }

    fn interpolate(&self, frames: &[InterpolationFrame<'_>], target: &FrameGeometry) -> Result<Interpolated> {
        self.interpolations.fetch_add(1, Ordering::SeqCst);
        CpuKernels.interpolate(frames, target)
    }

    fn calibrate(&self, input: &CalibrationInput<'_>) -> Result<Calibrated> {
        self.calibrations.fetch_add(1, Ordering::SeqCst);
        CpuKernels.calibrate(input)
    }
}
