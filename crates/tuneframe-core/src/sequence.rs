use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::consts::{FILTER_INDEX_MODULUS, POLARIZATION_DECADE, SAME_WAVELENGTH_GROUPING_SPAN, TUNING_FAMILIES};
use crate::frame::{Camera, FrameHeader, TuningState};
use crate::tables::{IdentifierOffset, StaticTables};

/// Why a sequence could not be turned into a channel layout.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Unresolved {
    #[error("no sequence with id {0}")]
    UnknownSequence(i32),

    #[error("sequence uses {0} distinct filters; supported counts are 5, 6, 8 and 10")]
    UnsupportedWavelengthCount(usize),

    #[error("filter index {filter} of identifier {fid} is not part of the tuning family")]
    UnknownFilter { fid: i32, filter: i32 },

    #[error("reference wavelength {0} does not exist in the tuning family")]
    UnknownReferenceWavelength(usize),

    #[error("no wavelength positions for tuning index {0}")]
    MissingWavelengthPositions(i32),

    #[error("no polarization positions for tuning index {0}")]
    MissingPolarizationPositions(i32),

    #[error("sequence declares {declared} channels but {retained} were retained")]
    ChannelCountMismatch { declared: usize, retained: usize },
}

/// Parameters that select and orient a sequence.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SequenceRequest {
    pub sequence_id: i32,
    pub wavelength_table_id: i32,
    pub polarization_table_id: i32,
    pub reference_wavelength: usize,
    pub camera: Camera,
}

impl SequenceRequest {
    /// Request oriented on the keywords of a reference frame.
    pub fn from_reference(header: &FrameHeader, reference_wavelength: usize, camera: Camera) -> Self {
        Self {
            sequence_id: header.sequence_id,
            wavelength_table_id: header.wavelength_table_id,
            polarization_table_id: header.polarization_table_id,
            reference_wavelength,
            camera,
        }
    }
}

/// One channel of a resolved sequence.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelEntry {
    /// Raw framelist position.
    pub location: usize,
    pub wavelength: usize,
    pub polarization_index: i32,
    pub tuning: TuningState,
    pub camera: Camera,
    /// Filter identifier, offset when the sequence disambiguates repeated blocks.
    pub identifier: i32,
}

/// Ordered channel layout of a sequence for one camera request.
#[derive(Clone, Debug, PartialEq)]
pub struct SequenceLayout {
    pub sequence_id: i32,
    pub camera: Camera,
    pub entries: Vec<ChannelEntry>,
    pub cadence: f64,
    pub combine_cameras: bool,
    pub channel_count: usize,
    pub npol: usize,
    pub polarization_type: i32,
    pub wavelength_count: usize,
    /// Raw framelist length, both cameras included.
    pub sequence_length: usize,
    pub identifier_offset: Option<IdentifierOffset>,
}

impl SequenceLayout {
    /// Identifier a frame carries under this layout's offset rule.
    pub fn identifier_of(&self, header: &FrameHeader) -> i32 {
        match self.identifier_offset {
            Some(rule) => rule.apply(header.filter_id, header.framelist_position),
            None => header.filter_id,
        }
    }

    /// The entry a reference frame corresponds to: same tuning and camera,
    /// preferring the entry with the frame's identifier.
    pub fn reference_entry(&self, header: &FrameHeader) -> Option<&ChannelEntry> {
        let identifier = self.identifier_of(header);
        let mut candidates = self
            .entries
            .iter()
            .filter(|e| e.tuning == header.tuning && e.camera == header.camera);
        let first = candidates.next()?;
        if first.identifier == identifier {
            return Some(first);
        }
        Some(candidates.find(|e| e.identifier == identifier).unwrap_or(first))
    }

    pub fn entries_for_wavelength(&self, wavelength: usize) -> impl Iterator<Item = &ChannelEntry> {
        self.entries.iter().filter(move |e| e.wavelength == wavelength)
    }

    /// Distinct wavelengths present in the layout, ascending.
    pub fn wavelengths(&self) -> Vec<usize> {
        self.entries
            .iter()
            .map(|e| e.wavelength)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    /// Framelist distance from the reference entry to `entry`, and the grouping
    /// used to choose the search direction. Channels of the reference
    /// wavelength close to the reference share its window (grouping 0).
    pub fn grouping(&self, reference: &ChannelEntry, entry: &ChannelEntry) -> (i64, i64) {
        let delta = entry.location as i64 - reference.location as i64;
        let shares_window = entry.wavelength == reference.wavelength
            && (entry.tuning.polarization == reference.tuning.polarization
                || delta.abs() <= SAME_WAVELENGTH_GROUPING_SPAN);
        (delta, if shares_window { 0 } else { delta })
    }
}

/// Filter index encoded in a filter identifier.
pub fn filter_index(fid: i32) -> i32 {
    (fid / 10).rem_euclid(FILTER_INDEX_MODULUS)
}

/// Wavelength index of a filter index, common to every tuning family.
pub fn wavelength_of_filter(filter: i32) -> Option<usize> {
    TUNING_FAMILIES
        .iter()
        .find_map(|family| family.iter().position(|&f| f == filter))
}

/// Wavelength index of a frame's filter identifier.
pub fn wavelength_of_identifier(fid: i32) -> Option<usize> {
    wavelength_of_filter(filter_index(fid))
}

/// Tuning family with exactly `count` wavelengths.
pub fn family_for_count(count: usize) -> Option<&'static [i32]> {
    TUNING_FAMILIES.iter().copied().find(|family| family.len() == count)
}

/// Join the sequence, wavelength-position and polarization-position tables
/// into the channel layout seen by `request.camera`.
pub fn resolve_sequence(
    tables: &StaticTables,
    request: &SequenceRequest,
) -> Result<SequenceLayout, Unresolved> {
    let definition = tables
        .sequence(request.sequence_id)
        .ok_or(Unresolved::UnknownSequence(request.sequence_id))?;
    let variant = definition.variant(request.camera);

    let distinct: BTreeSet<i32> = definition.frames.iter().map(|r| filter_index(r.fid)).collect();
    let family =
        family_for_count(distinct.len()).ok_or(Unresolved::UnsupportedWavelengthCount(distinct.len()))?;
    let reference_filter = *family
        .get(request.reference_wavelength)
        .ok_or(Unresolved::UnknownReferenceWavelength(request.reference_wavelength))?;

    let wavelength_base = request.wavelength_table_id - reference_filter;
    let polarization_base =
        request.polarization_table_id.div_euclid(POLARIZATION_DECADE) * POLARIZATION_DECADE;
    let rule = definition
        .identifier_offset
        .filter(|r| r.applies_to(request.camera));

    let mut entries = Vec::with_capacity(variant.channels);
    for (location, row) in definition.frames.iter().enumerate() {
        if !variant.combine && row.camera != request.camera {
            continue;
        }
        let filter = filter_index(row.fid);
        let wavelength = family
            .iter()
            .position(|&f| f == filter)
            .ok_or(Unresolved::UnknownFilter { fid: row.fid, filter })?;
        let wavelength_index = filter + wavelength_base;
        let polarization_index = row.fid.rem_euclid(POLARIZATION_DECADE) + polarization_base;
        let wavelength_positions = tables
            .wavelength_positions(wavelength_index)
            .ok_or(Unresolved::MissingWavelengthPositions(wavelength_index))?;
        let polarization_positions = tables
            .polarization_positions(polarization_index)
            .ok_or(Unresolved::MissingPolarizationPositions(polarization_index))?;
        let identifier = match rule {
            Some(r) => r.apply(row.fid, location as i32),
            None => row.fid,
        };
        entries.push(ChannelEntry {
            location,
            wavelength,
            polarization_index,
            tuning: TuningState {
                wavelength: wavelength_positions,
                polarization: polarization_positions,
            },
            camera: row.camera,
            identifier,
        });
    }

    if entries.len() != variant.channels {
        return Err(Unresolved::ChannelCountMismatch {
            declared: variant.channels,
            retained: entries.len(),
        });
    }

    Ok(SequenceLayout {
        sequence_id: definition.id,
        camera: request.camera,
        entries,
        cadence: variant.cadence,
        combine_cameras: variant.combine,
        channel_count: variant.channels,
        npol: variant.npol,
        polarization_type: variant.polarization_type,
        wavelength_count: family.len(),
        sequence_length: definition.len(),
        identifier_offset: rule,
    })
}
