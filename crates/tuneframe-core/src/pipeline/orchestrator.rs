use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use ndarray::Array2;
use rayon::prelude::*;
use tracing::{debug, info, warn};

use crate::cache::FrameCache;
use crate::error::Result;
use crate::frame::{FrameHeader, FramePayload, Temperatures};
use crate::kernels::{
    CalibrationInput, Calibrated, FrameGeometry, GapFilled, InterpolationFrame, Interpolated, Kernels,
};
use crate::locate::{locate_channel, ChannelSearch, ChannelTarget, IdentifierCheck, Located, SearchWindow};
use crate::mask::MaskBuilder;
use crate::quality::{QualityAccumulator, QualityFlags, SlotOutcome};
use crate::sequence::{resolve_sequence, wavelength_of_identifier, ChannelEntry, SequenceLayout, SequenceRequest};
use crate::store::{FrameSource, Keyword, ProductRecord, ProductSink};
use crate::tables::StaticTables;

use super::config::{AssemblyConfig, SequenceExpectations};
use super::consensus::LimbConsensus;
use super::types::{AssemblyReport, NoOpReporter, ProgressReporter, SlotReport, SlotState, TargetSlot};

/// Cadence tolerance when comparing against an expected cadence.
const CADENCE_EPSILON: f64 = 1e-6;

/// Everything a slot reads. The source is only touched by the orchestrating thread.
struct SlotContext<'a> {
    config: &'a AssemblyConfig,
    tables: &'a StaticTables,
    source: &'a dyn FrameSource,
    kernels: &'a dyn Kernels,
    reporter: &'a dyn ProgressReporter,
    masks: &'a MaskBuilder<'a>,
    frames: &'a [FrameHeader],
}

/// One channel of a slot as it moves through the stages.
struct ChannelRequirement {
    entry: ChannelEntry,
    search: ChannelSearch,
    located: Located,
    /// Loaded frames that survived every rejection, earliest first.
    kept: Vec<(usize, Arc<FramePayload>)>,
    filled: Vec<(FrameGeometry, Arc<GapFilled>)>,
    quality: QualityAccumulator,
}

/// Assemble one product per target time between `config.begin` and
/// `config.end`, writing each through `sink` as soon as it is complete.
pub fn run_assembly_reported(
    config: &AssemblyConfig,
    tables: &StaticTables,
    source: &dyn FrameSource,
    sink: &mut dyn ProductSink,
    kernels: Arc<dyn Kernels>,
    reporter: Arc<dyn ProgressReporter>,
) -> Result<AssemblyReport> {
    config.validate()?;

    let max_cadence = tables
        .sequences()
        .flat_map(|s| [s.front.cadence, s.side.cadence])
        .chain(config.expectations.cadence)
        .fold(0.0f64, f64::max);
    let pad = config.query_padding(max_cadence);

    let mut frames = source.headers(config.begin - pad, config.end + pad)?;
    frames.sort_by(|a, b| a.time.total_cmp(&b.time));
    for (i, frame) in frames.iter_mut().enumerate() {
        frame.index = i;
    }

    let targets = config.target_times();
    info!(
        frames = frames.len(),
        slots = targets.len(),
        camera = %config.camera,
        kernel = kernels.name(),
        "Starting assembly"
    );
    reporter.begin_run(targets.len());

    let masks = MaskBuilder::new(tables);
    let ctx = SlotContext {
        config,
        tables,
        source,
        kernels: kernels.as_ref(),
        reporter: reporter.as_ref(),
        masks: &masks,
        frames: &frames,
    };
    let mut cache = FrameCache::new();
    let mut report = AssemblyReport {
        kernel: kernels.name().to_string(),
        ..AssemblyReport::default()
    };

    for (index, &target_time) in targets.iter().enumerate() {
        let slot = TargetSlot {
            index,
            target_time,
            camera: config.camera,
        };
        let record = assemble_slot(&ctx, &slot, &mut cache)?;
        sink.write(&record)?;

        let slot_report = SlotReport {
            target_time,
            outcome: record.outcome,
            quality: record.quality,
            frames_used: record.frames_used,
        };
        debug!(
            target_time,
            outcome = %record.outcome,
            flags = %record.quality,
            frames = record.frames_used,
            "Slot written"
        );
        reporter.slot_state(&slot, SlotState::from(record.outcome));
        reporter.slot_finished(&slot, &slot_report);
        report.slots.push(slot_report);

        let next_target = targets.get(index + 1).copied().unwrap_or(target_time + config.step);
        let evicted = cache.evict_before(next_target - pad);
        if evicted > 0 {
            debug!(evicted, cached = cache.len(), "Evicted frames");
        }
    }

    report.frames_loaded = cache.loads();
    reporter.finish_run();
    info!(
        emitted = report.count(SlotOutcome::Emitted),
        degraded = report.count(SlotOutcome::EmittedDegraded),
        empty = report.count(SlotOutcome::EmittedEmpty),
        frames_loaded = report.frames_loaded,
        "Assembly complete"
    );
    Ok(report)
}

/// Assemble without progress reporting.
pub fn run_assembly(
    config: &AssemblyConfig,
    tables: &StaticTables,
    source: &dyn FrameSource,
    sink: &mut dyn ProductSink,
    kernels: Arc<dyn Kernels>,
) -> Result<AssemblyReport> {
    let reporter = Arc::new(NoOpReporter);
    run_assembly_reported(config, tables, source, sink, kernels, reporter)
}

fn assemble_slot(ctx: &SlotContext<'_>, slot: &TargetSlot, cache: &mut FrameCache) -> Result<ProductRecord> {
    let config = ctx.config;
    let frames = ctx.frames;
    let t = slot.target_time;

    let mut quality = QualityAccumulator::new();
    let mut record = ProductRecord::new(t, slot.camera);
    record.set_keyword("T_REC", Keyword::Time(t));
    record.set_keyword("CAMERA", Keyword::Int(slot.camera.hardware_id() as i64));
    record.set_keyword("KERNELS", Keyword::Str(ctx.kernels.name().to_string()));
    ctx.reporter.slot_state(slot, SlotState::Initialized);

    let Some(reference) = find_reference(ctx, t) else {
        debug!(target_time = t, "No reference frame");
        quality.flag(QualityFlags::TARGET_FILTERGRAM_MISSING);
        return Ok(finish(record, quality, &[], frames));
    };
    quality.absorb_frame(reference);
    record.set_keyword("HFLID", Keyword::Int(reference.sequence_id as i64));
    record.set_keyword("HWLTID", Keyword::Int(reference.wavelength_table_id as i64));
    record.set_keyword("HPLTID", Keyword::Int(reference.polarization_table_id as i64));
    if !reference.limb.centre_known() {
        quality.flag(QualityFlags::LIMBFIT_ISSUE | QualityFlags::TARGET_FILTERGRAM_MISSING);
        return Ok(finish(record, quality, &[], frames));
    }

    ctx.reporter.slot_state(slot, SlotState::ResolvingSequence);
    let request = SequenceRequest::from_reference(reference, config.reference_wavelength, config.camera);
    let layout = match resolve_sequence(ctx.tables, &request) {
        Ok(layout) => layout,
        Err(reason) => {
            warn!(target_time = t, sequence = request.sequence_id, %reason, "Cannot resolve sequence");
            quality.flag(QualityFlags::NO_FRAMELIST_INFO);
            return Ok(finish(record, quality, &[], frames));
        }
    };
    record.set_keyword("CADENCE", Keyword::Double(layout.cadence));
    record.set_keyword("NPOL", Keyword::Int(layout.npol as i64));

    if let Some(flag) = check_expectations(&config.expectations, &layout) {
        debug!(target_time = t, flags = %flag, "Sequence does not meet expectations");
        quality.flag(flag);
        return Ok(finish(record, quality, &[], frames));
    }
    let Some(reference_entry) = layout.reference_entry(reference).copied() else {
        quality.flag(QualityFlags::WRONG_TARGET);
        return Ok(finish(record, quality, &[], frames));
    };
    let wavelengths = match select_wavelengths(config, &layout) {
        Ok(wavelengths) => wavelengths,
        Err(flag) => {
            quality.flag(flag);
            return Ok(finish(record, quality, &[], frames));
        }
    };

    let points = config.interpolation_points(layout.cadence);
    let minimum = config.minimum_points(points);
    record.set_keyword("TINTNUM", Keyword::Int(points as i64));

    ctx.reporter.slot_state(slot, SlotState::LocatingChannels);
    let window = SearchWindow::for_points(t, points, layout.cadence);
    let mut channels = plan_channels(ctx, &layout, reference, &reference_entry, &wavelengths, window, points);
    channels.par_iter_mut().for_each(|ch| {
        ch.located = locate_channel(frames, &ch.search);
    });

    load_payloads(ctx, cache, &mut channels, reference)?;
    apply_limb_consensus(ctx, &layout, &mut channels);

    let mut viable = true;
    for ch in &mut channels {
        let available = ch.kept.len();
        viable &= ch.quality.record_interpolants(points, available, minimum);
        if available == points {
            let times: Vec<f64> = ch.kept.iter().map(|(i, _)| frames[*i].time).collect();
            ch.quality.check_span(&times, layout.cadence, layout.channel_count);
        }
        for (i, payload) in &ch.kept {
            ch.quality.absorb_frame(&frames[*i]);
            if payload.transient_defects.is_none() {
                ch.quality.flag(QualityFlags::NO_COSMIC_RAY);
            }
        }
    }
    if !viable {
        merge_channels(&mut quality, &channels);
        debug!(target_time = t, flags = %quality.flags(), "Too few interpolants");
        return Ok(finish(record, quality, &[], frames));
    }

    ctx.reporter.slot_state(slot, SlotState::Interpolating);
    gap_fill(ctx, cache, &channels)?;
    for ch in &mut channels {
        for (i, _) in &ch.kept {
            ch.quality.flag(cache.flags(*i));
            if let Some(filled) = cache.filled(*i) {
                let frame = &frames[*i];
                let geometry = FrameGeometry {
                    time: frame.time,
                    camera: frame.camera,
                    limb: frame.limb,
                };
                ch.filled.push((geometry, filled));
            }
        }
    }

    let target = FrameGeometry {
        time: t,
        camera: slot.camera,
        limb: reference.limb,
    };
    let kernels = ctx.kernels;
    let interpolated: Vec<Interpolated> = channels
        .par_iter()
        .map(|ch| {
            let inputs: Vec<InterpolationFrame<'_>> = ch
                .filled
                .iter()
                .map(|(geometry, filled)| InterpolationFrame {
                    image: &filled.image,
                    errors: &filled.errors,
                    geometry: *geometry,
                })
                .collect();
            kernels.interpolate(&inputs, &target)
        })
        .collect::<Result<Vec<_>>>()?;
    for (ch, out) in channels.iter_mut().zip(&interpolated) {
        if !out.status.is_success() {
            ch.quality.flag(QualityFlags::INTERPOLATION_FAILED);
        }
    }
    merge_channels(&mut quality, &channels);
    let used = used_frames(&channels);
    if quality.is_fatal() {
        return Ok(finish(record, quality, &used, frames));
    }

    ctx.reporter.slot_state(slot, SlotState::Assembling);
    let temperatures = match ctx.source.temperatures(t)? {
        Some(temperatures) => temperatures,
        None => {
            quality.flag(QualityFlags::NO_TEMP);
            config.default_temperatures
        }
    };
    let calibrated = calibrate(ctx.kernels, &layout, &channels, &interpolated, &wavelengths, temperatures)?;
    for (wavelength, out) in wavelengths.iter().zip(calibrated) {
        if !out.status.is_success() {
            debug!(target_time = t, wavelength, "Calibration failed");
            quality.flag(QualityFlags::NO_DATA);
        }
        record.segments.extend(out.images);
    }

    Ok(finish(record, quality, &used, frames))
}

/// Nearest usable frame of the reference wavelength on the configured camera,
/// within half a cadence of the target. A frame whose cadence is unknown never
/// qualifies.
fn find_reference<'a>(ctx: &SlotContext<'a>, t: f64) -> Option<&'a FrameHeader> {
    let config = ctx.config;
    ctx.frames
        .iter()
        .filter(|f| {
            f.is_usable()
                && f.camera == config.camera
                && wavelength_of_identifier(f.filter_id) == Some(config.reference_wavelength)
        })
        .filter(|f| {
            let cadence = config.expectations.cadence.or_else(|| {
                ctx.tables
                    .sequence(f.sequence_id)
                    .map(|s| s.variant(config.camera).cadence)
            });
            cadence.is_some_and(|c| (f.time - t).abs() <= c / 2.0)
        })
        .min_by(|a, b| (a.time - t).abs().total_cmp(&(b.time - t).abs()))
}

/// First failed expectation, checked in order: framelist size, cadence,
/// polarization type, npol.
fn check_expectations(expected: &SequenceExpectations, layout: &SequenceLayout) -> Option<QualityFlags> {
    if expected.channels.is_some_and(|n| n != layout.channel_count) {
        return Some(QualityFlags::WRONG_FRAMELIST_SIZE);
    }
    if expected
        .cadence
        .is_some_and(|c| (c - layout.cadence).abs() > CADENCE_EPSILON)
    {
        return Some(QualityFlags::WRONG_CADENCE);
    }
    if expected
        .polarization_type
        .is_some_and(|p| p != layout.polarization_type)
    {
        return Some(QualityFlags::WRONG_POL_TYPE);
    }
    if expected.npol.is_some_and(|n| n != layout.npol) {
        return Some(QualityFlags::WRONG_NPOL);
    }
    None
}

fn select_wavelengths(config: &AssemblyConfig, layout: &SequenceLayout) -> std::result::Result<Vec<usize>, QualityFlags> {
    let wavelengths = config.wavelengths.clone().unwrap_or_else(|| layout.wavelengths());
    for &w in &wavelengths {
        if w >= layout.wavelength_count {
            return Err(QualityFlags::WRONG_WAVELENGTH_NUM);
        }
        match layout.entries_for_wavelength(w).count() {
            0 => return Err(QualityFlags::WRONG_WAVELENGTH_NUM),
            n if n != layout.npol => return Err(QualityFlags::WRONG_NPOL),
            _ => {}
        }
    }
    Ok(wavelengths)
}

fn plan_channels(
    ctx: &SlotContext<'_>,
    layout: &SequenceLayout,
    reference: &FrameHeader,
    reference_entry: &ChannelEntry,
    wavelengths: &[usize],
    window: SearchWindow,
    points: usize,
) -> Vec<ChannelRequirement> {
    layout
        .entries
        .iter()
        .filter(|e| wavelengths.contains(&e.wavelength))
        .map(|entry| {
            let (delta, grouping) = layout.grouping(reference_entry, entry);
            let target = ChannelTarget {
                tuning: entry.tuning,
                camera: entry.camera,
                focus: reference.focus,
                identifier: layout.identifier_offset.map(|rule| IdentifierCheck {
                    expected: entry.identifier,
                    rule,
                }),
            };
            ChannelRequirement {
                entry: *entry,
                search: ChannelSearch {
                    reference_index: reference.index,
                    delta,
                    grouping,
                    target,
                    window,
                    split: ctx.config.interpolation.window_split,
                    sequence_length: layout.sequence_length,
                    points,
                },
                located: Located::default(),
                kept: Vec::new(),
                filled: Vec::new(),
                quality: QualityAccumulator::new(),
            }
        })
        .collect()
}

/// Load every located frame through the cache. Frames without an image, or
/// whose image size differs from the slot's, drop out.
fn load_payloads(
    ctx: &SlotContext<'_>,
    cache: &mut FrameCache,
    channels: &mut [ChannelRequirement],
    reference: &FrameHeader,
) -> Result<()> {
    let mut dims = cache.get_or_load(reference, ctx.source)?.map(|p| p.dims());
    for ch in channels.iter_mut() {
        for index in ch.located.indices() {
            let frame = &ctx.frames[index];
            let Some(payload) = cache.get_or_load(frame, ctx.source)? else {
                continue;
            };
            let expected = *dims.get_or_insert(payload.dims());
            if payload.dims() != expected {
                debug!(record_id = frame.record_id, dims = ?payload.dims(), "Image size mismatch");
                continue;
            }
            ch.kept.push((index, payload));
        }
    }
    Ok(())
}

/// Reject frames whose limb fit disagrees with the median of the first channel.
fn apply_limb_consensus(ctx: &SlotContext<'_>, layout: &SequenceLayout, channels: &mut [ChannelRequirement]) {
    let Some(first) = channels.first() else {
        return;
    };
    let Some(consensus) = LimbConsensus::from_frames(first.kept.iter().map(|(i, _)| &ctx.frames[*i])) else {
        return;
    };
    for ch in channels.iter_mut() {
        let before = ch.kept.len();
        ch.kept
            .retain(|(i, _)| consensus.accepts(&ctx.frames[*i], &ctx.config.limb, layout.combine_cameras));
        if ch.kept.len() < before {
            ch.quality.flag(QualityFlags::LIMBFIT_ISSUE);
        }
    }
}

/// Build masks and gap-fill every kept frame the cache has not filled yet.
fn gap_fill(ctx: &SlotContext<'_>, cache: &mut FrameCache, channels: &[ChannelRequirement]) -> Result<()> {
    let mut pending: BTreeMap<usize, Arc<FramePayload>> = BTreeMap::new();
    for ch in channels {
        for (i, payload) in &ch.kept {
            if cache.filled(*i).is_none() {
                pending.entry(*i).or_insert_with(|| Arc::clone(payload));
            }
        }
    }
    if pending.is_empty() {
        return Ok(());
    }

    let masks = ctx.masks;
    let kernels = ctx.kernels;
    let frames = ctx.frames;
    let pending: Vec<(usize, Arc<FramePayload>)> = pending.into_iter().collect();
    let filled = pending
        .par_iter()
        .map(|(i, payload)| -> Result<(usize, GapFilled, QualityFlags)> {
            let mask = masks.build_for_payload(payload, frames[*i].geometry_id)?;
            let out = kernels.gap_fill(&payload.image, &mask)?;
            let flags = if out.status.is_success() {
                QualityFlags::NONE
            } else {
                QualityFlags::NO_GAPFILL
            };
            Ok((*i, out, flags))
        })
        .collect::<Result<Vec<_>>>()?;

    debug!(frames = filled.len(), "Gap-filled frames");
    for (i, out, flags) in filled {
        cache.store_filled(i, out, flags);
    }
    Ok(())
}

/// Calibrate each selected wavelength from its interpolated channels, in
/// framelist order.
fn calibrate(
    kernels: &dyn Kernels,
    layout: &SequenceLayout,
    channels: &[ChannelRequirement],
    interpolated: &[Interpolated],
    wavelengths: &[usize],
    temperatures: Temperatures,
) -> Result<Vec<Calibrated>> {
    wavelengths
        .par_iter()
        .map(|&wavelength| {
            let (images, polarization): (Vec<&Array2<f32>>, Vec<[i32; 3]>) = channels
                .iter()
                .zip(interpolated)
                .filter(|(ch, _)| ch.entry.wavelength == wavelength)
                .map(|(ch, out)| (&out.image, ch.entry.tuning.polarization))
                .unzip();
            kernels.calibrate(&CalibrationInput {
                wavelength,
                images,
                polarization,
                polarization_type: layout.polarization_type,
                temperatures,
            })
        })
        .collect()
}

fn merge_channels(quality: &mut QualityAccumulator, channels: &[ChannelRequirement]) {
    for ch in channels {
        quality.merge(&ch.quality);
    }
}

fn used_frames(channels: &[ChannelRequirement]) -> Vec<usize> {
    channels
        .iter()
        .flat_map(|ch| ch.kept.iter().map(|(i, _)| *i))
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// Close the record with its quality. Empty products carry no segments.
fn finish(
    mut record: ProductRecord,
    quality: QualityAccumulator,
    used: &[usize],
    frames: &[FrameHeader],
) -> ProductRecord {
    let (flags, source, outcome) = quality.finish();
    if outcome == SlotOutcome::EmittedEmpty {
        record.segments.clear();
    }
    let mut sources: Vec<u64> = used.iter().map(|&i| frames[i].record_id).collect();
    sources.sort_unstable();
    sources.dedup();

    record.outcome = outcome;
    record.quality = flags;
    record.source_quality = source;
    record.frames_used = used.len();
    record.sources = sources;
    record.set_keyword("QUALITY", Keyword::Bitmask(flags.bits() as u64));
    record.set_keyword("QUALLEV0", Keyword::Bitmask(source as u64));
    record
}
