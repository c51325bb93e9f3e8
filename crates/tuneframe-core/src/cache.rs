use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use tracing::debug;

use crate::error::Result;
use crate::frame::{FrameHeader, FramePayload};
use crate::kernels::GapFilled;
use crate::quality::QualityFlags;
use crate::store::FrameSource;

struct CachedFrame {
    time: f64,
    payload: Arc<FramePayload>,
    filled: Option<Arc<GapFilled>>,
    flags: QualityFlags,
}

/// Frames loaded for the slots in flight, keyed by stream index.
///
/// Only the orchestrating thread mutates the cache; parallel phases share
/// the `Arc` payloads it hands out.
#[derive(Default)]
pub struct FrameCache {
    entries: BTreeMap<usize, CachedFrame>,
    /// Frames the source had no image for, with their time.
    absent: BTreeMap<usize, f64>,
    loads: usize,
    evictions: usize,
}

impl FrameCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Payload of a frame, loading it from `source` on first use.
    pub fn get_or_load(
        &mut self,
        header: &FrameHeader,
        source: &dyn FrameSource,
    ) -> Result<Option<Arc<FramePayload>>> {
        if let Some(entry) = self.entries.get(&header.index) {
            return Ok(Some(Arc::clone(&entry.payload)));
        }
        if self.absent.contains_key(&header.index) {
            return Ok(None);
        }
        self.loads += 1;
        match source.load(header)? {
            Some(payload) => {
                let payload = Arc::new(payload);
                self.entries.insert(
                    header.index,
                    CachedFrame {
                        time: header.time,
                        payload: Arc::clone(&payload),
                        filled: None,
                        flags: QualityFlags::NONE,
                    },
                );
                Ok(Some(payload))
            }
            None => {
                debug!(index = header.index, record_id = header.record_id, "Frame has no image");
                self.absent.insert(header.index, header.time);
                Ok(None)
            }
        }
    }

    pub fn filled(&self, index: usize) -> Option<Arc<GapFilled>> {
        self.entries.get(&index).and_then(|e| e.filled.clone())
    }

    /// Record the gap-filled image of a loaded frame and the flags its
    /// processing raised. Flags stick to the frame for every later slot.
    pub fn store_filled(&mut self, index: usize, filled: GapFilled, flags: QualityFlags) {
        if let Some(entry) = self.entries.get_mut(&index) {
            entry.filled = Some(Arc::new(filled));
            entry.flags |= flags;
        }
    }

    pub fn flags(&self, index: usize) -> QualityFlags {
        self.entries.get(&index).map_or(QualityFlags::NONE, |e| e.flags)
    }

    /// Drop every frame observed before `time`. Returns how many were dropped.
    pub fn evict_before(&mut self, time: f64) -> usize {
        let stale: BTreeSet<usize> = self
            .entries
            .iter()
            .filter(|(_, e)| e.time < time)
            .map(|(&i, _)| i)
            .collect();
        for index in &stale {
            self.entries.remove(index);
        }
        self.absent.retain(|_, t| *t >= time);
        self.evictions += stale.len();
        stale.len()
    }

    pub fn contains(&self, index: usize) -> bool {
        self.entries.contains_key(&index)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of source loads issued so far.
    pub fn loads(&self) -> usize {
        self.loads
    }

    pub fn evictions(&self) -> usize {
        self.evictions
    }
}
