//! Boundaries to the data store: where frames come from and where products go.

use std::collections::BTreeMap;

use ndarray::Array2;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::frame::{Camera, FrameHeader, FramePayload, Temperatures};
use crate::quality::{QualityFlags, SlotOutcome};

/// Time-range access to raw frames.
pub trait FrameSource {
    /// Headers of every frame observed in `[start, end]`.
    fn headers(&self, start: f64, end: f64) -> Result<Vec<FrameHeader>>;

    /// Pixel data of a frame, `None` when the store has no image for it.
    fn load(&self, header: &FrameHeader) -> Result<Option<FramePayload>>;

    /// Instrument temperatures near `time`, when recorded.
    fn temperatures(&self, _time: f64) -> Result<Option<Temperatures>> {
        Ok(None)
    }
}

/// Destination of assembled products.
pub trait ProductSink {
    fn write(&mut self, record: &ProductRecord) -> Result<()>;
}

/// Typed keyword value of a product record.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum Keyword {
    Str(String),
    Int(i64),
    Double(f64),
    /// Seconds on the frame time axis.
    Time(f64),
    Bitmask(u64),
}

impl std::fmt::Display for Keyword {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Str(s) => write!(f, "{s}"),
            Self::Int(v) => write!(f, "{v}"),
            Self::Double(v) => write!(f, "{v}"),
            Self::Time(v) => write!(f, "{v:.3}"),
            Self::Bitmask(v) => write!(f, "{v:#010x}"),
        }
    }
}

/// One emitted product: full, degraded or empty.
#[derive(Clone, Debug)]
pub struct ProductRecord {
    pub target_time: f64,
    pub camera: Camera,
    pub outcome: SlotOutcome,
    pub quality: QualityFlags,
    /// Union of the upstream quality fields of the frames consumed.
    pub source_quality: u32,
    pub frames_used: usize,
    /// Record ids of the frames consumed.
    pub sources: Vec<u64>,
    pub keywords: BTreeMap<String, Keyword>,
    /// Named image segments. Empty for an empty product.
    pub segments: BTreeMap<String, Array2<f32>>,
}

impl ProductRecord {
    pub fn new(target_time: f64, camera: Camera) -> Self {
        Self {
            target_time,
            camera,
            outcome: SlotOutcome::EmittedEmpty,
            quality: QualityFlags::NONE,
            source_quality: 0,
            frames_used: 0,
            sources: Vec::new(),
            keywords: BTreeMap::new(),
            segments: BTreeMap::new(),
        }
    }

    pub fn set_keyword(&mut self, name: &str, value: Keyword) {
        self.keywords.insert(name.to_string(), value);
    }

    pub fn keyword(&self, name: &str) -> Option<&Keyword> {
        self.keywords.get(name)
    }
}
