use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Result, TuneframeError};
use crate::frame::Camera;
use crate::io::archive::{read_image, write_image};
use crate::quality::{QualityFlags, SlotOutcome};
use crate::store::{Keyword, ProductRecord, ProductSink};

/// Keyword file written next to the segments of one product.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ProductSummary {
    pub target_time: f64,
    pub camera: Camera,
    pub outcome: SlotOutcome,
    pub quality: QualityFlags,
    pub quality_names: Vec<String>,
    pub source_quality: u32,
    pub frames_used: usize,
    pub sources: Vec<u64>,
    pub keywords: BTreeMap<String, Keyword>,
    /// Segment name to file name, relative to the product directory.
    pub segments: BTreeMap<String, String>,
}

/// Writes each product as `<stem>.toml` plus one image file per segment.
pub struct DirectorySink {
    root: PathBuf,
    written: Vec<PathBuf>,
}

impl DirectorySink {
    pub fn create(root: &Path) -> Result<Self> {
        fs::create_dir_all(root)?;
        Ok(Self {
            root: root.to_path_buf(),
            written: Vec::new(),
        })
    }

    /// Keyword files written so far, in slot order.
    pub fn written(&self) -> &[PathBuf] {
        &self.written
    }
}

/// File stem of a product: camera and whole target second.
pub fn product_stem(camera: Camera, target_time: f64) -> String {
    format!("{camera}_{:.0}", target_time)
}

impl ProductSink for DirectorySink {
    fn write(&mut self, record: &ProductRecord) -> Result<()> {
        let stem = product_stem(record.camera, record.target_time);
        let mut segments = BTreeMap::new();
        for (name, image) in &record.segments {
            let file = format!("{stem}.{name}.tfr");
            write_image(&self.root.join(&file), image)?;
            segments.insert(name.clone(), file);
        }

        let summary = ProductSummary {
            target_time: record.target_time,
            camera: record.camera,
            outcome: record.outcome,
            quality: record.quality,
            quality_names: record.quality.names().into_iter().map(String::from).collect(),
            source_quality: record.source_quality,
            frames_used: record.frames_used,
            sources: record.sources.clone(),
            keywords: record.keywords.clone(),
            segments,
        };
        let path = self.root.join(format!("{stem}.toml"));
        let text = toml::to_string(&summary)?;
        fs::write(&path, text).map_err(|e| TuneframeError::Sink(format!("{}: {e}", path.display())))?;
        debug!(path = %path.display(), outcome = %record.outcome, "Wrote product");
        self.written.push(path);
        Ok(())
    }
}

/// Read back a product written by [`DirectorySink`].
pub fn read_product(path: &Path) -> Result<(ProductSummary, BTreeMap<String, ndarray::Array2<f32>>)> {
    let text = fs::read_to_string(path)?;
    let summary: ProductSummary = toml::from_str(&text)
        .map_err(|e| TuneframeError::Sink(format!("{}: {e}", path.display())))?;
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let mut images = BTreeMap::new();
    for (name, file) in &summary.segments {
        images.insert(name.clone(), read_image(&dir.join(file))?);
    }
    Ok((summary, images))
}
