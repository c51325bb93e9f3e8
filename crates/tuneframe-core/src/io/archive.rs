use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{BufWriter, Cursor, Write};
use std::path::{Path, PathBuf};

use byteorder::{LittleEndian, ReadBytesExt};
use memmap2::Mmap;
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{Result, TuneframeError};
use crate::frame::{FrameHeader, FramePayload, Temperatures};
use crate::store::FrameSource;

const IMAGE_MAGIC: &[u8; 8] = b"TFRAME01";
const IMAGE_HEADER_SIZE: usize = 16;
const DEFECT_MAGIC: &[u8; 8] = b"TDEFECT1";
const DEFECT_HEADER_SIZE: usize = 16;

pub const INDEX_FILE: &str = "index.toml";
const FRAME_DIR: &str = "frames";

/// One frame of the archive index: its header and the files holding its pixels.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ArchiveEntry {
    /// Image file relative to the archive root. Absent when no image was recorded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub defects: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transient: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub defect_count_override: Option<usize>,
    pub header: FrameHeader,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct TemperatureSample {
    pub time: f64,
    pub front: f64,
    pub side: f64,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
struct ArchiveIndex {
    #[serde(rename = "frame", default)]
    frames: Vec<ArchiveEntry>,
    #[serde(rename = "temperature", default)]
    temperatures: Vec<TemperatureSample>,
}

/// Frame source backed by a directory: `index.toml` plus one binary file per
/// image and defect list.
pub struct FrameArchive {
    root: PathBuf,
    entries: Vec<ArchiveEntry>,
    by_record: HashMap<u64, usize>,
    temperatures: Vec<TemperatureSample>,
}

impl FrameArchive {
    /// Open an archive directory and parse its index.
    pub fn open(root: &Path) -> Result<Self> {
        let index_path = root.join(INDEX_FILE);
        let text = fs::read_to_string(&index_path).map_err(|source| TuneframeError::TableFile {
            path: index_path.clone(),
            source,
        })?;
        let mut index: ArchiveIndex = toml::from_str(&text)
            .map_err(|e| TuneframeError::InvalidArchive(format!("{}: {e}", index_path.display())))?;

        index.frames.sort_by(|a, b| a.header.time.total_cmp(&b.header.time));
        index.temperatures.sort_by(|a, b| a.time.total_cmp(&b.time));

        let mut by_record = HashMap::with_capacity(index.frames.len());
        for (i, entry) in index.frames.iter().enumerate() {
            if by_record.insert(entry.header.record_id, i).is_some() {
                return Err(TuneframeError::InvalidArchive(format!(
                    "duplicate record id {}",
                    entry.header.record_id
                )));
            }
        }
        debug!(root = %root.display(), frames = index.frames.len(), "Opened frame archive");

        Ok(Self {
            root: root.to_path_buf(),
            entries: index.frames,
            by_record,
            temperatures: index.temperatures,
        })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[ArchiveEntry] {
        &self.entries
    }

    /// Observation times of the first and last frame.
    pub fn time_range(&self) -> Option<(f64, f64)> {
        Some((self.entries.first()?.header.time, self.entries.last()?.header.time))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl FrameSource for FrameArchive {
    fn headers(&self, start: f64, end: f64) -> Result<Vec<FrameHeader>> {
        Ok(self
            .entries
            .iter()
            .filter(|e| e.header.time >= start && e.header.time <= end)
            .map(|e| e.header.clone())
            .collect())
    }

    fn load(&self, header: &FrameHeader) -> Result<Option<FramePayload>> {
        let Some(&i) = self.by_record.get(&header.record_id) else {
            return Err(TuneframeError::Source(format!(
                "record {} is not in the archive",
                header.record_id
            )));
        };
        let entry = &self.entries[i];
        let Some(image) = &entry.image else {
            return Ok(None);
        };
        let image_path = self.root.join(image);
        if !image_path.exists() {
            warn!(record_id = header.record_id, path = %image_path.display(), "Image file missing");
            return Ok(None);
        }

        let mut payload = FramePayload::new(read_image(&image_path)?);
        if let Some(defects) = &entry.defects {
            payload.permanent_defects = read_defects(&self.root.join(defects))?;
        }
        if let Some(transient) = &entry.transient {
            payload.transient_defects = Some(read_defects(&self.root.join(transient))?);
        }
        payload.defect_count_override = entry.defect_count_override;
        Ok(Some(payload))
    }

    /// Nearest recorded sample.
    fn temperatures(&self, time: f64) -> Result<Option<Temperatures>> {
        Ok(self
            .temperatures
            .iter()
            .min_by(|a, b| (a.time - time).abs().total_cmp(&(b.time - time).abs()))
            .map(|s| Temperatures {
                front: s.front,
                side: s.side,
            }))
    }
}

/// Builds a frame archive on disk.
pub struct ArchiveWriter {
    root: PathBuf,
    index: ArchiveIndex,
}

impl ArchiveWriter {
    /// Create the archive directory and its frame subdirectory.
    pub fn create(root: &Path) -> Result<Self> {
        fs::create_dir_all(root.join(FRAME_DIR))?;
        Ok(Self {
            root: root.to_path_buf(),
            index: ArchiveIndex::default(),
        })
    }

    /// Append a frame. A `None` payload records the header without an image.
    pub fn add_frame(&mut self, header: &FrameHeader, payload: Option<&FramePayload>) -> Result<()> {
        let mut entry = ArchiveEntry {
            image: None,
            defects: None,
            transient: None,
            defect_count_override: None,
            header: header.clone(),
        };
        if let Some(payload) = payload {
            let stem = format!("{FRAME_DIR}/{:010}", header.record_id);

            let image = format!("{stem}.tfr");
            write_image(&self.root.join(&image), &payload.image)?;
            entry.image = Some(image);

            if !payload.permanent_defects.is_empty() {
                let defects = format!("{stem}.bad");
                write_defects(&self.root.join(&defects), &payload.permanent_defects)?;
                entry.defects = Some(defects);
            }
            if let Some(transient_list) = &payload.transient_defects {
                let transient = format!("{stem}.crh");
                write_defects(&self.root.join(&transient), transient_list)?;
                entry.transient = Some(transient);
            }
            entry.defect_count_override = payload.defect_count_override;
        }
        self.index.frames.push(entry);
        Ok(())
    }

    pub fn add_temperature(&mut self, time: f64, temperatures: Temperatures) {
        self.index.temperatures.push(TemperatureSample {
            time,
            front: temperatures.front,
            side: temperatures.side,
        });
    }

    pub fn frames_written(&self) -> usize {
        self.index.frames.len()
    }

    /// Write the index. The archive is only readable after this.
    pub fn finalize(self) -> Result<()> {
        let text = toml::to_string(&self.index)?;
        fs::write(self.root.join(INDEX_FILE), text)?;
        Ok(())
    }
}

/// Read an image file: magic, width and height as `u32`, then `f32` pixels,
/// all little-endian.
pub fn read_image(path: &Path) -> Result<Array2<f32>> {
    let file = File::open(path)?;
    let mmap = unsafe { Mmap::map(&file)? };

    if mmap.len() < IMAGE_HEADER_SIZE || &mmap[..8] != IMAGE_MAGIC {
        return Err(TuneframeError::InvalidArchive(format!(
            "{}: missing image magic",
            path.display()
        )));
    }
    let mut cursor = Cursor::new(&mmap[8..IMAGE_HEADER_SIZE]);
    let width = cursor.read_u32::<LittleEndian>()? as usize;
    let height = cursor.read_u32::<LittleEndian>()? as usize;

    let too_large = || TuneframeError::InvalidArchive(format!("{}: image too large", path.display()));
    let pixels = width.checked_mul(height).ok_or_else(too_large)?;
    let expected = pixels
        .checked_mul(4)
        .and_then(|bytes| bytes.checked_add(IMAGE_HEADER_SIZE))
        .ok_or_else(too_large)?;
    if mmap.len() < expected {
        return Err(TuneframeError::InvalidArchive(format!(
            "{}: truncated, expected {} bytes, got {}",
            path.display(),
            expected,
            mmap.len()
        )));
    }

    let mut data = vec![0f32; pixels];
    Cursor::new(&mmap[IMAGE_HEADER_SIZE..expected]).read_f32_into::<LittleEndian>(&mut data)?;
    Array2::from_shape_vec((height, width), data)
        .map_err(|e| TuneframeError::InvalidArchive(format!("{}: {e}", path.display())))
}

pub fn write_image(path: &Path, image: &Array2<f32>) -> Result<()> {
    let (height, width) = image.dim();
    let mut w = BufWriter::new(File::create(path)?);
    w.write_all(IMAGE_MAGIC)?;
    w.write_all(&(width as u32).to_le_bytes())?;
    w.write_all(&(height as u32).to_le_bytes())?;
    for &v in image.iter() {
        w.write_all(&v.to_le_bytes())?;
    }
    w.flush()?;
    Ok(())
}

/// Read a defect list: magic, entry count as `u64`, then `u64` flat pixel indices.
pub fn read_defects(path: &Path) -> Result<Vec<usize>> {
    let bytes = fs::read(path)?;
    if bytes.len() < DEFECT_HEADER_SIZE || &bytes[..8] != DEFECT_MAGIC {
        return Err(TuneframeError::InvalidArchive(format!(
            "{}: missing defect list magic",
            path.display()
        )));
    }
    let mut cursor = Cursor::new(&bytes[8..]);
    let count = cursor.read_u64::<LittleEndian>()? as usize;
    if bytes.len() < count.saturating_mul(8).saturating_add(DEFECT_HEADER_SIZE) {
        return Err(TuneframeError::InvalidArchive(format!(
            "{}: truncated defect list of {count} entries",
            path.display()
        )));
    }
    (0..count)
        .map(|_| -> Result<usize> { Ok(cursor.read_u64::<LittleEndian>()? as usize) })
        .collect()
}

pub fn write_defects(path: &Path, defects: &[usize]) -> Result<()> {
    let mut w = BufWriter::new(File::create(path)?);
    w.write_all(DEFECT_MAGIC)?;
    w.write_all(&(defects.len() as u64).to_le_bytes())?;
    for &d in defects {
        w.write_all(&(d as u64).to_le_bytes())?;
    }
    w.flush()?;
    Ok(())
}
