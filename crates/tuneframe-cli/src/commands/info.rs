use std::collections::BTreeMap;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use tuneframe_core::frame::Camera;
use tuneframe_core::io::FrameArchive;

#[derive(Args)]
pub struct InfoArgs {
    /// Frame archive directory
    pub archive: PathBuf,
}

pub fn run(args: &InfoArgs) -> Result<()> {
    let archive = FrameArchive::open(&args.archive)
        .with_context(|| format!("Failed to open archive {}", args.archive.display()))?;

    let mut per_camera: BTreeMap<String, usize> = BTreeMap::new();
    let mut per_sequence: BTreeMap<i32, usize> = BTreeMap::new();
    let mut with_image = 0usize;
    let mut unusable = 0usize;
    for entry in archive.entries() {
        *per_camera.entry(entry.header.camera.to_string()).or_default() += 1;
        *per_sequence.entry(entry.header.sequence_id).or_default() += 1;
        if entry.image.is_some() {
            with_image += 1;
        }
        if !entry.header.is_usable() {
            unusable += 1;
        }
    }

    println!("Archive:     {}", archive.root().display());
    println!("Frames:      {}", archive.len());
    if let Some((first, last)) = archive.time_range() {
        println!("Time range:  {:.1} .. {:.1} s ({:.1} s)", first, last, last - first);
    }
    for camera in [Camera::Front, Camera::Side] {
        let count = per_camera.get(&camera.to_string()).copied().unwrap_or(0);
        println!("{:<13}{}", format!("{}:", capitalise(&camera.to_string())), count);
    }
    println!("Images:      {}", with_image);
    println!("Unusable:    {}", unusable);
    for (sequence, count) in &per_sequence {
        println!("Sequence:    {} ({} frames)", sequence, count);
    }

    Ok(())
}

fn capitalise(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) => c.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
