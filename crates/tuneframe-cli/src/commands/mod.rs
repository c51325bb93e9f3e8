pub mod config;
pub mod info;
pub mod run;
pub mod tables;

use std::path::Path;

use anyhow::{Context, Result};
use clap::ValueEnum;
use tuneframe_core::frame::Camera;
use tuneframe_core::tables::{self as core_tables, StaticTables};

#[derive(Clone, Copy, ValueEnum)]
pub enum CameraArg {
    Front,
    Side,
}

impl From<CameraArg> for Camera {
    fn from(arg: CameraArg) -> Self {
        match arg {
            CameraArg::Front => Camera::Front,
            CameraArg::Side => Camera::Side,
        }
    }
}

/// Install the built-in tables, or the ones in `dir`.
pub fn load_tables(dir: Option<&Path>) -> Result<&'static StaticTables> {
    let loaded = match dir {
        Some(dir) => StaticTables::from_dir(dir)
            .with_context(|| format!("Failed to load tables from {}", dir.display()))?,
        None => StaticTables::builtin().context("Built-in tables are invalid")?,
    };
    Ok(core_tables::init(loaded))
}
