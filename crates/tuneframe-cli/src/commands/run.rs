use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args, ValueEnum};
use indicatif::{ProgressBar, ProgressStyle};
use tuneframe_core::io::{DirectorySink, FrameArchive};
use tuneframe_core::kernels::{CpuKernels, Kernels};
use tuneframe_core::locate::WindowSplit;
use tuneframe_core::pipeline::{
    run_assembly_reported, AssemblyConfig, ProgressReporter, SlotReport, SlotState, TargetSlot,
};

use super::{load_tables, CameraArg};
use crate::summary::{print_report, print_run_summary};

#[derive(Clone, Copy, ValueEnum)]
pub enum WindowSplitArg {
    LineOfSight,
    Averaging,
}

#[derive(Args)]
pub struct RunArgs {
    /// Frame archive directory
    pub archive: PathBuf,

    /// Assembly config file (TOML)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Directory with replacement table files
    #[arg(long)]
    pub tables: Option<PathBuf>,

    /// First target time in seconds (archive start when omitted)
    #[arg(long)]
    pub begin: Option<f64>,

    /// Last target time in seconds (archive end when omitted)
    #[arg(long)]
    pub end: Option<f64>,

    /// Seconds between target times
    #[arg(long, default_value = "720")]
    pub step: f64,

    /// Camera the products are assembled for
    #[arg(long, value_enum, default_value = "side")]
    pub camera: CameraArg,

    /// Reference wavelength index
    #[arg(long, default_value = "3")]
    pub reference: usize,

    /// Interpolation samples per channel (derived from the cadence when omitted)
    #[arg(long)]
    pub points: Option<usize>,

    /// How the search window is split around the reference frame
    #[arg(long, value_enum, default_value = "line-of-sight")]
    pub window_split: WindowSplitArg,

    /// Skip the cadence, framelist size and polarization checks
    #[arg(long)]
    pub any_sequence: bool,

    /// Worker threads (all cores when omitted)
    #[arg(long)]
    pub threads: Option<usize>,

    /// Output directory
    #[arg(short, long, default_value = "products")]
    pub output: PathBuf,
}

/// Drives a progress bar from slot events.
struct BarReporter {
    bar: ProgressBar,
}

impl ProgressReporter for BarReporter {
    fn begin_run(&self, total_slots: usize) {
        self.bar.set_length(total_slots as u64);
        self.bar.set_position(0);
    }

    fn slot_state(&self, slot: &TargetSlot, state: SlotState) {
        self.bar.set_message(format!("{:.0} s {}", slot.target_time, state));
    }

    fn slot_finished(&self, _slot: &TargetSlot, _report: &SlotReport) {
        self.bar.inc(1);
    }

    fn finish_run(&self) {
        self.bar.finish_with_message("Done");
    }
}

pub fn run(args: &RunArgs) -> Result<()> {
    if let Some(threads) = args.threads {
        rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .build_global()
            .context("Failed to configure worker threads")?;
    }

    let tables = load_tables(args.tables.as_deref())?;
    let archive = FrameArchive::open(&args.archive)
        .with_context(|| format!("Failed to open archive {}", args.archive.display()))?;

    let config: AssemblyConfig = if let Some(ref config_path) = args.config {
        let contents = std::fs::read_to_string(config_path)
            .with_context(|| format!("Failed to read config {}", config_path.display()))?;
        toml::from_str(&contents).context("Invalid assembly config")?
    } else {
        build_config_from_args(args, archive.time_range())
    };
    config.validate().context("Invalid assembly config")?;

    let kernels: Arc<dyn Kernels> = Arc::new(CpuKernels);
    print_run_summary(&config, &args.archive, &args.output, kernels.name());

    let mut sink = DirectorySink::create(&args.output)
        .with_context(|| format!("Failed to create output directory {}", args.output.display()))?;

    let bar = ProgressBar::new(0);
    bar.set_style(
        ProgressStyle::default_bar()
            .template("{msg:32} [{bar:40}] {pos}/{len}")?
            .progress_chars("=> "),
    );
    let reporter = Arc::new(BarReporter { bar });

    let report = run_assembly_reported(&config, tables, &archive, &mut sink, kernels, reporter)?;

    print_report(&report);
    println!("Products saved to {}", args.output.display());
    Ok(())
}

fn build_config_from_args(args: &RunArgs, range: Option<(f64, f64)>) -> AssemblyConfig {
    let (first, last) = range.unwrap_or((0.0, 0.0));
    let mut config = AssemblyConfig {
        begin: args.begin.unwrap_or(first),
        end: args.end.unwrap_or(last),
        step: args.step,
        reference_wavelength: args.reference,
        camera: args.camera.into(),
        ..AssemblyConfig::default()
    };
    config.interpolation.averaging_span = args.step;
    config.interpolation.points = args.points;
    config.interpolation.window_split = match args.window_split {
        WindowSplitArg::LineOfSight => WindowSplit::LineOfSight,
        WindowSplitArg::Averaging => WindowSplit::Averaging,
    };
    if args.any_sequence {
        config.expectations = tuneframe_core::pipeline::SequenceExpectations::none();
    }
    config
}
