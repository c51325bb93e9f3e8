pub mod config;
mod consensus;
mod orchestrator;
mod types;

pub use config::{AssemblyConfig, InterpolationConfig, LimbConfig, SequenceExpectations};
pub use consensus::LimbConsensus;
pub use orchestrator::{run_assembly, run_assembly_reported};
pub use types::{AssemblyReport, ProgressReporter, SlotReport, SlotState, TargetSlot};
