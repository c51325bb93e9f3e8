use crate::frame::Camera;
use crate::quality::{QualityFlags, SlotOutcome};

/// Processing state of a target slot, used for progress reporting.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SlotState {
    Initialized,
    ResolvingSequence,
    LocatingChannels,
    Interpolating,
    Assembling,
    Emitted,
    EmittedDegraded,
    EmittedEmpty,
}

impl From<SlotOutcome> for SlotState {
    fn from(outcome: SlotOutcome) -> Self {
        match outcome {
            SlotOutcome::Emitted => Self::Emitted,
            SlotOutcome::EmittedDegraded => Self::EmittedDegraded,
            SlotOutcome::EmittedEmpty => Self::EmittedEmpty,
        }
    }
}

impl std::fmt::Display for SlotState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Initialized => write!(f, "Initialized"),
            Self::ResolvingSequence => write!(f, "Resolving sequence"),
            Self::LocatingChannels => write!(f, "Locating channels"),
            Self::Interpolating => write!(f, "Interpolating"),
            Self::Assembling => write!(f, "Assembling"),
            Self::Emitted => write!(f, "Emitted"),
            Self::EmittedDegraded => write!(f, "Emitted (degraded)"),
            Self::EmittedEmpty => write!(f, "Emitted (empty)"),
        }
    }
}

/// One output time.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TargetSlot {
    pub index: usize,
    pub target_time: f64,
    pub camera: Camera,
}

/// Outcome of one slot, as reported back to the caller.
#[derive(Clone, Debug, PartialEq)]
pub struct SlotReport {
    pub target_time: f64,
    pub outcome: SlotOutcome,
    pub quality: QualityFlags,
    pub frames_used: usize,
}

/// Summary of a whole run.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct AssemblyReport {
    pub slots: Vec<SlotReport>,
    /// Frames loaded from the source over the run.
    pub frames_loaded: usize,
    pub kernel: String,
}

impl AssemblyReport {
    pub fn count(&self, outcome: SlotOutcome) -> usize {
        self.slots.iter().filter(|s| s.outcome == outcome).count()
    }
}

/// Thread-safe progress reporting for an assembly run.
///
/// All methods have default no-op implementations.
pub trait ProgressReporter: Send + Sync {
    /// The run is starting with `total_slots` target times.
    fn begin_run(&self, _total_slots: usize) {}

    /// A slot entered a new state.
    fn slot_state(&self, _slot: &TargetSlot, _state: SlotState) {}

    /// A slot was written to the sink.
    fn slot_finished(&self, _slot: &TargetSlot, _report: &SlotReport) {}

    fn finish_run(&self) {}
}

/// No-op progress reporter, used when `run_assembly` delegates.
pub(super) struct NoOpReporter;
impl ProgressReporter for NoOpReporter {}
