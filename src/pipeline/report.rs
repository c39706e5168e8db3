//! Per-window reports and the run summary.

use crate::dsm::FusionReport;
use crate::ortho::CompositeReport;

/// What happened to one drained window.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WindowReport {
    pub window_index: usize,
    /// Sequence numbers of the first and last frame in the window.
    pub first_seq: usize,
    pub last_seq: usize,
    pub num_points: usize,
    /// Frames handed to the compositor, including carried-over frames.
    pub num_frames_composited: usize,
    /// Set when the window's points were fused.
    pub fusion: Option<FusionReport>,
    /// Set when the window was composited.
    pub composite: Option<CompositeReport>,
    pub published: bool,
    /// Error chain of an aborted pass.
    pub error: Option<String>,
    pub elapsed_ms: f64,
}

impl WindowReport {
    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }
}

/// Counters for a whole run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PipelineSummary {
    pub frames_consumed: usize,
    pub windows_drained: usize,
    pub passes_published: usize,
    pub windows_failed: usize,
    /// Frames of a partial window discarded at end of input.
    pub frames_dropped: usize,
}
