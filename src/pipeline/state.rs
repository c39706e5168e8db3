//! Pipeline state machine and run mode.

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Stage the pipeline is currently in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    /// Batch input is being prepared.
    Loading,
    /// Waiting for the window to fill (incremental).
    Accumulating,
    Reconstructing,
    Fusing,
    Compositing,
    Publishing,
    /// Input exhausted; no further passes.
    Finished,
}

impl Default for PipelineState {
    fn default() -> Self {
        Self::Accumulating
    }
}

/// How the input is processed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessingMode {
    /// One pass over the whole input.
    #[default]
    Batch,
    /// One pass per full window of frames.
    Incremental,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineSettings {
    pub mode: ProcessingMode,
    /// Frames per window in incremental mode.
    pub window_size: usize,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            mode: ProcessingMode::Batch,
            window_size: 10,
        }
    }
}

impl PipelineSettings {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.mode == ProcessingMode::Incremental && self.window_size == 0 {
            return Err(ConfigError::invalid(
                "pipeline.window_size",
                "must be at least 1 in incremental mode",
            ));
        }
        Ok(())
    }
}
