//! Mapping pipeline orchestration.
//!
//! This module contains the top-level `MappingPipeline` that drives the
//! reconstruct → fuse → composite → publish passes, either once over a whole
//! dataset (batch) or after every full window of frames (incremental).

mod mapping_pipeline;
pub mod report;
pub mod state;
pub mod window;

pub use mapping_pipeline::MappingPipeline;
pub use report::{PipelineSummary, WindowReport};
pub use state::{PipelineSettings, PipelineState, ProcessingMode};
pub use window::ProcessingWindow;
