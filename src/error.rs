//! Configuration errors.
//!
//! These are fatal and are raised before any stage runs. Everything else in
//! the crate propagates `anyhow::Error` with context.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid setting `{field}`: {reason}")]
    InvalidSetting { field: &'static str, reason: String },

    #[error("pose/image count mismatch: {poses} poses, {images} images")]
    CountMismatch { poses: usize, images: usize },

    #[error("unknown pose format `{0}` (expected Standard, StandardNamed, COLMAP or PIX4D)")]
    UnknownPoseFormat(String),

    #[error("camera rig in {0} contains no cameras")]
    EmptyRig(PathBuf),

    #[error("invalid camera `{label}`: {reason}")]
    InvalidCamera { label: String, reason: String },

    #[error("required file not found: {0}")]
    MissingFile(PathBuf),
}

impl ConfigError {
    pub fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        ConfigError::InvalidSetting {
            field,
            reason: reason.into(),
        }
    }
}
