//! Point cloud production: dense stereo over frame pairs, or a fixed cloud
//! loaded from file.

pub mod matcher;
#[cfg(feature = "opencv")]
mod opencv_matcher;
mod reconstructor;
pub mod rectify;

pub use matcher::{BlockMatchingParameters, DisparityMap, MatcherKind, StereoMatcher};
pub use reconstructor::{DenseReconstructor, DenseSettings};
pub use rectify::{RectifiedImage, RectifiedPair, rectify_pair};

use anyhow::Result;

use crate::frame::Frame;
use crate::geometry::CameraRig;
use crate::point_cloud::PointCloud;

/// Where the points of a pass come from.
pub enum PointCloudProducer {
    Dense(DenseReconstructor),
    /// A cloud read from file; returned as-is on every call.
    Precomputed(PointCloud),
}

impl PointCloudProducer {
    pub fn produce(&mut self, rig: &CameraRig, frames: &[Frame]) -> Result<PointCloud> {
        match self {
            PointCloudProducer::Dense(reconstructor) => reconstructor.reconstruct(rig, frames),
            PointCloudProducer::Precomputed(cloud) => Ok(cloud.clone()),
        }
    }

    pub fn is_dense(&self) -> bool {
        matches!(self, PointCloudProducer::Dense(_))
    }
}
