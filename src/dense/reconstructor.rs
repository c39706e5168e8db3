//! Pairwise dense reconstruction over a frame stream.
//!
//! Frames are selected with a stride counted over the whole stream: with a
//! stride of N the N-th, 2N-th, ... frames are used. Each selected frame is
//! paired with the previously selected one, which stays alive across calls
//! as the anchor. Pairs are independent and may be
//! reconstructed on the rayon pool; clouds are concatenated in pair order.

use anyhow::{Context, Result};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::matcher::{BlockMatchingParameters, MatcherKind, StereoMatcher};
use super::rectify::{BackProjection, rectify_pair};
use crate::error::ConfigError;
use crate::frame::Frame;
use crate::geometry::CameraRig;
use crate::point_cloud::PointCloud;

/// Dense stereo configuration.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DenseSettings {
    /// Stride over the frame stream (1 = every frame).
    pub use_every_nth_image: usize,
    pub matcher: MatcherKind,
    pub block_matching: BlockMatchingParameters,
    /// Pairs with a shorter baseline are skipped [m].
    pub min_baseline_m: f64,
    pub min_depth_m: f64,
    pub max_depth_m: f64,
    /// Back-project every n-th pixel in each direction.
    pub pixel_step: usize,
    /// Reconstruct pairs on the rayon pool.
    pub use_multi_threads: bool,
    /// Serve the matcher with OpenCV (requires the `opencv` feature).
    pub use_opencv: bool,
}

impl Default for DenseSettings {
    fn default() -> Self {
        Self {
            use_every_nth_image: 1,
            matcher: MatcherKind::BlockMatching,
            block_matching: BlockMatchingParameters::default(),
            min_baseline_m: 0.05,
            min_depth_m: 0.5,
            max_depth_m: 1000.0,
            pixel_step: 1,
            use_multi_threads: true,
            use_opencv: false,
        }
    }
}

impl DenseSettings {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.use_every_nth_image == 0 {
            return Err(ConfigError::invalid(
                "dense.use_every_nth_image",
                "must be at least 1",
            ));
        }
        if self.pixel_step == 0 {
            return Err(ConfigError::invalid("dense.pixel_step", "must be at least 1"));
        }
        if !(self.min_depth_m >= 0.0 && self.max_depth_m > self.min_depth_m) {
            return Err(ConfigError::invalid(
                "dense.max_depth_m",
                format!(
                    "depth range [{}, {}] is empty",
                    self.min_depth_m, self.max_depth_m
                ),
            ));
        }
        if !(self.min_baseline_m >= 0.0) {
            return Err(ConfigError::invalid("dense.min_baseline_m", "must not be negative"));
        }
        if self.use_opencv && !cfg!(feature = "opencv") {
            return Err(ConfigError::invalid(
                "dense.use_opencv",
                "built without the `opencv` feature",
            ));
        }
        self.block_matching.validate()
    }
}

pub struct DenseReconstructor {
    settings: DenseSettings,
    matcher: StereoMatcher,
    /// Last selected frame, paired with the next selected one.
    anchor: Option<Frame>,
    /// Frames seen so far, selected or not.
    frames_seen: usize,
}

impl DenseReconstructor {
    pub fn new(settings: DenseSettings) -> Self {
        Self {
            matcher: StereoMatcher::new(settings.matcher, settings.block_matching),
            settings,
            anchor: None,
            frames_seen: 0,
        }
    }

    pub fn settings(&self) -> &DenseSettings {
        &self.settings
    }

    pub fn anchor(&self) -> Option<&Frame> {
        self.anchor.as_ref()
    }

    /// Reconstruct every stereo pair formed by `frames` (and the anchor).
    ///
    /// The anchor and frame counter only advance when every pair succeeds.
    pub fn reconstruct(&mut self, rig: &CameraRig, frames: &[Frame]) -> Result<PointCloud> {
        let stride = self.settings.use_every_nth_image.max(1);
        let mut anchor = self.anchor.clone();
        let mut pairs = Vec::new();
        for (offset, frame) in frames.iter().enumerate() {
            if (self.frames_seen + offset + 1) % stride != 0 {
                continue;
            }
            if let Some(previous) = anchor.replace(frame.clone()) {
                pairs.push((previous, frame.clone()));
            }
        }
        if pairs.is_empty() {
            debug!("Fewer than two frames available, no stereo pairs");
            self.anchor = anchor;
            self.frames_seen += frames.len();
            return Ok(PointCloud::new());
        }

        let clouds: Vec<Result<PointCloud>> = if self.settings.use_multi_threads {
            pairs
                .par_iter()
                .map(|(reference, other)| self.reconstruct_pair(rig, reference, other))
                .collect()
        } else {
            pairs
                .iter()
                .map(|(reference, other)| self.reconstruct_pair(rig, reference, other))
                .collect()
        };

        let mut cloud = PointCloud::new();
        for result in clouds {
            cloud.append(result?);
        }
        self.anchor = anchor;
        self.frames_seen += frames.len();
        info!("Dense stereo: {} pairs -> {} points", pairs.len(), cloud.len());
        Ok(cloud)
    }

    fn reconstruct_pair(&self, rig: &CameraRig, reference: &Frame, other: &Frame) -> Result<PointCloud> {
        let cam_ref = rig
            .camera(reference.camera_index)
            .with_context(|| format!("Frame {} has no camera", reference.seq))?;
        let cam_other = rig
            .camera(other.camera_index)
            .with_context(|| format!("Frame {} has no camera", other.seq))?;
        let pose_ref = cam_ref.camera_pose(&reference.pose);
        let pose_other = cam_other.camera_pose(&other.pose);
        let luma_ref = reference.image.to_luma();
        let luma_other = other.image.to_luma();

        let Some(pair) = rectify_pair(
            (cam_ref, &pose_ref, &luma_ref),
            (cam_other, &pose_other, &luma_other),
            self.settings.min_baseline_m,
        ) else {
            return Ok(PointCloud::new());
        };

        let disparity = if self.settings.use_opencv {
            compute_with_opencv(&self.matcher, &pair.left, &pair.right)?
        } else {
            self.matcher.compute(&pair.left, &pair.right)?
        };
        let gate = BackProjection {
            min_depth: self.settings.min_depth_m,
            max_depth: self.settings.max_depth_m,
            pixel_step: self.settings.pixel_step,
        };
        let cloud = pair.back_project(&disparity, &gate, reference.seq);
        debug!(
            "Pair ({}, {}): baseline {:.3} m, {} disparities, {} points",
            reference.seq,
            other.seq,
            pair.baseline,
            disparity.valid_count(),
            cloud.len()
        );
        Ok(cloud)
    }
}

#[cfg(feature = "opencv")]
fn compute_with_opencv(
    matcher: &StereoMatcher,
    left: &super::RectifiedImage,
    right: &super::RectifiedImage,
) -> Result<super::DisparityMap> {
    super::opencv_matcher::compute(matcher, left, right)
}

#[cfg(not(feature = "opencv"))]
fn compute_with_opencv(
    _matcher: &StereoMatcher,
    _left: &super::RectifiedImage,
    _right: &super::RectifiedImage,
) -> Result<super::DisparityMap> {
    anyhow::bail!("OpenCV matcher requested but the `opencv` feature is disabled")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{nadir_rig, textured_frame};

    fn settings() -> DenseSettings {
        DenseSettings {
            block_matching: BlockMatchingParameters {
                num_disparities: 32,
                block_size: 7,
                ..BlockMatchingParameters::default()
            },
            ..DenseSettings::default()
        }
    }

    #[test]
    fn test_single_frame_yields_nothing() {
        let rig = nadir_rig();
        let mut reconstructor = DenseReconstructor::new(settings());
        let cloud = reconstructor.reconstruct(&rig, &[textured_frame(0, -0.5, 0.0)]).unwrap();
        assert!(cloud.is_empty());
        assert!(reconstructor.anchor().is_some());
    }

    #[test]
    fn test_pair_reconstructs_ground_plane() {
        let rig = nadir_rig();
        let frames = [textured_frame(0, -0.5, 0.0), textured_frame(1, 0.5, 0.0)];
        let cloud = DenseReconstructor::new(settings()).reconstruct(&rig, &frames).unwrap();
        assert!(cloud.len() > 500, "only {} points", cloud.len());
        for point in cloud.iter() {
            assert!(point.position.z.abs() < 0.25, "z = {}", point.position.z);
            assert_eq!(point.source, Some(0));
        }
    }

    #[test]
    fn test_anchor_pairs_across_calls() {
        let rig = nadir_rig();
        let mut split = DenseReconstructor::new(settings());
        let first = split.reconstruct(&rig, &[textured_frame(0, -0.5, 0.0)]).unwrap();
        let second = split.reconstruct(&rig, &[textured_frame(1, 0.5, 0.0)]).unwrap();
        assert!(first.is_empty());

        let whole = DenseReconstructor::new(settings())
            .reconstruct(&rig, &[textured_frame(0, -0.5, 0.0), textured_frame(1, 0.5, 0.0)])
            .unwrap();
        assert_eq!(second, whole);
    }

    #[test]
    fn test_stride_skips_frames() {
        let rig = nadir_rig();
        let frames: Vec<_> = (0..6).map(|i| textured_frame(i, -1.25 + 0.5 * i as f64, 0.0)).collect();
        let mut reconstructor = DenseReconstructor::new(DenseSettings {
            use_every_nth_image: 2,
            ..settings()
        });
        let cloud = reconstructor.reconstruct(&rig, &frames[..5]).unwrap();
        // Selected: 1, 3 -> pair (1, 3). Frame 4 is skipped.
        assert_eq!(reconstructor.anchor().map(|f| f.seq), Some(3));
        let sources: std::collections::BTreeSet<_> = cloud.iter().filter_map(|p| p.source).collect();
        assert_eq!(sources.into_iter().collect::<Vec<_>>(), vec![1]);

        // The count carries over: frame 5 is the 6th frame of the stream.
        let cloud = reconstructor.reconstruct(&rig, &frames[5..]).unwrap();
        assert_eq!(reconstructor.anchor().map(|f| f.seq), Some(5));
        assert!(cloud.iter().all(|p| p.source == Some(3)));
        assert!(!cloud.is_empty());
    }

    #[test]
    fn test_parallel_matches_sequential() {
        let rig = nadir_rig();
        let frames: Vec<_> = (0..4).map(|i| textured_frame(i, -1.5 + i as f64, 0.0)).collect();
        let parallel = DenseReconstructor::new(settings()).reconstruct(&rig, &frames).unwrap();
        let sequential = DenseReconstructor::new(DenseSettings {
            use_multi_threads: false,
            ..settings()
        })
        .reconstruct(&rig, &frames)
        .unwrap();
        assert_eq!(parallel, sequential);
    }

    #[test]
    fn test_unknown_camera_fails_pair() {
        let rig = nadir_rig();
        let frames = [
            textured_frame(0, -0.5, 0.0),
            textured_frame(1, 0.5, 0.0).with_camera(3),
        ];
        let mut reconstructor = DenseReconstructor::new(settings());
        assert!(reconstructor.reconstruct(&rig, &frames).is_err());
        // A failed call leaves the stream state untouched.
        assert!(reconstructor.anchor().is_none());
    }

    #[test]
    fn test_settings_validation() {
        assert!(DenseSettings::default().validate().is_ok());
        let bad = DenseSettings {
            use_every_nth_image: 0,
            ..DenseSettings::default()
        };
        assert!(bad.validate().is_err());
        let bad = DenseSettings {
            min_depth_m: 10.0,
            max_depth_m: 5.0,
            ..DenseSettings::default()
        };
        assert!(bad.validate().is_err());
    }
}
