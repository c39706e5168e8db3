//! Assembles the rig, poses and images of a mapping run.

use anyhow::{Context, Result};
use tracing::info;

use super::calibration::load_camera_rig;
use super::images::{count_indexed_images, indexed_image_path, load_images};
use super::point_cloud::load_point_cloud;
use super::poses::load_poses;
use crate::config::DataSettings;
use crate::error::ConfigError;
use crate::frame::Frame;
use crate::geometry::CameraRig;
use crate::point_cloud::PointCloud;

#[derive(Debug)]
pub struct Dataset {
    pub rig: CameraRig,
    pub frames: Vec<Frame>,
    /// Precomputed cloud, when one is configured.
    pub point_cloud: Option<PointCloud>,
}

impl Dataset {
    /// Load and cross-check everything before any stage runs.
    pub fn load(settings: &DataSettings) -> Result<Self> {
        let calibration = settings.resolve(&settings.calibration_file);
        if !calibration.is_file() {
            return Err(ConfigError::MissingFile(calibration).into());
        }
        let rig = load_camera_rig(&calibration)?;
        let camera = rig.camera(0)?;

        let pose_file = settings.resolve(&settings.pose_file);
        if !pose_file.is_file() {
            return Err(ConfigError::MissingFile(pose_file).into());
        }
        let poses = load_poses(settings.pose_format, &pose_file, camera)?;

        let image_dir = settings.resolve(&settings.image_directory);
        let paths: Vec<_> = if settings.pose_format.is_named() {
            let mut paths = Vec::with_capacity(poses.len());
            for record in &poses {
                let name = record.image.as_deref().unwrap_or_default();
                let path = image_dir.join(name);
                if !path.is_file() {
                    return Err(ConfigError::MissingFile(path).into());
                }
                paths.push(path);
            }
            paths
        } else {
            let found =
                count_indexed_images(&image_dir, &settings.image_prefix, &settings.image_extension);
            if found != poses.len() {
                return Err(ConfigError::CountMismatch {
                    poses: poses.len(),
                    images: found,
                }
                .into());
            }
            (0..found)
                .map(|i| indexed_image_path(&image_dir, &settings.image_prefix, i, &settings.image_extension))
                .collect()
        };

        let images = load_images(&paths)?;
        let mut frames = Vec::with_capacity(images.len());
        for (seq, (record, image)) in poses.into_iter().zip(images).enumerate() {
            if image.width() != camera.width || image.height() != camera.height {
                return Err(ConfigError::InvalidCamera {
                    label: camera.label.clone(),
                    reason: format!(
                        "image {} is {}x{}, calibration says {}x{}",
                        paths[seq].display(),
                        image.width(),
                        image.height(),
                        camera.width,
                        camera.height
                    ),
                }
                .into());
            }
            frames.push(Frame::new(seq, record.pose, image));
        }

        let point_cloud = match &settings.point_cloud_file {
            Some(file) => {
                let path = settings.resolve(file);
                Some(load_point_cloud(&path).context("Failed to load precomputed point cloud")?)
            }
            None => None,
        };

        info!(
            "Dataset: {} cameras, {} frames{}",
            rig.len(),
            frames.len(),
            if point_cloud.is_some() { ", precomputed point cloud" } else { "" }
        );
        Ok(Self {
            rig,
            frames,
            point_cloud,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::poses::PoseFormat;
    use image::{GrayImage, Luma};
    use std::path::Path;

    const RIG: &str = "cameras:\n  - camera:\n      label: cam0\n      image_width: 8\n      image_height: 6\n      intrinsics: { data: [10.0, 10.0, 4.0, 3.0] }\n    T_B_C: { data: [1,0,0,0, 0,1,0,0, 0,0,1,0, 0,0,0,1] }\n";

    fn write_dataset(dir: &Path, poses: usize, images: usize) -> DataSettings {
        std::fs::write(dir.join("rig.yaml"), RIG).unwrap();
        let lines: String = (0..poses).map(|i| format!("{} 0 10 0 1 0 0\n", i)).collect();
        std::fs::write(dir.join("poses.txt"), lines).unwrap();
        std::fs::create_dir_all(dir.join("images")).unwrap();
        for i in 0..images {
            GrayImage::from_pixel(8, 6, Luma([7]))
                .save(dir.join("images").join(format!("image_{}.png", i)))
                .unwrap();
        }
        DataSettings {
            directory: dir.to_path_buf(),
            calibration_file: "rig.yaml".into(),
            pose_file: "poses.txt".into(),
            pose_format: PoseFormat::Standard,
            image_directory: "images".into(),
            image_prefix: "image_".to_string(),
            image_extension: "png".to_string(),
            point_cloud_file: None,
        }
    }

    #[test]
    fn test_load_dataset() {
        let dir = tempfile::tempdir().unwrap();
        let settings = write_dataset(dir.path(), 3, 3);
        let dataset = Dataset::load(&settings).unwrap();
        assert_eq!(dataset.frames.len(), 3);
        assert_eq!(dataset.frames[2].seq, 2);
        assert_eq!(dataset.frames[2].pose.translation.x, 2.0);
        assert!(dataset.point_cloud.is_none());
    }

    #[test]
    fn test_count_mismatch_is_a_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let settings = write_dataset(dir.path(), 4, 3);
        let err = Dataset::load(&settings).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ConfigError>(),
            Some(ConfigError::CountMismatch { poses: 4, images: 3 })
        ));
    }

    #[test]
    fn test_missing_calibration_is_a_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let mut settings = write_dataset(dir.path(), 1, 1);
        settings.calibration_file = "missing.yaml".into();
        let err = Dataset::load(&settings).unwrap_err();
        assert!(matches!(err.downcast_ref::<ConfigError>(), Some(ConfigError::MissingFile(_))));
    }

    #[test]
    fn test_precomputed_cloud_is_loaded() {
        let dir = tempfile::tempdir().unwrap();
        let mut settings = write_dataset(dir.path(), 1, 1);
        std::fs::write(dir.path().join("cloud.txt"), "0 0 1\n1 1 2\n").unwrap();
        settings.point_cloud_file = Some("cloud.txt".into());
        let dataset = Dataset::load(&settings).unwrap();
        assert_eq!(dataset.point_cloud.map(|c| c.len()), Some(2));
    }
}
