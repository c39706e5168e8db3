//! Run configuration, read from a YAML file.
//!
//! Every section has defaults, so a file only needs the keys that differ:
//!
//! ```yaml
//! data:
//!   directory: /data/flight_01
//!   pose_format: COLMAP
//! grid: { center_easting: 465000.0, center_northing: 5249000.0, resolution: 0.5 }
//! pipeline: { mode: incremental, window_size: 8 }
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::dense::DenseSettings;
use crate::error::ConfigError;
use crate::io::PoseFormat;
use crate::ortho::OrthoSettings;
use crate::pipeline::{PipelineSettings, ProcessingMode};
use crate::publish::RerunSink;
use crate::raster::{GridSettings, RasterGeometry};

/// Input locations. Relative paths resolve against `directory`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DataSettings {
    pub directory: PathBuf,
    pub calibration_file: PathBuf,
    pub pose_file: PathBuf,
    pub pose_format: PoseFormat,
    pub image_directory: PathBuf,
    /// Indexed image names are `{image_prefix}{index}.{image_extension}`.
    pub image_prefix: String,
    pub image_extension: String,
    /// Use this cloud instead of dense stereo (batch mode only).
    pub point_cloud_file: Option<PathBuf>,
}

impl Default for DataSettings {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("."),
            calibration_file: PathBuf::from("calibration.yaml"),
            pose_file: PathBuf::from("poses.txt"),
            pose_format: PoseFormat::Standard,
            image_directory: PathBuf::from("images"),
            image_prefix: "image_".to_string(),
            image_extension: "jpg".to_string(),
            point_cloud_file: None,
        }
    }
}

impl DataSettings {
    pub fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.directory.join(path)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputSettings {
    /// Orthomosaic image written after the run.
    pub orthomosaic_file: Option<PathBuf>,
    /// Fused points written after the run.
    pub point_cloud_file: Option<PathBuf>,
    pub rerun: Option<RerunSink>,
    /// Keep republishing the final map until interrupted.
    pub publish_until_stopped: bool,
    pub republish_interval_ms: u64,
}

impl Default for OutputSettings {
    fn default() -> Self {
        Self {
            orthomosaic_file: None,
            point_cloud_file: None,
            rerun: None,
            publish_until_stopped: false,
            republish_interval_ms: 1000,
        }
    }
}

impl OutputSettings {
    pub fn republish_interval(&self) -> Duration {
        Duration::from_millis(self.republish_interval_ms)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MapperConfig {
    pub data: DataSettings,
    pub grid: GridSettings,
    pub dense: DenseSettings,
    pub ortho: OrthoSettings,
    pub pipeline: PipelineSettings,
    pub output: OutputSettings,
}

impl MapperConfig {
    pub fn from_yaml_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to open config {}", path.display()))?;
        Self::from_yaml_str(&text).with_context(|| format!("Invalid config {}", path.display()))
    }

    pub fn from_yaml_str(text: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(text)?)
    }

    /// Check every section before anything is loaded.
    pub fn validate(&self) -> Result<(), ConfigError> {
        RasterGeometry::from_settings(&self.grid)?;
        self.dense.validate()?;
        self.pipeline.validate()?;
        if !self.ortho.flat_elevation_m.is_finite() {
            return Err(ConfigError::invalid("ortho.flat_elevation_m", "must be finite"));
        }
        if self.pipeline.mode == ProcessingMode::Incremental && self.data.point_cloud_file.is_some() {
            return Err(ConfigError::invalid(
                "data.point_cloud_file",
                "a precomputed point cloud is only supported in batch mode",
            ));
        }
        if self.output.publish_until_stopped && self.output.republish_interval_ms == 0 {
            return Err(ConfigError::invalid(
                "output.republish_interval_ms",
                "must be positive",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ortho::ElevationMode;
    use crate::raster::ColorMode;

    #[test]
    fn test_empty_file_gives_defaults() {
        let config = MapperConfig::from_yaml_str("{}").unwrap();
        assert_eq!(config, MapperConfig::default());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_sections_keep_defaults() {
        let yaml = "
data:
  directory: /flight
  pose_format: PIX4D
grid:
  resolution: 0.25
ortho:
  elevation_mode: flat
  color_mode: rgb
pipeline:
  mode: incremental
  window_size: 4
output:
  rerun: spawn
";
        let config = MapperConfig::from_yaml_str(yaml).unwrap();
        assert_eq!(config.data.pose_format, PoseFormat::Pix4d);
        assert_eq!(config.data.image_prefix, "image_");
        assert_eq!(config.grid.resolution, 0.25);
        assert_eq!(config.grid.delta_easting, 100.0);
        assert_eq!(config.ortho.elevation_mode, ElevationMode::Flat);
        assert_eq!(config.ortho.color_mode, ColorMode::Rgb);
        assert_eq!(config.pipeline.mode, ProcessingMode::Incremental);
        assert_eq!(config.output.rerun, Some(RerunSink::Spawn));
        assert_eq!(
            config.data.resolve(Path::new("poses.txt")),
            PathBuf::from("/flight/poses.txt")
        );
        assert_eq!(
            config.data.resolve(Path::new("/abs/rig.yaml")),
            PathBuf::from("/abs/rig.yaml")
        );
    }

    #[test]
    fn test_unknown_pose_format_is_rejected() {
        assert!(MapperConfig::from_yaml_str("data: { pose_format: ROS }").is_err());
    }

    #[test]
    fn test_precomputed_cloud_requires_batch_mode() {
        let mut config = MapperConfig::default();
        config.data.point_cloud_file = Some(PathBuf::from("cloud.txt"));
        assert!(config.validate().is_ok());
        config.pipeline.mode = ProcessingMode::Incremental;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidSetting { field: "data.point_cloud_file", .. })
        ));
    }

    #[test]
    fn test_invalid_sections_are_reported() {
        let mut config = MapperConfig::default();
        config.grid.resolution = 0.0;
        assert!(config.validate().is_err());

        let config = MapperConfig::from_yaml_str("grid: { delta_easting: .inf }").unwrap();
        assert!(config.grid.delta_easting.is_infinite());
        assert!(config.validate().is_err());

        let mut config = MapperConfig::default();
        config.dense.use_every_nth_image = 0;
        assert!(config.validate().is_err());

        let mut config = MapperConfig::default();
        config.pipeline = PipelineSettings {
            mode: ProcessingMode::Incremental,
            window_size: 0,
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_file_is_read() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mapper.yaml");
        std::fs::write(&path, "pipeline: { window_size: 3 }\n").unwrap();
        assert_eq!(MapperConfig::from_yaml_file(&path).unwrap().pipeline.window_size, 3);
        assert!(MapperConfig::from_yaml_file(&dir.path().join("nope.yaml")).is_err());
    }
}
