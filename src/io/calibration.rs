//! Camera rig calibration in the NCamera YAML layout:
//!
//! ```yaml
//! cameras:
//!   - camera:
//!       label: cam0
//!       image_width: 752
//!       image_height: 480
//!       intrinsics: { data: [fx, fy, cx, cy] }
//!       distortion: { type: radial-tangential, parameters: { data: [k1, k2, p1, p2] } }
//!     T_B_C: { data: [16 values, row-major] }
//! ```

use std::path::Path;

use anyhow::{Context, Result};
use nalgebra::{Matrix3, Matrix4};
use serde::Deserialize;
use tracing::{info, warn};

use crate::error::ConfigError;
use crate::geometry::{CameraRig, PinholeCamera, SE3};

/// Tolerance on the orthonormality of extrinsic rotations.
const ROTATION_TOLERANCE: f64 = 1e-6;

#[derive(Debug, Deserialize)]
struct MatrixYaml {
    data: Vec<f64>,
}

#[derive(Debug, Deserialize)]
struct DistortionYaml {
    #[serde(rename = "type", default)]
    kind: Option<String>,
    #[serde(default)]
    parameters: Option<MatrixYaml>,
}

#[derive(Debug, Deserialize)]
struct CameraYaml {
    #[serde(default)]
    label: String,
    image_width: u32,
    image_height: u32,
    intrinsics: MatrixYaml,
    #[serde(default)]
    distortion: Option<DistortionYaml>,
}

#[derive(Debug, Deserialize)]
struct RigEntryYaml {
    camera: CameraYaml,
    #[serde(rename = "T_B_C")]
    t_b_c: MatrixYaml,
}

#[derive(Debug, Deserialize)]
struct RigYaml {
    #[serde(default)]
    label: Option<String>,
    cameras: Vec<RigEntryYaml>,
}

pub fn load_camera_rig(path: &Path) -> Result<CameraRig> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to open calibration {}", path.display()))?;
    let rig = parse_camera_rig(&text)
        .with_context(|| format!("Invalid calibration {}", path.display()))?;
    if rig.is_empty() {
        return Err(ConfigError::EmptyRig(path.to_path_buf()).into());
    }
    Ok(rig)
}

pub fn parse_camera_rig(text: &str) -> Result<CameraRig> {
    let yaml: RigYaml = serde_yaml::from_str(text)?;
    let mut cameras = Vec::with_capacity(yaml.cameras.len());
    for (index, entry) in yaml.cameras.into_iter().enumerate() {
        let label = if entry.camera.label.is_empty() {
            format!("cam{}", index)
        } else {
            entry.camera.label.clone()
        };
        cameras.push(camera_from(&label, entry)?);
    }
    info!(
        "Loaded camera rig {} with {} cameras",
        yaml.label.as_deref().unwrap_or("<unnamed>"),
        cameras.len()
    );
    Ok(CameraRig::new(cameras))
}

fn camera_from(label: &str, entry: RigEntryYaml) -> Result<PinholeCamera, ConfigError> {
    let invalid = |reason: String| ConfigError::InvalidCamera {
        label: label.to_string(),
        reason,
    };
    let camera = entry.camera;
    let k = &camera.intrinsics.data;
    if k.len() != 4 {
        return Err(invalid(format!(
            "expected 4 intrinsics [fx, fy, cx, cy], got {}",
            k.len()
        )));
    }
    if !(k[0] > 0.0 && k[1] > 0.0) {
        return Err(invalid(format!("focal lengths must be positive, got {} / {}", k[0], k[1])));
    }
    if camera.image_width == 0 || camera.image_height == 0 {
        return Err(invalid("image size must be positive".to_string()));
    }
    if let Some(distortion) = &camera.distortion {
        let nonzero = distortion
            .parameters
            .as_ref()
            .is_some_and(|p| p.data.iter().any(|&c| c != 0.0));
        if nonzero {
            warn!(
                "Camera {}: {} distortion is ignored, images are assumed undistorted",
                label,
                distortion.kind.as_deref().unwrap_or("unknown")
            );
        }
    }
    let t_b_c = rigid_transform(&entry.t_b_c.data).map_err(invalid)?;
    Ok(
        PinholeCamera::new(label, camera.image_width, camera.image_height, k[0], k[1], k[2], k[3])
            .with_extrinsic(t_b_c),
    )
}

fn rigid_transform(data: &[f64]) -> Result<SE3, String> {
    if data.len() != 16 {
        return Err(format!("expected 16 elements for T_B_C, got {}", data.len()));
    }
    let m = Matrix4::from_row_slice(data);
    let rotation: Matrix3<f64> = m.fixed_view::<3, 3>(0, 0).into_owned();
    let orthonormal = (rotation.transpose() * rotation - Matrix3::identity()).norm() < ROTATION_TOLERANCE;
    let last_row_ok = m[(3, 0)] == 0.0 && m[(3, 1)] == 0.0 && m[(3, 2)] == 0.0 && m[(3, 3)] == 1.0;
    if !orthonormal || rotation.determinant() <= 0.0 || !last_row_ok {
        return Err("T_B_C is not a rigid transform".to_string());
    }
    Ok(SE3::from_matrix(m))
}
