//! Pose files.
//!
//! Every format is turned into body poses T_G_B. Camera-centric formats
//! (COLMAP, PIX4D) are converted with the extrinsic of rig camera 0.

use std::path::Path;
use std::str::FromStr;

use anyhow::{Context, Result, bail};
use nalgebra::{Matrix3, Rotation3, Vector3};
use serde::{Deserialize, Serialize};
use tracing::info;

use super::table::{parse_floats, parse_rows};
use crate::error::ConfigError;
use crate::geometry::{PinholeCamera, SE3};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PoseFormat {
    /// `x y z qw qx qy qz` per line, body poses.
    #[default]
    Standard,
    /// `image x y z qw qx qy qz` per line, body poses.
    StandardNamed,
    /// COLMAP `images.txt` (world → camera).
    #[serde(rename = "COLMAP")]
    Colmap,
    /// Pix4D calibrated external camera parameters
    /// (`image X Y Z omega phi kappa`, degrees).
    #[serde(rename = "PIX4D")]
    Pix4d,
}

impl PoseFormat {
    /// Whether the file names the image of every pose.
    pub fn is_named(self) -> bool {
        !matches!(self, PoseFormat::Standard)
    }
}

impl FromStr for PoseFormat {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Standard" | "standard" => Ok(PoseFormat::Standard),
            "StandardNamed" | "standard_named" => Ok(PoseFormat::StandardNamed),
            "COLMAP" | "colmap" => Ok(PoseFormat::Colmap),
            "PIX4D" | "pix4d" => Ok(PoseFormat::Pix4d),
            other => Err(ConfigError::UnknownPoseFormat(other.to_string())),
        }
    }
}

#[derive(Debug, Clone)]
pub struct PoseRecord {
    /// Image file name, for named formats.
    pub image: Option<String>,
    /// Body pose T_G_B.
    pub pose: SE3,
}

pub fn load_poses(format: PoseFormat, path: &Path, camera: &PinholeCamera) -> Result<Vec<PoseRecord>> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to open pose file {}", path.display()))?;
    let records = parse_poses(format, &text, camera)
        .with_context(|| format!("Failed to parse {:?} poses from {}", format, path.display()))?;
    info!("Loaded {} poses from {}", records.len(), path.display());
    Ok(records)
}

pub fn parse_poses(format: PoseFormat, text: &str, camera: &PinholeCamera) -> Result<Vec<PoseRecord>> {
    let t_c_b = camera.t_body_cam.inverse();
    match format {
        PoseFormat::Standard => parse_rows(text)?
            .iter()
            .map(|row| {
                let [x, y, z, qw, qx, qy, qz] = parse_floats::<7>(row, 0)?;
                Ok(PoseRecord {
                    image: None,
                    pose: SE3::from_quaternion(qw, qx, qy, qz, Vector3::new(x, y, z)),
                })
            })
            .collect(),
        PoseFormat::StandardNamed => parse_rows(text)?
            .iter()
            .map(|row| {
                let [x, y, z, qw, qx, qy, qz] = parse_floats::<7>(row, 1)?;
                Ok(PoseRecord {
                    image: Some(row[0].clone()),
                    pose: SE3::from_quaternion(qw, qx, qy, qz, Vector3::new(x, y, z)),
                })
            })
            .collect(),
        PoseFormat::Colmap => parse_colmap(text, &t_c_b),
        PoseFormat::Pix4d => parse_rows(text)?
            .iter()
            .filter(|row| row.get(1).is_some_and(|f| f.parse::<f64>().is_ok()))
            .map(|row| {
                let [x, y, z, omega, phi, kappa] = parse_floats::<6>(row, 1)?;
                let t_g_c = SE3::from_rt(
                    pix4d_rotation(omega, phi, kappa),
                    Vector3::new(x, y, z),
                );
                Ok(PoseRecord {
                    image: Some(row[0].clone()),
                    pose: t_g_c.compose(&t_c_b),
                })
            })
            .collect(),
    }
}

/// `images.txt`: an image line `ID QW QX QY QZ TX TY TZ CAMERA_ID NAME`
/// followed by a (possibly empty) line of 2D observations.
fn parse_colmap(text: &str, t_c_b: &SE3) -> Result<Vec<PoseRecord>> {
    let lines: Vec<&str> = text
        .lines()
        .filter(|line| !line.trim_start().starts_with('#'))
        .collect();
    let mut records = Vec::new();
    for line in lines.iter().step_by(2) {
        let fields: Vec<String> = line.split_whitespace().map(str::to_string).collect();
        if fields.is_empty() {
            continue;
        }
        if fields.len() < 10 {
            bail!("COLMAP image line has {} fields, expected 10: `{}`", fields.len(), line);
        }
        let [qw, qx, qy, qz, tx, ty, tz] = parse_floats::<7>(&fields, 1)?;
        let t_c_g = SE3::from_quaternion(qw, qx, qy, qz, Vector3::new(tx, ty, tz));
        records.push(PoseRecord {
            image: Some(fields[9].clone()),
            pose: t_c_g.inverse().compose(t_c_b),
        });
    }
    Ok(records)
}

/// Camera → world rotation from Pix4D angles. Pix4D cameras look along -z
/// with y up; the trailing flip converts to x right, y down, z forward.
fn pix4d_rotation(omega_deg: f64, phi_deg: f64, kappa_deg: f64) -> Matrix3<f64> {
    let rx = Rotation3::from_axis_angle(&Vector3::x_axis(), omega_deg.to_radians());
    let ry = Rotation3::from_axis_angle(&Vector3::y_axis(), phi_deg.to_radians());
    let rz = Rotation3::from_axis_angle(&Vector3::z_axis(), kappa_deg.to_radians());
    (rx * ry * rz).into_inner() * Matrix3::from_diagonal(&Vector3::new(1.0, -1.0, -1.0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::UnitQuaternion;

    fn camera() -> PinholeCamera {
        PinholeCamera::new("cam0", 100, 100, 100.0, 100.0, 50.0, 50.0)
    }

    fn nadir() -> Matrix3<f64> {
        Matrix3::new(1.0, 0.0, 0.0, 0.0, -1.0, 0.0, 0.0, 0.0, -1.0)
    }

    #[test]
    fn test_standard_poses() {
        let text = "# x y z qw qx qy qz\n1 2 3 1 0 0 0\n4 5 6 0 1 0 0\n";
        let poses = parse_poses(PoseFormat::Standard, text, &camera()).unwrap();
        assert_eq!(poses.len(), 2);
        assert!(poses[0].image.is_none());
        assert_eq!(poses[1].pose.translation, Vector3::new(4.0, 5.0, 6.0));
        assert!((poses[1].pose.rotation_matrix() - nadir()).norm() < 1e-12);
    }

    #[test]
    fn test_standard_named_poses() {
        let text = "img_0.jpg 1 2 3 1 0 0 0\nimg_1.jpg 1 2 3 1 0 0 0\n";
        let poses = parse_poses(PoseFormat::StandardNamed, text, &camera()).unwrap();
        assert_eq!(poses[1].image.as_deref(), Some("img_1.jpg"));
    }

    #[test]
    fn test_short_line_is_an_error() {
        assert!(parse_poses(PoseFormat::Standard, "1 2 3 1 0 0\n", &camera()).is_err());
    }

    #[test]
    fn test_colmap_inverts_world_to_camera() {
        // Camera at (2, 3, 10) looking down: R_C_G = nadir, t = -R_C_G * c.
        let c = Vector3::new(2.0, 3.0, 10.0);
        let q = UnitQuaternion::from_matrix(&nadir());
        let t = -(nadir() * c);
        let text = format!(
            "# Image list\n1 {} {} {} {} {} {} {} 1 frame_0.png\n10.0 20.0 -1\n2 1 0 0 0 0 0 0 1 frame_1.png\n\n",
            q.w, q.i, q.j, q.k, t.x, t.y, t.z
        );
        let poses = parse_poses(PoseFormat::Colmap, &text, &camera()).unwrap();
        assert_eq!(poses.len(), 2);
        assert_eq!(poses[0].image.as_deref(), Some("frame_0.png"));
        assert!((poses[0].pose.translation - c).norm() < 1e-9);
        assert!((poses[0].pose.rotation_matrix() - nadir()).norm() < 1e-9);
        assert_eq!(poses[1].image.as_deref(), Some("frame_1.png"));
    }

    #[test]
    fn test_pix4d_zero_angles_look_down() {
        let text = "imageName X Y Z Omega Phi Kappa\nIMG_1.JPG 10.0 20.0 100.0 0 0 0\n";
        let poses = parse_poses(PoseFormat::Pix4d, text, &camera()).unwrap();
        assert_eq!(poses.len(), 1);
        assert_eq!(poses[0].image.as_deref(), Some("IMG_1.JPG"));
        assert!((poses[0].pose.rotation_matrix() - nadir()).norm() < 1e-12);
        assert_eq!(poses[0].pose.translation, Vector3::new(10.0, 20.0, 100.0));
    }

    #[test]
    fn test_pose_format_from_str() {
        assert_eq!("COLMAP".parse::<PoseFormat>().unwrap(), PoseFormat::Colmap);
        assert_eq!("PIX4D".parse::<PoseFormat>().unwrap(), PoseFormat::Pix4d);
        assert!(matches!(
            "ROS".parse::<PoseFormat>(),
            Err(ConfigError::UnknownPoseFormat(_))
        ));
    }
}
