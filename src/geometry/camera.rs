//! Pinhole camera model and the multi-camera rig.
//!
//! Camera frame convention (OpenCV): x right, y down, z forward along the
//! optical axis. Pixel centers sit on integer coordinates.

use anyhow::{Result, anyhow};
use nalgebra::{Matrix3, Vector2, Vector3};

use super::SE3;

#[derive(Debug, Clone)]
pub struct PinholeCamera {
    pub label: String,
    pub width: u32,
    pub height: u32,
    pub fx: f64,
    pub fy: f64,
    pub cx: f64,
    pub cy: f64,
    /// Extrinsic: camera frame expressed in the body frame.
    pub t_body_cam: SE3,
}

impl PinholeCamera {
    pub fn new(label: &str, width: u32, height: u32, fx: f64, fy: f64, cx: f64, cy: f64) -> Self {
        Self {
            label: label.to_string(),
            width,
            height,
            fx,
            fy,
            cx,
            cy,
            t_body_cam: SE3::identity(),
        }
    }

    pub fn with_extrinsic(mut self, t_body_cam: SE3) -> Self {
        self.t_body_cam = t_body_cam;
        self
    }

    pub fn k(&self) -> Matrix3<f64> {
        Matrix3::new(self.fx, 0.0, self.cx, 0.0, self.fy, self.cy, 0.0, 0.0, 1.0)
    }

    /// World pose of this camera given the body pose: T_G_C = T_G_B * T_B_C.
    pub fn camera_pose(&self, t_world_body: &SE3) -> SE3 {
        t_world_body.compose(&self.t_body_cam)
    }

    /// Project a camera-frame point. `None` if the point is not in front of the camera.
    pub fn project(&self, p_cam: &Vector3<f64>) -> Option<Vector2<f64>> {
        if p_cam.z <= 0.0 {
            return None;
        }
        Some(Vector2::new(
            self.fx * p_cam.x / p_cam.z + self.cx,
            self.fy * p_cam.y / p_cam.z + self.cy,
        ))
    }

    /// Nearest pixel to `uv`, if it lies inside the image.
    pub fn nearest_pixel(&self, uv: &Vector2<f64>) -> Option<(u32, u32)> {
        let u = uv.x.round();
        let v = uv.y.round();
        if u >= 0.0 && v >= 0.0 && u < self.width as f64 && v < self.height as f64 {
            Some((u as u32, v as u32))
        } else {
            None
        }
    }

    /// Unit-depth ray through pixel `(u, v)` in the camera frame.
    pub fn unproject(&self, u: f64, v: f64) -> Vector3<f64> {
        Vector3::new((u - self.cx) / self.fx, (v - self.cy) / self.fy, 1.0)
    }
}

/// The cameras mounted on the body, indexed by `Frame::camera_index`.
#[derive(Debug, Clone, Default)]
pub struct CameraRig {
    cameras: Vec<PinholeCamera>,
}

impl CameraRig {
    pub fn new(cameras: Vec<PinholeCamera>) -> Self {
        Self { cameras }
    }

    pub fn get(&self, index: usize) -> Option<&PinholeCamera> {
        self.cameras.get(index)
    }

    /// Like [`CameraRig::get`], but a missing camera is an error.
    pub fn camera(&self, index: usize) -> Result<&PinholeCamera> {
        self.cameras.get(index).ok_or_else(|| {
            anyhow!(
                "camera index {} not in rig with {} cameras",
                index,
                self.cameras.len()
            )
        })
    }

    pub fn len(&self) -> usize {
        self.cameras.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cameras.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &PinholeCamera> {
        self.cameras.iter()
    }
}
