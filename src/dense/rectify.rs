//! Planar rectification of a calibrated frame pair with known poses.
//!
//! The rectified frame keeps the reference camera center and intrinsics.
//! Its x axis points along the baseline (reference to other camera center),
//! y is the reference optical axis crossed with x, and z = x × y. Both images
//! are resampled into this frame so that epipolar lines become image rows and
//! a scene point at depth Z appears `fx * B / Z` pixels further left in the
//! other image.

use image::GrayImage;
use nalgebra::{Matrix3, Vector3};
use tracing::debug;

use super::DisparityMap;
use crate::geometry::{PinholeCamera, SE3};
use crate::point_cloud::{PointCloud, WorldPoint};

/// Minimum |optical axis × baseline direction| for a usable pair.
const MIN_AXIS_BASELINE_SINE: f64 = 1e-3;

/// A resampled grayscale image with a per-pixel validity mask.
#[derive(Debug, Clone, PartialEq)]
pub struct RectifiedImage {
    pub width: usize,
    pub height: usize,
    pub data: Vec<f32>,
    /// False where the source pixel fell outside the original image.
    pub valid: Vec<bool>,
}

impl RectifiedImage {
    /// Wrap an image as-is (every pixel valid).
    pub fn from_gray(image: &GrayImage) -> Self {
        Self {
            width: image.width() as usize,
            height: image.height() as usize,
            data: image.pixels().map(|p| p[0] as f32).collect(),
            valid: vec![true; (image.width() * image.height()) as usize],
        }
    }

    pub fn get(&self, x: usize, y: usize) -> Option<f32> {
        let i = y * self.width + x;
        if x < self.width && y < self.height && self.valid[i] {
            Some(self.data[i])
        } else {
            None
        }
    }
}

/// Rectified geometry of one pair.
#[derive(Debug, Clone)]
pub struct RectifiedPair {
    /// Reference image, resampled.
    pub left: RectifiedImage,
    /// Other image, resampled.
    pub right: RectifiedImage,
    pub fx: f64,
    pub fy: f64,
    pub cx: f64,
    pub cy: f64,
    /// Distance between the two camera centers [m].
    pub baseline: f64,
    /// Rotation world → rectified frame (rows are the rectified axes).
    pub r_rect_world: Matrix3<f64>,
    /// Reference camera center in the world frame.
    pub center: Vector3<f64>,
}

/// Depth gating and subsampling applied when turning disparities into points.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BackProjection {
    pub min_depth: f64,
    pub max_depth: f64,
    pub pixel_step: usize,
}

/// Rectify `reference` against `other`.
///
/// Returns `None` for degenerate pairs: baseline shorter than
/// `min_baseline`, or baseline (nearly) parallel to the reference optical
/// axis.
pub fn rectify_pair(
    reference: (&PinholeCamera, &SE3, &GrayImage),
    other: (&PinholeCamera, &SE3, &GrayImage),
    min_baseline: f64,
) -> Option<RectifiedPair> {
    let (cam_a, t_g_ca, img_a) = reference;
    let (cam_b, t_g_cb, img_b) = other;

    let offset = t_g_cb.translation - t_g_ca.translation;
    let baseline = offset.norm();
    if !(baseline >= min_baseline) || baseline == 0.0 {
        debug!("Skipping pair: baseline {:.4} m below {:.4} m", baseline, min_baseline);
        return None;
    }
    let e1 = offset / baseline;
    let optical_axis = t_g_ca.rotation_matrix().column(2).into_owned();
    let y = optical_axis.cross(&e1);
    if y.norm() < MIN_AXIS_BASELINE_SINE {
        debug!("Skipping pair: baseline parallel to the optical axis");
        return None;
    }
    let e2 = y.normalize();
    let e3 = e1.cross(&e2);
    let r_rect_world = Matrix3::from_rows(&[e1.transpose(), e2.transpose(), e3.transpose()]);

    let k_rect = cam_a.k();
    let k_rect_inv = k_rect.try_inverse()?;
    let width = cam_a.width as usize;
    let height = cam_a.height as usize;

    // Rectified pixel → source pixel: H = K_i * R_Ci_G * R_rect^T * K_rect^-1
    let homography = |cam: &PinholeCamera, t_g_c: &SE3| {
        cam.k() * t_g_c.rotation_matrix().transpose() * r_rect_world.transpose() * k_rect_inv
    };
    let left = warp(img_a, &homography(cam_a, t_g_ca), width, height);
    let right = warp(img_b, &homography(cam_b, t_g_cb), width, height);

    Some(RectifiedPair {
        left,
        right,
        fx: cam_a.fx,
        fy: cam_a.fy,
        cx: cam_a.cx,
        cy: cam_a.cy,
        baseline,
        r_rect_world,
        center: t_g_ca.translation,
    })
}

fn warp(source: &GrayImage, h: &Matrix3<f64>, width: usize, height: usize) -> RectifiedImage {
    let mut data = vec![0.0f32; width * height];
    let mut valid = vec![false; width * height];
    for v in 0..height {
        for u in 0..width {
            let p = h * Vector3::new(u as f64, v as f64, 1.0);
            if p.z <= 0.0 {
                continue;
            }
            if let Some(value) = bilinear(source, p.x / p.z, p.y / p.z) {
                data[v * width + u] = value;
                valid[v * width + u] = true;
            }
        }
    }
    RectifiedImage {
        width,
        height,
        data,
        valid,
    }
}

/// Coordinates within this distance of an integer sample that pixel exactly.
const SNAP_EPS: f64 = 1e-9;

fn snap(c: f64) -> f64 {
    let r = c.round();
    if (c - r).abs() < SNAP_EPS { r } else { c }
}

fn bilinear(image: &GrayImage, x: f64, y: f64) -> Option<f32> {
    let (x, y) = (snap(x), snap(y));
    let (w, h) = (image.width() as usize, image.height() as usize);
    if !(x >= 0.0 && y >= 0.0 && x <= (w - 1) as f64 && y <= (h - 1) as f64) {
        return None;
    }
    let (x0, y0) = (x.floor() as usize, y.floor() as usize);
    let (x1, y1) = ((x0 + 1).min(w - 1), (y0 + 1).min(h - 1));
    let (ax, ay) = ((x - x0 as f64) as f32, (y - y0 as f64) as f32);
    let px = |x: usize, y: usize| image.get_pixel(x as u32, y as u32)[0] as f32;
    let top = px(x0, y0) * (1.0 - ax) + px(x1, y0) * ax;
    let bottom = px(x0, y1) * (1.0 - ax) + px(x1, y1) * ax;
    Some(top * (1.0 - ay) + bottom * ay)
}

impl RectifiedPair {
    /// Depth of a disparity under this pair's geometry.
    pub fn depth(&self, disparity: f64) -> f64 {
        self.fx * self.baseline / disparity
    }

    /// World point seen at reference pixel `(u, v)` with disparity `d`.
    pub fn world_point(&self, u: f64, v: f64, disparity: f64) -> Vector3<f64> {
        let z = self.depth(disparity);
        let p_rect = Vector3::new((u - self.cx) * z / self.fx, (v - self.cy) * z / self.fy, z);
        self.center + self.r_rect_world.transpose() * p_rect
    }

    /// Turn a disparity map into world points tagged with `seq`.
    pub fn back_project(
        &self,
        disparity: &DisparityMap,
        gate: &BackProjection,
        seq: usize,
    ) -> PointCloud {
        let step = gate.pixel_step.max(1);
        let mut cloud = PointCloud::new();
        for v in (0..disparity.height()).step_by(step) {
            for u in (0..disparity.width()).step_by(step) {
                let Some(d) = disparity.get(u, v) else {
                    continue;
                };
                let d = d as f64;
                if d <= 0.0 {
                    continue;
                }
                let z = self.depth(d);
                if z < gate.min_depth || z > gate.max_depth {
                    continue;
                }
                cloud.push(WorldPoint::observed_by(
                    self.world_point(u as f64, v as f64, d),
                    seq,
                ));
            }
        }
        cloud
    }
}
