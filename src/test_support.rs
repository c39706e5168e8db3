//! Synthetic nadir scenes shared by the unit tests.
//!
//! One 100×100 camera with f = 100 px looks straight down from 5 m, so a
//! pixel covers 5 cm of ground, exactly one texture cell. Cameras placed a
//! whole number of texture cells apart see exactly shifted images.

use std::sync::OnceLock;

use image::{GrayImage, Luma, Rgb, RgbImage};
use nalgebra::{Matrix3, Vector3};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::frame::{Frame, FrameImage};
use crate::geometry::{CameraRig, PinholeCamera, SE3};

pub const IMAGE_SIZE: u32 = 100;
pub const FOCAL: f64 = 100.0;
pub const ALTITUDE: f64 = 5.0;
/// Ground texture cell size [m].
pub const TEXTURE_PITCH: f64 = 0.05;
/// Texture covers [-HALF_CELLS, HALF_CELLS) cells around the origin.
const HALF_CELLS: i64 = 300;

pub fn nadir_rotation() -> Matrix3<f64> {
    Matrix3::new(1.0, 0.0, 0.0, 0.0, -1.0, 0.0, 0.0, 0.0, -1.0)
}

/// Body pose of a downward looking camera at `(easting, northing, altitude)`.
pub fn nadir_pose(easting: f64, northing: f64, altitude: f64) -> SE3 {
    SE3::from_rt(nadir_rotation(), Vector3::new(easting, northing, altitude))
}

pub fn nadir_camera() -> PinholeCamera {
    let c = IMAGE_SIZE as f64 / 2.0;
    PinholeCamera::new("cam0", IMAGE_SIZE, IMAGE_SIZE, FOCAL, FOCAL, c, c)
}

pub fn nadir_rig() -> CameraRig {
    CameraRig::new(vec![nadir_camera()])
}

fn texture() -> &'static Vec<u8> {
    static TEXTURE: OnceLock<Vec<u8>> = OnceLock::new();
    TEXTURE.get_or_init(|| {
        let side = (2 * HALF_CELLS) as usize;
        let mut rng = StdRng::seed_from_u64(42);
        (0..side * side).map(|_| rng.gen_range(0..=255u8)).collect()
    })
}

/// Ground intensity at a world position on the z = 0 plane.
pub fn ground_intensity(easting: f64, northing: f64) -> u8 {
    let side = 2 * HALF_CELLS;
    let i = ((easting / TEXTURE_PITCH).round() as i64 + HALF_CELLS).clamp(0, side - 1);
    let j = ((northing / TEXTURE_PITCH).round() as i64 + HALF_CELLS).clamp(0, side - 1);
    texture()[(j * side + i) as usize]
}

/// Ground point seen by pixel `(u, v)` of a nadir camera at `(e, n)`.
fn ground_under_pixel(easting: f64, northing: f64, u: u32, v: u32) -> (f64, f64) {
    let c = IMAGE_SIZE as f64 / 2.0;
    let scale = ALTITUDE / FOCAL;
    (
        easting + (u as f64 - c) * scale,
        northing - (v as f64 - c) * scale,
    )
}

/// Gray frame of the textured ground plane.
pub fn textured_frame(seq: usize, easting: f64, northing: f64) -> Frame {
    let image = GrayImage::from_fn(IMAGE_SIZE, IMAGE_SIZE, |u, v| {
        let (e, n) = ground_under_pixel(easting, northing, u, v);
        Luma([ground_intensity(e, n)])
    });
    Frame::new(seq, nadir_pose(easting, northing, ALTITUDE), FrameImage::Gray(image))
}

/// Uniform gray frame.
pub fn flat_frame(seq: usize, easting: f64, northing: f64, value: u8) -> Frame {
    let image = GrayImage::from_pixel(IMAGE_SIZE, IMAGE_SIZE, Luma([value]));
    Frame::new(seq, nadir_pose(easting, northing, ALTITUDE), FrameImage::Gray(image))
}

/// Uniform color frame.
pub fn rgb_frame(seq: usize, easting: f64, northing: f64, color: [u8; 3]) -> Frame {
    let image = RgbImage::from_pixel(IMAGE_SIZE, IMAGE_SIZE, Rgb(color));
    Frame::new(seq, nadir_pose(easting, northing, ALTITUDE), FrameImage::Rgb(image))
}
