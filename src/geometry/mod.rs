//! Geometry utilities: SE3 transforms, pinhole cameras and the camera rig.

pub mod camera;
pub mod se3;

pub use camera::{CameraRig, PinholeCamera};
pub use se3::SE3;
