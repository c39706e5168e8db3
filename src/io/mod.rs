//! Input and output adapters: calibration, poses, images, point clouds.

pub mod calibration;
pub mod dataset;
pub mod images;
pub mod point_cloud;
pub mod poses;
mod table;

pub use calibration::load_camera_rig;
pub use dataset::Dataset;
pub use point_cloud::{load_point_cloud, write_point_cloud};
pub use poses::{PoseFormat, PoseRecord, load_poses};
