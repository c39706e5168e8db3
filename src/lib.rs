pub mod config;
pub mod dense;
pub mod dsm;
pub mod error;
pub mod frame;
pub mod geometry;
pub mod io;
pub mod ortho;
pub mod pipeline;
pub mod point_cloud;
pub mod publish;
pub mod raster;

#[cfg(test)]
mod test_support;
