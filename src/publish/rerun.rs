//! Rerun transport for the map.
//!
//! Entity hierarchy:
//!     map/
//!         orthomosaic      - Color layer as an image (invalid cells black)
//!         elevation        - Elevation layer scaled to gray
//!     world/
//!         dsm              - Valid elevation cells as 3D points, ortho colored
//!
//! Every publication advances the `pass` timeline.

use std::path::PathBuf;

use anyhow::{Context, Result};
use image::DynamicImage;
use rerun::RecordingStream;
use serde::{Deserialize, Serialize};

use super::Publisher;
use crate::raster::GeoRaster;
use crate::raster::export::{elevation_image, orthomosaic_image};

/// Where the recording goes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RerunSink {
    /// Spawn a viewer process.
    Spawn,
    /// Write an `.rrd` file.
    File(PathBuf),
}

pub struct RerunPublisher {
    rec: RecordingStream,
    passes: i64,
}

impl RerunPublisher {
    pub fn new(app_name: &str, sink: &RerunSink) -> Result<Self> {
        let builder = rerun::RecordingStreamBuilder::new(app_name);
        let rec = match sink {
            RerunSink::Spawn => builder.spawn().context("Failed to spawn rerun viewer")?,
            RerunSink::File(path) => builder
                .save(path)
                .with_context(|| format!("Failed to create {}", path.display()))?,
        };
        Ok(Self::from_stream(rec))
    }

    pub fn from_stream(rec: RecordingStream) -> Self {
        // Easting, northing, up.
        rec.log_static("world", &rerun::ViewCoordinates::RFU()).ok();
        Self { rec, passes: 0 }
    }

    pub fn passes(&self) -> i64 {
        self.passes
    }

    fn log_orthomosaic(&self, raster: &GeoRaster) -> Result<()> {
        let image = match orthomosaic_image(raster) {
            DynamicImage::ImageRgb8(img) => {
                let (w, h) = img.dimensions();
                rerun::Image::from_rgb24(img.into_raw(), [w, h])
            }
            other => {
                let img = other.to_luma8();
                let (w, h) = img.dimensions();
                rerun::Image::from_l8(img.into_raw(), [w, h])
            }
        };
        self.rec
            .log("map/orthomosaic", &image)
            .context("Failed to log orthomosaic")
    }

    fn log_elevation(&self, raster: &GeoRaster) -> Result<()> {
        let img = elevation_image(raster);
        let (w, h) = img.dimensions();
        self.rec
            .log("map/elevation", &rerun::Image::from_l8(img.into_raw(), [w, h]))
            .context("Failed to log elevation")
    }

    fn log_surface(&self, raster: &GeoRaster) -> Result<()> {
        let geometry = raster.geometry();
        let mut positions: Vec<[f32; 3]> = Vec::new();
        let mut colors: Vec<[u8; 3]> = Vec::new();
        for index in 0..geometry.cell_count() {
            let Some(h) = raster.elevation().scalar_at(index) else {
                continue;
            };
            let (e, n) = geometry.cell_center(geometry.cell_from_index(index));
            positions.push([e as f32, n as f32, h as f32]);
            let color = raster
                .ortho()
                .color_at(index)
                .map(|c| c.rgb())
                .unwrap_or([128, 128, 128]);
            colors.push(color);
        }
        if positions.is_empty() {
            return Ok(());
        }
        let radius = (geometry.resolution() * 0.5) as f32;
        self.rec
            .log(
                "world/dsm",
                &rerun::Points3D::new(positions)
                    .with_colors(colors)
                    .with_radii([radius]),
            )
            .context("Failed to log surface points")
    }
}

impl Publisher for RerunPublisher {
    fn publish(&mut self, raster: &GeoRaster) -> Result<()> {
        self.passes += 1;
        self.rec.set_time_sequence("pass", self.passes);
        self.log_orthomosaic(raster)?;
        self.log_elevation(raster)?;
        self.log_surface(raster)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::raster::{ColorMode, GridSettings, RasterGeometry};

    #[test]
    fn test_publish_advances_pass_timeline() {
        let rec = rerun::RecordingStreamBuilder::new("aerial_mapper_test")
            .buffered()
            .unwrap();
        let mut publisher = RerunPublisher::from_stream(rec);
        let geometry = RasterGeometry::from_settings(&GridSettings {
            delta_easting: 4.0,
            delta_northing: 4.0,
            ..GridSettings::default()
        })
        .unwrap();
        let mut raster = GeoRaster::new(geometry, ColorMode::Rgb);
        raster.elevation_mut().set_scalar(3, 1.5);
        publisher.publish(&raster).unwrap();
        publisher.publish(&raster).unwrap();
        assert_eq!(publisher.passes(), 2);
    }
}
