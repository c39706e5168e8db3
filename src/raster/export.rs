//! Raster to image conversion and file export.

use std::path::Path;

use anyhow::{Context, Result};
use image::{DynamicImage, GrayImage, Luma, Rgb, RgbImage};

use super::{GeoRaster, LayerData};

/// The color layer as an image, row 0 on top, invalid cells black.
pub fn orthomosaic_image(raster: &GeoRaster) -> DynamicImage {
    let geometry = raster.geometry();
    let (cols, rows) = (geometry.cols() as u32, geometry.rows() as u32);
    let layer = raster.ortho();
    let index = |x: u32, y: u32| y as usize * cols as usize + x as usize;
    match layer.data() {
        LayerData::Rgb(values) => DynamicImage::ImageRgb8(RgbImage::from_fn(cols, rows, |x, y| {
            let i = index(x, y);
            if layer.is_valid(i) { Rgb(values[i]) } else { Rgb([0, 0, 0]) }
        })),
        LayerData::Gray(values) => DynamicImage::ImageLuma8(GrayImage::from_fn(cols, rows, |x, y| {
            let i = index(x, y);
            if layer.is_valid(i) { Luma([values[i]]) } else { Luma([0]) }
        })),
        LayerData::Scalar(_) => DynamicImage::ImageLuma8(GrayImage::new(cols, rows)),
    }
}

/// Elevation layer scaled to 1..=255 over its valid range; invalid cells 0.
pub fn elevation_image(raster: &GeoRaster) -> GrayImage {
    let geometry = raster.geometry();
    let (cols, rows) = (geometry.cols() as u32, geometry.rows() as u32);
    let layer = raster.elevation();
    let (lo, hi) = (0..layer.len())
        .filter_map(|i| layer.scalar_at(i))
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), h| {
            (lo.min(h), hi.max(h))
        });
    let span = (hi - lo).max(1e-9);
    GrayImage::from_fn(cols, rows, |x, y| {
        match layer.scalar_at(y as usize * cols as usize + x as usize) {
            Some(h) => Luma([1 + ((h - lo) / span * 254.0).round() as u8]),
            None => Luma([0]),
        }
    })
}

/// Write the orthomosaic; format follows the file extension (png, jpg).
pub fn export_orthomosaic(raster: &GeoRaster, path: &Path) -> Result<()> {
    orthomosaic_image(raster)
        .save(path)
        .with_context(|| format!("Failed to write orthomosaic to {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::PixelValue;
    use crate::raster::{ColorMode, GridSettings, RasterGeometry};

    fn raster(mode: ColorMode) -> GeoRaster {
        let geometry = RasterGeometry::from_settings(&GridSettings {
            delta_easting: 3.0,
            delta_northing: 2.0,
            resolution: 1.0,
            ..GridSettings::default()
        })
        .unwrap();
        GeoRaster::new(geometry, mode)
    }

    #[test]
    fn test_invalid_cells_export_black() {
        let mut r = raster(ColorMode::Rgb);
        r.ortho_mut().set_color(1, PixelValue::Rgb([10, 20, 30]));
        let img = orthomosaic_image(&r).to_rgb8();
        assert_eq!(img.dimensions(), (3, 2));
        assert_eq!(img.get_pixel(1, 0).0, [10, 20, 30]);
        assert_eq!(img.get_pixel(0, 0).0, [0, 0, 0]);
        assert_eq!(img.get_pixel(2, 1).0, [0, 0, 0]);
    }

    #[test]
    fn test_export_png_round_trip() {
        let mut r = raster(ColorMode::Grayscale);
        r.ortho_mut().set_color(5, PixelValue::Gray(200));
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ortho.png");
        export_orthomosaic(&r, &path).unwrap();
        let loaded = image::open(&path).unwrap().to_luma8();
        assert_eq!(loaded.get_pixel(2, 1)[0], 200);
        assert_eq!(loaded.get_pixel(0, 0)[0], 0);
    }

    #[test]
    fn test_elevation_image_scales_valid_range() {
        let mut r = raster(ColorMode::Grayscale);
        r.elevation_mut().set_scalar(0, 1.0);
        r.elevation_mut().set_scalar(1, 3.0);
        let img = elevation_image(&r);
        assert_eq!(img.get_pixel(0, 0)[0], 1);
        assert_eq!(img.get_pixel(1, 0)[0], 255);
        assert_eq!(img.get_pixel(2, 0)[0], 0);
    }
}
