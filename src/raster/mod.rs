//! Geo-referenced raster map: grid geometry, layers and export.

pub mod export;
mod geo_raster;
mod grid;
mod layer;

pub use geo_raster::{ELEVATION_LAYER, GeoRaster, ORTHO_LAYER};
pub use grid::{CellIndex, GridSettings, RasterGeometry};
pub use layer::{ColorMode, Layer, LayerData};
