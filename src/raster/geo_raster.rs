//! The persistent map shared by every stage.

use super::{CellIndex, ColorMode, Layer, RasterGeometry};

pub const ELEVATION_LAYER: &str = "elevation";
pub const ORTHO_LAYER: &str = "ortho";

/// Geo-referenced grid with an elevation layer (DSM) and a color layer
/// (orthomosaic). Geometry is fixed at construction.
#[derive(Debug, Clone, PartialEq)]
pub struct GeoRaster {
    geometry: RasterGeometry,
    color_mode: ColorMode,
    elevation: Layer,
    ortho: Layer,
}

impl GeoRaster {
    pub fn new(geometry: RasterGeometry, color_mode: ColorMode) -> Self {
        let cells = geometry.cell_count();
        Self {
            geometry,
            color_mode,
            elevation: Layer::scalar(cells),
            ortho: Layer::color(color_mode, cells),
        }
    }

    pub fn geometry(&self) -> &RasterGeometry {
        &self.geometry
    }

    pub fn color_mode(&self) -> ColorMode {
        self.color_mode
    }

    pub fn layer(&self, name: &str) -> Option<&Layer> {
        match name {
            ELEVATION_LAYER => Some(&self.elevation),
            ORTHO_LAYER => Some(&self.ortho),
            _ => None,
        }
    }

    pub fn elevation(&self) -> &Layer {
        &self.elevation
    }

    pub fn elevation_mut(&mut self) -> &mut Layer {
        &mut self.elevation
    }

    pub fn ortho(&self) -> &Layer {
        &self.ortho
    }

    pub fn ortho_mut(&mut self) -> &mut Layer {
        &mut self.ortho
    }

    /// Fused elevation at a world coordinate, `None` if outside or unset.
    pub fn elevation_at(&self, easting: f64, northing: f64) -> Option<f64> {
        let cell = self.geometry.cell_at(easting, northing)?;
        self.elevation_of(cell)
    }

    pub fn elevation_of(&self, cell: CellIndex) -> Option<f64> {
        let index = self.geometry.linear_index(cell)?;
        self.elevation.scalar_at(index)
    }
}
