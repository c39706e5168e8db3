//! Grid geometry and cell addressing.
//!
//! The origin is the south-west corner of the grid. Rows count from the
//! northern edge so a layer maps directly onto an image (row 0 on top).
//! The extent is half-open: `[origin, origin + extent)` along both axes.

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Grid placement as configured: a center, full extents and a resolution.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GridSettings {
    /// Center of the grid (easting) [m].
    pub center_easting: f64,
    /// Center of the grid (northing) [m].
    pub center_northing: f64,
    /// Full width of the grid along easting [m].
    pub delta_easting: f64,
    /// Full height of the grid along northing [m].
    pub delta_northing: f64,
    /// Cell size [m].
    pub resolution: f64,
}

impl Default for GridSettings {
    fn default() -> Self {
        Self {
            center_easting: 0.0,
            center_northing: 0.0,
            delta_easting: 100.0,
            delta_northing: 100.0,
            resolution: 1.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CellIndex {
    pub row: usize,
    pub col: usize,
}

impl CellIndex {
    pub fn new(row: usize, col: usize) -> Self {
        Self { row, col }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RasterGeometry {
    origin_easting: f64,
    origin_northing: f64,
    resolution: f64,
    cols: usize,
    rows: usize,
}

/// Upper bound on the number of cells a raster may hold.
pub const MAX_CELLS: usize = 1 << 28;

impl RasterGeometry {
    pub fn new(
        origin_easting: f64,
        origin_northing: f64,
        resolution: f64,
        cols: usize,
        rows: usize,
    ) -> Result<Self, ConfigError> {
        if !(resolution.is_finite() && resolution > 0.0) {
            return Err(ConfigError::invalid(
                "grid.resolution",
                format!("must be positive, got {}", resolution),
            ));
        }
        if !(origin_easting.is_finite() && origin_northing.is_finite()) {
            return Err(ConfigError::invalid("grid.center", "origin must be finite"));
        }
        if cols == 0 || rows == 0 {
            return Err(ConfigError::invalid(
                "grid.delta",
                format!("extent must cover at least one cell, got {}x{}", cols, rows),
            ));
        }
        match cols.checked_mul(rows) {
            Some(cells) if cells <= MAX_CELLS => {}
            _ => {
                return Err(ConfigError::invalid(
                    "grid.delta",
                    format!("{}x{} cells exceeds the limit of {} cells", cols, rows, MAX_CELLS),
                ));
            }
        }
        Ok(Self {
            origin_easting,
            origin_northing,
            resolution,
            cols,
            rows,
        })
    }

    pub fn from_settings(settings: &GridSettings) -> Result<Self, ConfigError> {
        let finite = settings.delta_easting.is_finite() && settings.delta_northing.is_finite();
        if !(finite && settings.delta_easting > 0.0 && settings.delta_northing > 0.0) {
            return Err(ConfigError::invalid(
                "grid.delta",
                format!(
                    "extents must be positive and finite, got {} x {}",
                    settings.delta_easting, settings.delta_northing
                ),
            ));
        }
        if !(settings.resolution.is_finite() && settings.resolution > 0.0) {
            return Err(ConfigError::invalid(
                "grid.resolution",
                format!("must be positive, got {}", settings.resolution),
            ));
        }
        let cols = (settings.delta_easting / settings.resolution).round() as usize;
        let rows = (settings.delta_northing / settings.resolution).round() as usize;
        let origin_easting = settings.center_easting - 0.5 * cols as f64 * settings.resolution;
        let origin_northing = settings.center_northing - 0.5 * rows as f64 * settings.resolution;
        Self::new(origin_easting, origin_northing, settings.resolution, cols, rows)
    }

    pub fn origin(&self) -> (f64, f64) {
        (self.origin_easting, self.origin_northing)
    }

    pub fn resolution(&self) -> f64 {
        self.resolution
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cell_count(&self) -> usize {
        self.cols * self.rows
    }

    /// Cell containing the world coordinate, `None` outside the extent.
    pub fn cell_at(&self, easting: f64, northing: f64) -> Option<CellIndex> {
        if !(easting.is_finite() && northing.is_finite()) {
            return None;
        }
        let fx = (easting - self.origin_easting) / self.resolution;
        let fy = (northing - self.origin_northing) / self.resolution;
        if fx < 0.0 || fy < 0.0 {
            return None;
        }
        let col = fx.floor() as usize;
        let from_south = fy.floor() as usize;
        if col >= self.cols || from_south >= self.rows {
            return None;
        }
        Some(CellIndex::new(self.rows - 1 - from_south, col))
    }

    /// World (easting, northing) of the cell center.
    pub fn cell_center(&self, cell: CellIndex) -> (f64, f64) {
        let easting = self.origin_easting + (cell.col as f64 + 0.5) * self.resolution;
        let northing =
            self.origin_northing + ((self.rows - cell.row) as f64 - 0.5) * self.resolution;
        (easting, northing)
    }

    /// Row-major storage index, `None` for cells outside the grid.
    pub fn linear_index(&self, cell: CellIndex) -> Option<usize> {
        if cell.row < self.rows && cell.col < self.cols {
            Some(cell.row * self.cols + cell.col)
        } else {
            None
        }
    }

    pub fn cell_from_index(&self, index: usize) -> CellIndex {
        CellIndex::new(index / self.cols, index % self.cols)
    }
}
