use std::path::{Path, PathBuf};

use anyhow::Result;
use tracing::debug;

use super::Publisher;
use crate::raster::GeoRaster;
use crate::raster::export::export_orthomosaic;

/// Rewrites the orthomosaic image file on every publication.
#[derive(Debug, Clone)]
pub struct OrthomosaicWriter {
    path: PathBuf,
}

impl OrthomosaicWriter {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Publisher for OrthomosaicWriter {
    fn publish(&mut self, raster: &GeoRaster) -> Result<()> {
        export_orthomosaic(raster, &self.path)?;
        debug!("Wrote orthomosaic to {}", self.path.display());
        Ok(())
    }
}
