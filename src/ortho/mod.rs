//! Orthomosaic compositing by backward projection.
//!
//! Every cell center is lifted to 3D (fused elevation or a flat plane),
//! projected into each candidate frame, and colored from the frame whose
//! viewing ray is closest to vertical. Cells are independent, so the pass can
//! run on the rayon pool; values are written back in cell order.

use anyhow::{Result, bail};
use nalgebra::Vector3;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::frame::{Frame, PixelValue};
use crate::geometry::{CameraRig, PinholeCamera, SE3};
use crate::raster::{ColorMode, GeoRaster};

/// Which surface the cells are lifted onto before projection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ElevationMode {
    /// Fused elevation layer; cells without elevation use the flat plane.
    #[default]
    Dsm,
    /// Constant elevation plane.
    Flat,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrthoSettings {
    pub elevation_mode: ElevationMode,
    /// Color model of the orthomosaic layer.
    pub color_mode: ColorMode,
    /// Elevation of the flat plane [m].
    pub flat_elevation_m: f64,
    /// Composite cells on the rayon pool.
    pub use_multi_threads: bool,
}

impl Default for OrthoSettings {
    fn default() -> Self {
        Self {
            elevation_mode: ElevationMode::Dsm,
            color_mode: ColorMode::Grayscale,
            flat_elevation_m: 0.0,
            use_multi_threads: true,
        }
    }
}

/// Outcome of one compositing pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompositeReport {
    /// Per-cell flag, row-major: true where a value was written.
    pub updated: Vec<bool>,
    pub num_updated: usize,
    pub num_without_source: usize,
    /// Cells lifted onto the flat plane because no elevation was fused yet.
    pub num_fallback_elevation: usize,
}

/// A frame prepared for projection.
struct View<'a> {
    frame: &'a Frame,
    camera: &'a PinholeCamera,
    /// World → camera.
    t_c_g: SE3,
    center: Vector3<f64>,
}

struct CellSample {
    value: Option<PixelValue>,
    fallback: bool,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct OrthoCompositor {
    settings: OrthoSettings,
}

impl OrthoCompositor {
    pub fn new(settings: OrthoSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &OrthoSettings {
        &self.settings
    }

    /// Color every cell of `raster` that some frame in `frames` observes.
    pub fn composite(
        &self,
        raster: &mut GeoRaster,
        rig: &CameraRig,
        frames: &[Frame],
    ) -> Result<CompositeReport> {
        let views = prepare_views(rig, frames)?;
        let cells = raster.geometry().cell_count();

        let samples: Vec<CellSample> = {
            let raster = &*raster;
            if self.settings.use_multi_threads {
                (0..cells)
                    .into_par_iter()
                    .map(|index| self.sample_cell(raster, &views, index))
                    .collect()
            } else {
                (0..cells)
                    .map(|index| self.sample_cell(raster, &views, index))
                    .collect()
            }
        };

        let mut report = CompositeReport {
            updated: vec![false; cells],
            ..CompositeReport::default()
        };
        let layer = raster.ortho_mut();
        for (index, sample) in samples.into_iter().enumerate() {
            if sample.fallback {
                report.num_fallback_elevation += 1;
            }
            match sample.value {
                Some(value) => {
                    layer.set_color(index, value);
                    report.updated[index] = true;
                    report.num_updated += 1;
                }
                None => report.num_without_source += 1,
            }
        }

        debug!(
            "Composited {} frames: {} cells updated, {} without source, {} on flat fallback",
            frames.len(),
            report.num_updated,
            report.num_without_source,
            report.num_fallback_elevation
        );
        Ok(report)
    }

    fn sample_cell(&self, raster: &GeoRaster, views: &[View], index: usize) -> CellSample {
        let geometry = raster.geometry();
        let (easting, northing) = geometry.cell_center(geometry.cell_from_index(index));
        let flat = self.settings.flat_elevation_m;
        let (elevation, fallback) = match self.settings.elevation_mode {
            ElevationMode::Flat => (flat, false),
            ElevationMode::Dsm => match raster.elevation().scalar_at(index) {
                Some(h) => (h, false),
                None => (flat, true),
            },
        };
        let point = Vector3::new(easting, northing, elevation);

        // (verticality, seq, value) of the current winner.
        let mut best: Option<(f64, usize, PixelValue)> = None;
        for view in views {
            let Some(uv) = view.camera.project(&view.t_c_g.transform_point(&point)) else {
                continue;
            };
            let Some((x, y)) = view.camera.nearest_pixel(&uv) else {
                continue;
            };
            let ray = view.center - point;
            let length = ray.norm();
            if length == 0.0 {
                continue;
            }
            let verticality = ray.z / length;
            let seq = view.frame.seq;
            let wins = match best {
                None => true,
                Some((v, s, _)) => verticality > v || (verticality == v && seq < s),
            };
            if wins {
                best = Some((verticality, seq, view.frame.image.pixel(x, y)));
            }
        }

        CellSample {
            value: best.map(|(_, _, value)| raster.color_mode().convert(value)),
            fallback,
        }
    }
}

fn prepare_views<'a>(rig: &'a CameraRig, frames: &'a [Frame]) -> Result<Vec<View<'a>>> {
    frames
        .iter()
        .map(|frame| {
            let camera = rig.camera(frame.camera_index)?;
            if frame.image.width() != camera.width || frame.image.height() != camera.height {
                bail!(
                    "Frame {} image is {}x{}, camera {} expects {}x{}",
                    frame.seq,
                    frame.image.width(),
                    frame.image.height(),
                    camera.label,
                    camera.width,
                    camera.height
                );
            }
            let t_g_c = camera.camera_pose(&frame.pose);
            Ok(View {
                frame,
                camera,
                t_c_g: t_g_c.inverse(),
                center: t_g_c.translation,
            })
        })
        .collect()
}
