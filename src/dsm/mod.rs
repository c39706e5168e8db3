//! Surface fusion: folds world points into the elevation layer.
//!
//! The fused surface is a first-return DSM: every cell keeps the highest
//! point that ever landed in it. The rule is commutative and idempotent, so
//! points can arrive in any order and in any number of passes.

use tracing::debug;

use crate::point_cloud::PointCloud;
use crate::raster::GeoRaster;

/// Counters for one fusion pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FusionReport {
    pub num_points: usize,
    /// Cells whose elevation was set or raised.
    pub num_cells_raised: usize,
    pub num_outside_extent: usize,
    /// Points with a NaN or infinite coordinate.
    pub num_rejected: usize,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SurfaceFuser;

impl SurfaceFuser {
    pub fn new() -> Self {
        Self
    }

    /// Fuse `points` into the elevation layer of `raster` (max-height rule).
    pub fn fuse(&self, raster: &mut GeoRaster, points: &PointCloud) -> FusionReport {
        let mut report = FusionReport {
            num_points: points.len(),
            ..FusionReport::default()
        };
        let geometry = *raster.geometry();
        let layer = raster.elevation_mut();

        for point in points.iter() {
            let p = point.position;
            if !(p.x.is_finite() && p.y.is_finite() && p.z.is_finite()) {
                report.num_rejected += 1;
                continue;
            }
            let Some(index) = geometry
                .cell_at(p.x, p.y)
                .and_then(|cell| geometry.linear_index(cell))
            else {
                report.num_outside_extent += 1;
                continue;
            };
            let raise = match layer.scalar_at(index) {
                Some(current) => p.z > current,
                None => true,
            };
            if raise {
                layer.set_scalar(index, p.z);
                report.num_cells_raised += 1;
            }
        }

        debug!(
            "Fused {} points: {} cell updates, {} outside extent, {} rejected",
            report.num_points,
            report.num_cells_raised,
            report.num_outside_extent,
            report.num_rejected
        );
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::raster::{ColorMode, GridSettings, RasterGeometry};
    use nalgebra::Vector3;

    fn raster() -> GeoRaster {
        let geometry = RasterGeometry::from_settings(&GridSettings {
            delta_easting: 10.0,
            delta_northing: 10.0,
            resolution: 0.5,
            ..GridSettings::default()
        })
        .unwrap();
        GeoRaster::new(geometry, ColorMode::Grayscale)
    }

    fn cloud(points: &[[f64; 3]]) -> PointCloud {
        PointCloud::from_positions(points.iter().map(|p| Vector3::new(p[0], p[1], p[2])))
    }

    #[test]
    fn test_highest_point_wins_in_any_order() {
        let fuser = SurfaceFuser::new();
        let mut a = raster();
        fuser.fuse(&mut a, &cloud(&[[1.1, 1.1, 2.0], [1.2, 1.3, 5.0]]));
        let mut b = raster();
        fuser.fuse(&mut b, &cloud(&[[1.2, 1.3, 5.0]]));
        fuser.fuse(&mut b, &cloud(&[[1.1, 1.1, 2.0]]));
        assert_eq!(a.elevation_at(1.1, 1.1), Some(5.0));
        assert_eq!(a, b);
    }

    #[test]
    fn test_fusion_is_idempotent() {
        let fuser = SurfaceFuser::new();
        let points = cloud(&[[0.1, 0.1, 1.0], [-3.0, 2.0, -0.5], [4.9, -4.9, 7.0]]);
        let mut once = raster();
        fuser.fuse(&mut once, &points);
        let mut twice = once.clone();
        let report = fuser.fuse(&mut twice, &points);
        assert_eq!(once, twice);
        assert_eq!(report.num_cells_raised, 0);
    }

    #[test]
    fn test_outside_and_non_finite_points_are_dropped() {
        let fuser = SurfaceFuser::new();
        let mut r = raster();
        let report = fuser.fuse(
            &mut r,
            &cloud(&[
                [5.0, 0.0, 1.0],
                [0.0, -5.1, 1.0],
                [f64::NAN, 0.0, 1.0],
                [0.0, 0.0, f64::INFINITY],
                [0.0, 0.0, 1.0],
            ]),
        );
        assert_eq!(report.num_outside_extent, 2);
        assert_eq!(report.num_rejected, 2);
        assert_eq!(report.num_cells_raised, 1);
        assert_eq!(r.elevation().valid_count(), 1);
    }

    #[test]
    fn test_empty_cloud_leaves_raster_untouched() {
        let mut r = raster();
        let before = r.clone();
        SurfaceFuser::new().fuse(&mut r, &PointCloud::new());
        assert_eq!(r, before);
    }
}
