//! OpenCV StereoBM / StereoSGBM backend for [`StereoMatcher`].

use anyhow::{Context, Result};
use opencv::calib3d::{self, StereoBM, StereoSGBM};
use opencv::core::{self, Mat, Scalar};
use opencv::prelude::*;

use super::{DisparityMap, MatcherKind, RectifiedImage, StereoMatcher};

/// OpenCV stores disparities as fixed point with four fractional bits.
const DISPARITY_SCALE: f32 = 16.0;

fn to_mat(image: &RectifiedImage) -> Result<Mat> {
    let mut mat = Mat::new_rows_cols_with_default(
        image.height as i32,
        image.width as i32,
        core::CV_8UC1,
        Scalar::all(0.0),
    )?;
    for y in 0..image.height {
        for x in 0..image.width {
            if let Some(v) = image.get(x, y) {
                *mat.at_2d_mut::<u8>(y as i32, x as i32)? = v.round().clamp(0.0, 255.0) as u8;
            }
        }
    }
    Ok(mat)
}

pub fn compute(matcher: &StereoMatcher, left: &RectifiedImage, right: &RectifiedImage) -> Result<DisparityMap> {
    let params = &matcher.params;
    let left_mat = to_mat(left)?;
    let right_mat = to_mat(right)?;
    // OpenCV requires the search range to be a multiple of 16.
    let num_disparities = (params.num_disparities as i32 + 15) / 16 * 16;
    let mut disparity = Mat::default();

    match matcher.kind {
        MatcherKind::BlockMatching => {
            let mut bm = StereoBM::create(num_disparities, params.block_size as i32)?;
            bm.set_min_disparity(params.min_disparity as i32)?;
            bm.set_uniqueness_ratio(params.uniqueness_ratio as i32)?;
            let area = (params.block_size * params.block_size) as f32;
            bm.set_texture_threshold((params.texture_threshold * area) as i32)?;
            bm.compute(&left_mat, &right_mat, &mut disparity)
                .context("StereoBM failed")?;
        }
        MatcherKind::SemiGlobal => {
            let (p1, p2) = params.penalties();
            let mut sgbm = StereoSGBM::create(
                params.min_disparity as i32,
                num_disparities,
                params.block_size as i32,
                p1 as i32,
                p2 as i32,
                1,
                63,
                params.uniqueness_ratio as i32,
                0,
                0,
                calib3d::StereoSGBM_MODE_SGBM,
            )?;
            sgbm.compute(&left_mat, &right_mat, &mut disparity)
                .context("StereoSGBM failed")?;
        }
    }

    let mut map = DisparityMap::new(left.width, left.height);
    for y in 0..left.height {
        for x in 0..left.width {
            let raw = *disparity.at_2d::<i16>(y as i32, x as i32)?;
            let d = raw as f32 / DISPARITY_SCALE;
            if d > 0.0 {
                map.set(x, y, Some(d));
            }
        }
    }
    Ok(map)
}
