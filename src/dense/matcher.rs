//! Disparity estimation on a rectified pair.
//!
//! Both matchers share one SAD cost volume built from per-disparity box sums
//! (integral images). Block matching takes the winner directly; semi-global
//! matching first aggregates the volume along eight scanline paths with the
//! P1/P2 smoothness penalties. Both then apply the same uniqueness, sub-pixel
//! and texture filters.
//!
//! A pixel is only matched when its block and the whole disparity range fit
//! inside the image, as with OpenCV's StereoBM.

use anyhow::{Result, bail};
use serde::{Deserialize, Serialize};

use super::RectifiedImage;
use crate::error::ConfigError;

/// Which matcher computes the disparity map.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatcherKind {
    /// Fixed-window SAD correlation.
    #[default]
    BlockMatching,
    /// Semi-global matching over eight paths.
    SemiGlobal,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BlockMatchingParameters {
    pub min_disparity: u32,
    /// Size of the disparity search range.
    pub num_disparities: u32,
    /// Odd window side length in pixels.
    pub block_size: u32,
    /// Margin in percent by which the best cost must beat any non-adjacent
    /// candidate.
    pub uniqueness_ratio: u32,
    /// Minimum mean absolute horizontal gradient inside the block.
    pub texture_threshold: f32,
    /// Parabola fit around the winning disparity.
    pub subpixel: bool,
    /// SGM penalty for disparity changes of one. Defaults to 8 * block².
    pub p1: Option<u32>,
    /// SGM penalty for larger disparity changes. Defaults to 32 * block².
    pub p2: Option<u32>,
}

impl Default for BlockMatchingParameters {
    fn default() -> Self {
        Self {
            min_disparity: 0,
            num_disparities: 64,
            block_size: 11,
            uniqueness_ratio: 10,
            texture_threshold: 2.0,
            subpixel: true,
            p1: None,
            p2: None,
        }
    }
}

impl BlockMatchingParameters {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.block_size == 0 || self.block_size % 2 == 0 {
            return Err(ConfigError::invalid(
                "dense.block_matching.block_size",
                format!("must be odd and positive, got {}", self.block_size),
            ));
        }
        if self.num_disparities == 0 {
            return Err(ConfigError::invalid(
                "dense.block_matching.num_disparities",
                "must be positive",
            ));
        }
        let (p1, p2) = self.penalties();
        if p2 < p1 {
            return Err(ConfigError::invalid(
                "dense.block_matching.p2",
                format!("must not be smaller than p1 ({} < {})", p2, p1),
            ));
        }
        Ok(())
    }

    pub fn penalties(&self) -> (f32, f32) {
        let area = self.block_size * self.block_size;
        let p1 = self.p1.unwrap_or(8 * area);
        let p2 = self.p2.unwrap_or(32 * area);
        (p1 as f32, p2 as f32)
    }

    fn max_disparity(&self) -> usize {
        (self.min_disparity + self.num_disparities - 1) as usize
    }
}

/// Per-pixel disparity of the reference image; `None` where no reliable
/// match exists.
#[derive(Debug, Clone, PartialEq)]
pub struct DisparityMap {
    width: usize,
    height: usize,
    values: Vec<Option<f32>>,
}

impl DisparityMap {
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            values: vec![None; width * height],
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn get(&self, x: usize, y: usize) -> Option<f32> {
        if x < self.width && y < self.height {
            self.values[y * self.width + x]
        } else {
            None
        }
    }

    pub fn set(&mut self, x: usize, y: usize, value: Option<f32>) {
        if x < self.width && y < self.height {
            self.values[y * self.width + x] = value;
        }
    }

    pub fn valid_count(&self) -> usize {
        self.values.iter().filter(|v| v.is_some()).count()
    }
}

/// Disparity matcher chosen once at configuration time.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StereoMatcher {
    pub kind: MatcherKind,
    pub params: BlockMatchingParameters,
}

impl StereoMatcher {
    pub fn new(kind: MatcherKind, params: BlockMatchingParameters) -> Self {
        Self { kind, params }
    }

    pub fn compute(&self, left: &RectifiedImage, right: &RectifiedImage) -> Result<DisparityMap> {
        if left.width != right.width || left.height != right.height {
            bail!(
                "Rectified images differ in size: {}x{} vs {}x{}",
                left.width,
                left.height,
                right.width,
                right.height
            );
        }
        self.params.validate()?;

        let mut volume = CostVolume::build(left, right, &self.params);
        if self.kind == MatcherKind::SemiGlobal {
            let (p1, p2) = self.params.penalties();
            volume.saturate_invalid(
                (self.params.block_size * self.params.block_size) as f32 * 255.0,
            );
            volume.costs = aggregate_paths(&volume, p1, p2);
        }

        let textured = texture_mask(left, &self.params);
        let mut map = DisparityMap::new(left.width, left.height);
        for y in 0..left.height {
            for x in 0..left.width {
                let i = y * left.width + x;
                if !volume.evaluable[i] || !textured[i] {
                    continue;
                }
                map.values[i] = select_disparity(volume.pixel(i), &self.params);
            }
        }
        Ok(map)
    }
}

// ───────────────────────────────── Cost volume ─────────────────────────────────

struct Integral {
    stride: usize,
    data: Vec<f64>,
}

impl Integral {
    fn new(width: usize, height: usize, value: impl Fn(usize, usize) -> f64) -> Self {
        let stride = width + 1;
        let mut data = vec![0.0; stride * (height + 1)];
        for y in 0..height {
            let mut row = 0.0;
            for x in 0..width {
                row += value(x, y);
                data[(y + 1) * stride + x + 1] = data[y * stride + x + 1] + row;
            }
        }
        Self { stride, data }
    }

    /// Sum over the inclusive window [x0, x1] × [y0, y1].
    fn sum(&self, x0: usize, y0: usize, x1: usize, y1: usize) -> f64 {
        let s = self.stride;
        self.data[(y1 + 1) * s + x1 + 1] - self.data[y0 * s + x1 + 1] - self.data[(y1 + 1) * s + x0]
            + self.data[y0 * s + x0]
    }
}

struct CostVolume {
    width: usize,
    height: usize,
    num_disparities: usize,
    /// `(y * width + x) * num_disparities + d`; infinite where the block
    /// touches an invalid pixel.
    costs: Vec<f32>,
    evaluable: Vec<bool>,
}

impl CostVolume {
    fn build(left: &RectifiedImage, right: &RectifiedImage, params: &BlockMatchingParameters) -> Self {
        let (w, h) = (left.width, left.height);
        let nd = params.num_disparities as usize;
        let half = (params.block_size / 2) as usize;
        let d_max = params.max_disparity();
        let mut costs = vec![f32::INFINITY; w * h * nd];
        let mut evaluable = vec![false; w * h];

        let x_range = (half + d_max)..w.saturating_sub(half);
        let y_range = half..h.saturating_sub(half);
        if x_range.is_empty() || y_range.is_empty() {
            return Self {
                width: w,
                height: h,
                num_disparities: nd,
                costs,
                evaluable,
            };
        }
        for y in y_range.clone() {
            for x in x_range.clone() {
                evaluable[y * w + x] = true;
            }
        }

        for di in 0..nd {
            let d = params.min_disparity as usize + di;
            let matched = |x: usize, y: usize| {
                x >= d && left.valid[y * w + x] && right.valid[y * w + x - d]
            };
            let sad = Integral::new(w, h, |x, y| {
                if matched(x, y) {
                    (left.data[y * w + x] - right.data[y * w + x - d]).abs() as f64
                } else {
                    0.0
                }
            });
            let invalid = Integral::new(w, h, |x, y| if matched(x, y) { 0.0 } else { 1.0 });
            for y in y_range.clone() {
                for x in x_range.clone() {
                    let (x0, y0, x1, y1) = (x - half, y - half, x + half, y + half);
                    if invalid.sum(x0, y0, x1, y1) > 0.5 {
                        continue;
                    }
                    costs[(y * w + x) * nd + di] = sad.sum(x0, y0, x1, y1).max(0.0) as f32;
                }
            }
        }

        Self {
            width: w,
            height: h,
            num_disparities: nd,
            costs,
            evaluable,
        }
    }

    fn pixel(&self, index: usize) -> &[f32] {
        let nd = self.num_disparities;
        &self.costs[index * nd..(index + 1) * nd]
    }

    fn saturate_invalid(&mut self, max_cost: f32) {
        for c in self.costs.iter_mut().filter(|c| !c.is_finite()) {
            *c = max_cost;
        }
    }
}

// ───────────────────────────────── Semi-global aggregation ─────────────────────────────────

const PATHS: [(isize, isize); 8] = [
    (1, 0),
    (-1, 0),
    (0, 1),
    (0, -1),
    (1, 1),
    (-1, 1),
    (1, -1),
    (-1, -1),
];

/// Sum of the path costs L_r over all eight directions.
fn aggregate_paths(volume: &CostVolume, p1: f32, p2: f32) -> Vec<f32> {
    let mut total = vec![0.0f32; volume.costs.len()];
    for &(dx, dy) in PATHS.iter() {
        aggregate_path(volume, dx, dy, p1, p2, &mut total);
    }
    total
}

fn aggregate_path(volume: &CostVolume, dx: isize, dy: isize, p1: f32, p2: f32, total: &mut [f32]) {
    let nd = volume.num_disparities;
    let (w, h) = (volume.width, volume.height);
    let mut prev_row = vec![0.0f32; w * nd];
    let mut cur_row = vec![0.0f32; w * nd];
    let mut predecessor = vec![0.0f32; nd];

    let rows: Vec<usize> = if dy >= 0 { (0..h).collect() } else { (0..h).rev().collect() };
    let cols: Vec<usize> = if dx >= 0 { (0..w).collect() } else { (0..w).rev().collect() };

    for (step, &y) in rows.iter().enumerate() {
        for &x in cols.iter() {
            let cost = volume.pixel(y * w + x);
            let px = x as isize - dx;
            let has_pred = px >= 0 && (px as usize) < w && (dy == 0 || step > 0);
            let out = x * nd;
            if !has_pred {
                cur_row[out..out + nd].copy_from_slice(cost);
                continue;
            }
            let src = px as usize * nd;
            if dy == 0 {
                predecessor.copy_from_slice(&cur_row[src..src + nd]);
            } else {
                predecessor.copy_from_slice(&prev_row[src..src + nd]);
            }
            let min_prev = predecessor.iter().copied().fold(f32::INFINITY, f32::min);
            for d in 0..nd {
                let mut best = predecessor[d];
                if d > 0 {
                    best = best.min(predecessor[d - 1] + p1);
                }
                if d + 1 < nd {
                    best = best.min(predecessor[d + 1] + p1);
                }
                best = best.min(min_prev + p2);
                cur_row[out + d] = cost[d] + best - min_prev;
            }
        }
        let base = y * w * nd;
        for (t, l) in total[base..base + w * nd].iter_mut().zip(cur_row.iter()) {
            *t += *l;
        }
        std::mem::swap(&mut prev_row, &mut cur_row);
    }
}

// ───────────────────────────────── Filters ─────────────────────────────────

/// True where the mean absolute horizontal gradient inside the block reaches
/// the texture threshold.
fn texture_mask(left: &RectifiedImage, params: &BlockMatchingParameters) -> Vec<bool> {
    let (w, h) = (left.width, left.height);
    if params.texture_threshold <= 0.0 {
        return vec![true; w * h];
    }
    let half = (params.block_size / 2) as usize;
    let area = (params.block_size * params.block_size) as f64;
    let gradient = Integral::new(w, h, |x, y| match (left.get(x, y), left.get(x + 1, y)) {
        (Some(a), Some(b)) => (b - a).abs() as f64,
        _ => 0.0,
    });
    let mut mask = vec![false; w * h];
    for y in half..h.saturating_sub(half) {
        for x in half..w.saturating_sub(half) {
            let mean = gradient.sum(x - half, y - half, x + half, y + half) / area;
            mask[y * w + x] = mean >= params.texture_threshold as f64;
        }
    }
    mask
}

/// Winner-takes-all with uniqueness check and parabola refinement.
fn select_disparity(costs: &[f32], params: &BlockMatchingParameters) -> Option<f32> {
    let (best_index, best) = costs
        .iter()
        .copied()
        .enumerate()
        .filter(|(_, c)| c.is_finite())
        .fold(None, |acc: Option<(usize, f32)>, (i, c)| match acc {
            Some((_, b)) if b <= c => acc,
            _ => Some((i, c)),
        })?;

    let margin = best * (1.0 + params.uniqueness_ratio as f32 / 100.0);
    let ambiguous = costs
        .iter()
        .enumerate()
        .any(|(i, &c)| i.abs_diff(best_index) > 1 && c.is_finite() && c <= margin);
    if ambiguous {
        return None;
    }

    let mut disparity = (params.min_disparity as usize + best_index) as f32;
    if params.subpixel && best_index > 0 && best_index + 1 < costs.len() {
        let (before, after) = (costs[best_index - 1], costs[best_index + 1]);
        let curvature = before - 2.0 * best + after;
        if before.is_finite() && after.is_finite() && curvature > 0.0 {
            disparity += ((before - after) / (2.0 * curvature)).clamp(-0.5, 0.5);
        }
    }
    (disparity > 0.0).then_some(disparity)
}
