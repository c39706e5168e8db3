//! World-frame point sets produced by dense stereo or loaded from file.

use nalgebra::Vector3;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WorldPoint {
    pub position: Vector3<f64>,
    /// Sequence number of the reference frame that observed the point.
    pub source: Option<usize>,
}

impl WorldPoint {
    pub fn new(position: Vector3<f64>) -> Self {
        Self {
            position,
            source: None,
        }
    }

    pub fn observed_by(position: Vector3<f64>, seq: usize) -> Self {
        Self {
            position,
            source: Some(seq),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PointCloud {
    points: Vec<WorldPoint>,
}

impl PointCloud {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_points(points: Vec<WorldPoint>) -> Self {
        Self { points }
    }

    pub fn from_positions<I>(positions: I) -> Self
    where
        I: IntoIterator<Item = Vector3<f64>>,
    {
        Self {
            points: positions.into_iter().map(WorldPoint::new).collect(),
        }
    }

    pub fn push(&mut self, point: WorldPoint) {
        self.points.push(point);
    }

    pub fn append(&mut self, other: PointCloud) {
        self.points.extend(other.points);
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, WorldPoint> {
        self.points.iter()
    }

    pub fn positions(&self) -> impl Iterator<Item = &Vector3<f64>> {
        self.points.iter().map(|p| &p.position)
    }
}

impl FromIterator<WorldPoint> for PointCloud {
    fn from_iter<T: IntoIterator<Item = WorldPoint>>(iter: T) -> Self {
        Self {
            points: iter.into_iter().collect(),
        }
    }
}
