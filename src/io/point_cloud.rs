//! Point cloud text files: one `x y z` triple per line.

use std::path::Path;

use anyhow::{Context, Result};
use csv::WriterBuilder;
use nalgebra::Vector3;
use tracing::info;

use super::table::{parse_floats, read_rows};
use crate::point_cloud::PointCloud;

pub fn load_point_cloud(path: &Path) -> Result<PointCloud> {
    let rows = read_rows(path)?;
    let mut positions = Vec::with_capacity(rows.len());
    for (line, row) in rows.iter().enumerate() {
        let [x, y, z] = parse_floats::<3>(row, 0)
            .with_context(|| format!("{}: bad point on row {}", path.display(), line + 1))?;
        positions.push(Vector3::new(x, y, z));
    }
    info!("Loaded {} points from {}", positions.len(), path.display());
    Ok(PointCloud::from_positions(positions))
}

pub fn write_point_cloud(path: &Path, cloud: &PointCloud) -> Result<()> {
    let mut writer = WriterBuilder::new()
        .delimiter(b' ')
        .has_headers(false)
        .from_path(path)
        .with_context(|| format!("Failed to create {}", path.display()))?;
    for p in cloud.positions() {
        writer.write_record([p.x.to_string(), p.y.to_string(), p.z.to_string()])?;
    }
    writer.flush()?;
    info!("Wrote {} points to {}", cloud.len(), path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_tolerates_comments_and_extra_columns() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cloud.txt");
        std::fs::write(&path, "# x y z\n1.5 2 -3\n\n4\t5\t6 255 0 0\n").unwrap();
        let cloud = load_point_cloud(&path).unwrap();
        let positions: Vec<_> = cloud.positions().copied().collect();
        assert_eq!(positions, vec![Vector3::new(1.5, 2.0, -3.0), Vector3::new(4.0, 5.0, 6.0)]);
    }

    #[test]
    fn test_written_cloud_loads_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.txt");
        let cloud = PointCloud::from_positions([Vector3::new(0.1, -2.25, 1e-3)]);
        write_point_cloud(&path, &cloud).unwrap();
        assert_eq!(load_point_cloud(&path).unwrap(), cloud);
    }

    #[test]
    fn test_malformed_row_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.txt");
        std::fs::write(&path, "1 2\n").unwrap();
        assert!(load_point_cloud(&path).is_err());
    }
}
