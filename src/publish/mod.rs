//! Publishing the map after each pass.
//!
//! Publishers receive the raster through a shared borrow; anything that
//! needs to keep the map around stores a clone.

mod rerun;
mod writer;

pub use self::rerun::{RerunPublisher, RerunSink};
pub use writer::OrthomosaicWriter;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use crossbeam_channel::{Receiver, RecvTimeoutError};
use parking_lot::Mutex;
use tracing::info;

use crate::raster::{ELEVATION_LAYER, GeoRaster, ORTHO_LAYER};

pub trait Publisher {
    fn publish(&mut self, raster: &GeoRaster) -> Result<()>;
}

impl<P: Publisher + ?Sized> Publisher for Box<P> {
    fn publish(&mut self, raster: &GeoRaster) -> Result<()> {
        (**self).publish(raster)
    }
}

/// Fan-out: publish to every sink in order, stopping at the first error.
impl Publisher for Vec<Box<dyn Publisher>> {
    fn publish(&mut self, raster: &GeoRaster) -> Result<()> {
        for publisher in self.iter_mut() {
            publisher.publish(raster)?;
        }
        Ok(())
    }
}

/// Logs layer coverage; used when no other output is configured.
#[derive(Debug, Default)]
pub struct LogPublisher {
    passes: usize,
}

impl Publisher for LogPublisher {
    fn publish(&mut self, raster: &GeoRaster) -> Result<()> {
        self.passes += 1;
        let cells = raster.geometry().cell_count();
        let coverage: Vec<String> = [ELEVATION_LAYER, ORTHO_LAYER]
            .into_iter()
            .filter_map(|name| {
                raster
                    .layer(name)
                    .map(|layer| format!("{} {}/{} cells", name, layer.valid_count(), cells))
            })
            .collect();
        info!("Map pass {}: {}", self.passes, coverage.join(", "));
        Ok(())
    }
}

/// Keeps a copy of every published map. Clones share the same storage.
#[derive(Debug, Clone, Default)]
pub struct SnapshotPublisher {
    snapshots: Arc<Mutex<Vec<GeoRaster>>>,
}

impl SnapshotPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.snapshots.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshots.lock().is_empty()
    }

    pub fn latest(&self) -> Option<GeoRaster> {
        self.snapshots.lock().last().cloned()
    }

    pub fn snapshots(&self) -> Vec<GeoRaster> {
        self.snapshots.lock().clone()
    }
}

impl Publisher for SnapshotPublisher {
    fn publish(&mut self, raster: &GeoRaster) -> Result<()> {
        self.snapshots.lock().push(raster.clone());
        Ok(())
    }
}

/// Republish `raster` every `interval` until a stop message arrives or every
/// sender is dropped. Returns the number of publications.
pub fn publish_until_stopped(
    publisher: &mut dyn Publisher,
    raster: &GeoRaster,
    stop: &Receiver<()>,
    interval: Duration,
) -> Result<usize> {
    let mut count = 0;
    loop {
        publisher.publish(raster)?;
        count += 1;
        match stop.recv_timeout(interval) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
            Err(RecvTimeoutError::Timeout) => {}
        }
    }
    info!("Stopped republishing after {} publications", count);
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::raster::{ColorMode, GridSettings, RasterGeometry};
    use anyhow::bail;

    fn raster() -> GeoRaster {
        let geometry = RasterGeometry::from_settings(&GridSettings {
            delta_easting: 2.0,
            delta_northing: 2.0,
            ..GridSettings::default()
        })
        .unwrap();
        GeoRaster::new(geometry, ColorMode::Grayscale)
    }

    struct Failing;

    impl Publisher for Failing {
        fn publish(&mut self, _raster: &GeoRaster) -> Result<()> {
            bail!("sink unavailable")
        }
    }

    #[test]
    fn test_snapshot_clones_share_storage() {
        let handle = SnapshotPublisher::new();
        let mut publisher: Box<dyn Publisher> = Box::new(handle.clone());
        publisher.publish(&raster()).unwrap();
        publisher.publish(&raster()).unwrap();
        assert_eq!(handle.len(), 2);
        assert_eq!(handle.latest(), Some(raster()));
    }

    #[test]
    fn test_fan_out_stops_at_first_error() {
        let first = SnapshotPublisher::new();
        let last = SnapshotPublisher::new();
        let mut publishers: Vec<Box<dyn Publisher>> = vec![
            Box::new(first.clone()),
            Box::new(Failing),
            Box::new(last.clone()),
        ];
        assert!(publishers.publish(&raster()).is_err());
        assert_eq!(first.len(), 1);
        assert!(last.is_empty());
    }

    #[test]
    fn test_publish_until_stopped_returns_on_stop() {
        let (tx, rx) = crossbeam_channel::unbounded();
        tx.send(()).unwrap();
        let mut snapshots = SnapshotPublisher::new();
        let count =
            publish_until_stopped(&mut snapshots, &raster(), &rx, Duration::from_secs(5)).unwrap();
        assert_eq!(count, 1);
        assert_eq!(snapshots.len(), 1);
    }

    #[test]
    fn test_publish_until_stopped_repeats_until_sender_dropped() {
        let (tx, rx) = crossbeam_channel::bounded::<()>(1);
        let handle = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(60));
            drop(tx);
        });
        let mut snapshots = SnapshotPublisher::new();
        let count =
            publish_until_stopped(&mut snapshots, &raster(), &rx, Duration::from_millis(5)).unwrap();
        handle.join().unwrap();
        assert!(count >= 2, "published {} times", count);
    }

    #[test]
    fn test_publish_until_stopped_propagates_errors() {
        let (_tx, rx) = crossbeam_channel::unbounded();
        let mut failing = Failing;
        assert!(publish_until_stopped(&mut failing, &raster(), &rx, Duration::from_millis(1)).is_err());
    }

    #[test]
    fn test_log_publisher_counts_passes() {
        let mut log = LogPublisher::default();
        log.publish(&raster()).unwrap();
        log.publish(&raster()).unwrap();
        assert_eq!(log.passes, 2);
    }
}
