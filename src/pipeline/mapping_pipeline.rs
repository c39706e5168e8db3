use std::time::Instant;

use anyhow::{Context, Result, bail};
use tracing::{debug, info, warn};

use super::report::{PipelineSummary, WindowReport};
use super::state::{PipelineSettings, PipelineState, ProcessingMode};
use super::window::ProcessingWindow;
use crate::config::MapperConfig;
use crate::dense::{DenseReconstructor, PointCloudProducer};
use crate::dsm::SurfaceFuser;
use crate::error::ConfigError;
use crate::frame::Frame;
use crate::geometry::CameraRig;
use crate::ortho::OrthoCompositor;
use crate::point_cloud::PointCloud;
use crate::publish::Publisher;
use crate::raster::{GeoRaster, RasterGeometry};

/// Drives reconstruct → fuse → composite → publish over a frame stream.
///
/// The pipeline owns the raster; stages borrow it mutably for the duration of
/// their step and the publisher borrows it immutably.
pub struct MappingPipeline {
    settings: PipelineSettings,
    rig: CameraRig,
    producer: PointCloudProducer,
    fuser: SurfaceFuser,
    compositor: OrthoCompositor,
    raster: GeoRaster,
    publisher: Box<dyn Publisher>,
    window: ProcessingWindow,
    state: PipelineState,
    summary: PipelineSummary,
    reports: Vec<WindowReport>,
    /// Frames of the priming window, composited with the next pass.
    carry_over: Vec<Frame>,
    /// Every point fused so far, when retention is enabled.
    fused_points: Option<PointCloud>,
}

impl MappingPipeline {
    pub fn new(
        settings: PipelineSettings,
        rig: CameraRig,
        producer: PointCloudProducer,
        compositor: OrthoCompositor,
        raster: GeoRaster,
        publisher: Box<dyn Publisher>,
    ) -> Result<Self> {
        settings.validate()?;
        if rig.is_empty() {
            return Err(ConfigError::invalid("rig", "camera rig has no cameras").into());
        }
        if settings.mode == ProcessingMode::Incremental && !producer.is_dense() {
            return Err(ConfigError::invalid(
                "data.point_cloud_file",
                "a precomputed point cloud is only supported in batch mode",
            )
            .into());
        }
        if let PointCloudProducer::Dense(reconstructor) = &producer {
            reconstructor.settings().validate()?;
        }
        let state = match settings.mode {
            ProcessingMode::Batch => PipelineState::Loading,
            ProcessingMode::Incremental => PipelineState::Accumulating,
        };
        Ok(Self {
            window: ProcessingWindow::new(settings.window_size.max(1)),
            settings,
            rig,
            producer,
            fuser: SurfaceFuser::new(),
            compositor,
            raster,
            publisher,
            state,
            summary: PipelineSummary::default(),
            reports: Vec::new(),
            carry_over: Vec::new(),
            fused_points: None,
        })
    }

    /// Build every stage from a validated configuration.
    pub fn from_config(
        config: &MapperConfig,
        rig: CameraRig,
        point_cloud: Option<PointCloud>,
        publisher: Box<dyn Publisher>,
    ) -> Result<Self> {
        config.validate()?;
        let producer = match point_cloud {
            Some(cloud) => PointCloudProducer::Precomputed(cloud),
            None => PointCloudProducer::Dense(DenseReconstructor::new(config.dense)),
        };
        let geometry = RasterGeometry::from_settings(&config.grid)?;
        info!(
            "Raster: {} x {} cells at {} m, origin {:?}",
            geometry.cols(),
            geometry.rows(),
            geometry.resolution(),
            geometry.origin()
        );
        let raster = GeoRaster::new(geometry, config.ortho.color_mode);
        Self::new(
            config.pipeline,
            rig,
            producer,
            OrthoCompositor::new(config.ortho),
            raster,
            publisher,
        )
    }

    /// Keep a copy of every fused point (for export after the run).
    pub fn with_retained_points(mut self) -> Self {
        self.fused_points = Some(PointCloud::new());
        self
    }

    // ───────────────────────────────────────────────────────────────────────
    // Accessors
    // ───────────────────────────────────────────────────────────────────────

    pub fn raster(&self) -> &GeoRaster {
        &self.raster
    }

    pub fn into_raster(self) -> GeoRaster {
        self.raster
    }

    /// Hand back the map and the publisher once the run is over.
    pub fn into_parts(self) -> (GeoRaster, Box<dyn Publisher>, Option<PointCloud>) {
        (self.raster, self.publisher, self.fused_points)
    }

    pub fn window(&self) -> &ProcessingWindow {
        &self.window
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    pub fn mode(&self) -> ProcessingMode {
        self.settings.mode
    }

    pub fn reports(&self) -> &[WindowReport] {
        &self.reports
    }

    pub fn summary(&self) -> PipelineSummary {
        self.summary
    }

    pub fn fused_points(&self) -> Option<&PointCloud> {
        self.fused_points.as_ref()
    }

    // ───────────────────────────────────────────────────────────────────────
    // Running
    // ───────────────────────────────────────────────────────────────────────

    /// Process a whole dataset in the configured mode.
    pub fn run(&mut self, frames: Vec<Frame>) -> Result<PipelineSummary> {
        match self.settings.mode {
            ProcessingMode::Batch => self.run_batch(&frames),
            ProcessingMode::Incremental => Ok(self.run_incremental(frames)),
        }
    }

    /// One pass over all frames. Any stage failure aborts the run.
    pub fn run_batch(&mut self, frames: &[Frame]) -> Result<PipelineSummary> {
        if self.settings.mode != ProcessingMode::Batch {
            bail!("run_batch() called on an incremental pipeline");
        }
        if self.state != PipelineState::Loading {
            bail!("batch pipeline already ran");
        }
        info!("Batch pass over {} frames", frames.len());
        let start = Instant::now();
        let mut report = Self::new_report(0, frames);
        self.summary.frames_consumed = frames.len();
        self.summary.windows_drained = 1;
        self.run_pass(frames, true, &mut report)?;
        report.elapsed_ms = start.elapsed().as_secs_f64() * 1000.0;
        self.reports.push(report);
        self.state = PipelineState::Finished;
        Ok(self.summary)
    }

    /// Feed a frame stream through `consume` and `finish`.
    pub fn run_incremental<I>(&mut self, frames: I) -> PipelineSummary
    where
        I: IntoIterator<Item = Frame>,
    {
        for frame in frames {
            self.consume(frame);
        }
        self.finish()
    }

    /// Append one frame to the window. When the window fills up it is
    /// drained and processed, and the report of that pass is returned.
    pub fn consume(&mut self, frame: Frame) -> Option<WindowReport> {
        if self.settings.mode != ProcessingMode::Incremental {
            warn!("consume() ignored: pipeline is in batch mode");
            return None;
        }
        if self.state == PipelineState::Finished {
            warn!("consume() ignored: pipeline already finished");
            return None;
        }
        self.summary.frames_consumed += 1;
        if !self.window.push(frame) {
            return None;
        }
        let frames = self.window.drain();
        let report = self.process_window(&frames);
        self.reports.push(report.clone());
        Some(report)
    }

    /// End of input. A partial window is discarded.
    pub fn finish(&mut self) -> PipelineSummary {
        if self.state != PipelineState::Finished {
            let dropped = self.window.clear();
            if dropped > 0 {
                info!("Dropping {} frames of an incomplete window", dropped);
            }
            self.summary.frames_dropped += dropped;
            self.carry_over.clear();
            self.state = PipelineState::Finished;
            info!(
                "Finished: {} frames, {} windows, {} published, {} failed",
                self.summary.frames_consumed,
                self.summary.windows_drained,
                self.summary.passes_published,
                self.summary.windows_failed
            );
        }
        self.summary
    }

    /// Run one incremental pass; failures are recorded, not propagated.
    fn process_window(&mut self, frames: &[Frame]) -> WindowReport {
        let window_index = self.summary.windows_drained;
        self.summary.windows_drained += 1;
        let start = Instant::now();
        let mut report = Self::new_report(window_index, frames);

        // The first window only primes the reconstructor; its frames are
        // composited with the next pass.
        let update_map = window_index > 0;
        match self.run_pass(frames, update_map, &mut report) {
            Ok(()) if !update_map => self.carry_over.extend_from_slice(frames),
            Ok(()) => {}
            Err(e) => {
                warn!("Window {} failed: {:#}", window_index, e);
                report.error = Some(format!("{:#}", e));
                self.summary.windows_failed += 1;
            }
        }
        report.elapsed_ms = start.elapsed().as_secs_f64() * 1000.0;
        self.state = PipelineState::Accumulating;
        report
    }

    fn run_pass(&mut self, frames: &[Frame], update_map: bool, report: &mut WindowReport) -> Result<()> {
        self.state = PipelineState::Reconstructing;
        let cloud = self
            .producer
            .produce(&self.rig, frames)
            .with_context(|| format!("Reconstruction of window {} failed", report.window_index))?;
        report.num_points = cloud.len();
        if !update_map {
            debug!(
                "Window {}: {} points reconstructed, map not updated",
                report.window_index,
                cloud.len()
            );
            return Ok(());
        }

        self.state = PipelineState::Fusing;
        let fusion = self.fuser.fuse(&mut self.raster, &cloud);
        report.fusion = Some(fusion);
        if let Some(retained) = self.fused_points.as_mut() {
            retained.append(cloud);
        }

        self.state = PipelineState::Compositing;
        let available: Vec<Frame> = self.carry_over.iter().chain(frames).cloned().collect();
        report.num_frames_composited = available.len();
        let composite = self
            .compositor
            .composite(&mut self.raster, &self.rig, &available)
            .with_context(|| format!("Compositing of window {} failed", report.window_index))?;
        report.composite = Some(composite);

        self.state = PipelineState::Publishing;
        self.publisher
            .publish(&self.raster)
            .with_context(|| format!("Publishing of window {} failed", report.window_index))?;
        report.published = true;
        self.summary.passes_published += 1;
        self.carry_over.clear();

        info!(
            "Window {} (frames {}..={}): {} points, {} cells raised, {} cells colored",
            report.window_index,
            report.first_seq,
            report.last_seq,
            report.num_points,
            fusion.num_cells_raised,
            report.composite.as_ref().map_or(0, |c| c.num_updated)
        );
        Ok(())
    }

    fn new_report(window_index: usize, frames: &[Frame]) -> WindowReport {
        WindowReport {
            window_index,
            first_seq: frames.first().map_or(0, |f| f.seq),
            last_seq: frames.last().map_or(0, |f| f.seq),
            ..WindowReport::default()
        }
    }
}
