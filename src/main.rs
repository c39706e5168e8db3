use std::io::BufRead;
use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, ValueEnum};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use aerial_mapper::config::MapperConfig;
use aerial_mapper::io::{Dataset, PoseFormat, write_point_cloud};
use aerial_mapper::ortho::ElevationMode;
use aerial_mapper::pipeline::{MappingPipeline, ProcessingMode};
use aerial_mapper::publish::{
    LogPublisher, OrthomosaicWriter, Publisher, RerunPublisher, RerunSink, publish_until_stopped,
};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ModeArg {
    Batch,
    Incremental,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ElevationArg {
    Dsm,
    Flat,
}

/// Build a DSM and an orthomosaic from posed aerial images.
#[derive(Parser, Debug)]
#[command(name = "aerial-mapper")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// YAML configuration file; every key is optional
    config: Option<PathBuf>,

    /// Dataset directory (overrides data.directory)
    #[arg(short, long)]
    data: Option<PathBuf>,

    /// Pose file format: Standard, StandardNamed, COLMAP or PIX4D
    #[arg(long)]
    pose_format: Option<String>,

    #[arg(short, long, value_enum)]
    mode: Option<ModeArg>,

    /// Frames per window in incremental mode
    #[arg(short, long)]
    window_size: Option<usize>,

    /// Cell size in meters
    #[arg(short, long)]
    resolution: Option<f64>,

    /// Use every n-th image for dense stereo
    #[arg(long)]
    every_nth: Option<usize>,

    #[arg(long, value_enum)]
    elevation: Option<ElevationArg>,

    /// Precomputed point cloud, relative to the dataset directory (batch only)
    #[arg(long)]
    point_cloud: Option<PathBuf>,

    /// Write the orthomosaic here after every pass
    #[arg(short, long)]
    orthomosaic: Option<PathBuf>,

    /// Write the fused points here after the run
    #[arg(long)]
    points_out: Option<PathBuf>,

    /// Stream the map to a spawned rerun viewer
    #[arg(long)]
    rerun: bool,

    /// Record the map stream to an .rrd file
    #[arg(long, conflicts_with = "rerun")]
    rerun_file: Option<PathBuf>,

    /// Disable the rayon worker pool
    #[arg(long)]
    single_thread: bool,
}

impl Args {
    fn apply(&self, config: &mut MapperConfig) -> Result<()> {
        if let Some(dir) = &self.data {
            config.data.directory = dir.clone();
        }
        if let Some(format) = &self.pose_format {
            config.data.pose_format = format.parse::<PoseFormat>()?;
        }
        if let Some(mode) = self.mode {
            config.pipeline.mode = match mode {
                ModeArg::Batch => ProcessingMode::Batch,
                ModeArg::Incremental => ProcessingMode::Incremental,
            };
        }
        if let Some(n) = self.window_size {
            config.pipeline.window_size = n;
        }
        if let Some(resolution) = self.resolution {
            config.grid.resolution = resolution;
        }
        if let Some(n) = self.every_nth {
            config.dense.use_every_nth_image = n;
        }
        if let Some(elevation) = self.elevation {
            config.ortho.elevation_mode = match elevation {
                ElevationArg::Dsm => ElevationMode::Dsm,
                ElevationArg::Flat => ElevationMode::Flat,
            };
        }
        if let Some(path) = &self.point_cloud {
            config.data.point_cloud_file = Some(path.clone());
        }
        if let Some(path) = &self.orthomosaic {
            config.output.orthomosaic_file = Some(path.clone());
        }
        if let Some(path) = &self.points_out {
            config.output.point_cloud_file = Some(path.clone());
        }
        if self.rerun {
            config.output.rerun = Some(RerunSink::Spawn);
        }
        if let Some(path) = &self.rerun_file {
            config.output.rerun = Some(RerunSink::File(path.clone()));
        }
        if self.single_thread {
            config.dense.use_multi_threads = false;
            config.ortho.use_multi_threads = false;
        }
        Ok(())
    }
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .init();

    let args = Args::parse();
    if let Err(e) = run(&args) {
        eprintln!("Error: {}", e);
        for cause in e.chain().skip(1) {
            eprintln!("  caused by: {}", cause);
        }
        std::process::exit(1);
    }
}

fn run(args: &Args) -> Result<()> {
    let mut config = match &args.config {
        Some(path) => MapperConfig::from_yaml_file(path)?,
        None => MapperConfig::default(),
    };
    args.apply(&mut config)?;
    config.validate()?;

    let dataset = Dataset::load(&config.data)?;

    let mut publishers: Vec<Box<dyn Publisher>> = vec![Box::new(LogPublisher::default())];
    if let Some(sink) = &config.output.rerun {
        publishers.push(Box::new(RerunPublisher::new("aerial-mapper", sink)?));
    }
    if let Some(path) = &config.output.orthomosaic_file {
        publishers.push(Box::new(OrthomosaicWriter::new(path)));
    }

    let mut pipeline =
        MappingPipeline::from_config(&config, dataset.rig, dataset.point_cloud, Box::new(publishers))?;
    if config.output.point_cloud_file.is_some() {
        pipeline = pipeline.with_retained_points();
    }

    let summary = pipeline.run(dataset.frames)?;
    info!("{:?}", summary);
    if summary.windows_failed > 0 {
        warn!("{} of {} windows failed", summary.windows_failed, summary.windows_drained);
    }

    let (raster, mut publisher, fused_points) = pipeline.into_parts();
    if let (Some(path), Some(points)) = (&config.output.point_cloud_file, &fused_points) {
        write_point_cloud(path, points)?;
    }

    if config.output.publish_until_stopped {
        let (stop_tx, stop_rx) = crossbeam_channel::bounded(1);
        std::thread::spawn(move || {
            info!("Republishing the map; press Enter to stop");
            let mut line = String::new();
            let _ = std::io::stdin().lock().read_line(&mut line);
            let _ = stop_tx.send(());
        });
        let count = publish_until_stopped(
            publisher.as_mut(),
            &raster,
            &stop_rx,
            config.output.republish_interval(),
        )?;
        info!("Republished the final map {} times", count);
    }
    Ok(())
}
