/*
Copyright 2025 Jakub Lewandowski

This file is part of Ensemble Point Extraction System (EPES).

Ensemble Point Extraction System (EPES) is a free software: you can redistribute it and/or modify
it under the terms of the GNU General Public License as published by
the Free Software Foundation; either version 3 of the License, or
(at your option) any later version.

Ensemble Point Extraction System (EPES) is distributed in the hope that it will be useful,
but WITHOUT ANY WARRANTY; without even the implied warranty of
MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
GNU General Public License for more details.

You should have received a copy of the GNU General Public License
along with Ensemble Point Extraction System (EPES). If not, see https://www.gnu.org/licenses/.
*/

//! Module containing the pipeline stages.
//!
//! The query stage stores the incident in the run record. The crop stage
//! reads that record, plans the cycle window and crops every archive file
//! found for the window. The extract stage matches the nearest station,
//! plans the same window and turns every cropped file into per-gridpoint
//! time series.
//!
//! Cycle files are independent of each other, so each one is a separate
//! job on the threadpool. Errors of a single file are reported and do
//! not stop the stage, while missing run record or station table do.

mod configuration;
mod cycles;
mod geo;
mod grid;
mod persist;
mod record;
mod series;
mod stations;

pub use configuration::Config;

use crate::{errors::GridError, errors::PipelineError, Cli, QueryArgs, Stage, ALLOCATOR};
use cycles::CycleWindow;
use geo::BoundingBox;
use grid::CycleGrid;
use indicatif::{ProgressBar, ProgressStyle};
use log::{debug, error, info, warn};
use rayon::{ThreadPool, ThreadPoolBuilder};
use record::{IncidentQuery, RunRecord};
use stations::{load_stations, nearest_station};
use std::{
    fs,
    path::PathBuf,
    sync::{mpsc, Arc},
};

/// Main pipeline function, running the stage requested
/// on the command line.
pub fn main(cli: &Cli) -> Result<(), PipelineError> {
    info!("Preparing the pipeline core");

    let core = Core::new(&cli.config)?;

    match &cli.stage {
        Stage::Query(args) => {
            store_query(&core.config, args)?;
        }
        Stage::Crop => {
            crop_stage(&core)?;
        }
        Stage::Extract => {
            extract_stage(&core)?;
        }
        Stage::Run(args) => {
            store_query(&core.config, args)?;
            crop_stage(&core)?;
            extract_stage(&core)?;
        }
    }

    Ok(())
}

/// Structure containing pipeline prerequisites.
#[derive(Debug)]
pub struct Core {
    pub config: Arc<Config>,
    pub threadpool: ThreadPool,
}

impl Core {
    /// Pipeline [`Core`] constructor.
    ///
    /// Configuration is loaded and checked before any stage runs.
    pub fn new(config_path: &std::path::Path) -> Result<Self, PipelineError> {
        debug!("Reading configuration from {}", config_path.display());
        let config = Config::new_from_file(config_path)?;

        Core::from_config(config)
    }

    pub fn from_config(config: Config) -> Result<Self, PipelineError> {
        debug!("Setting memory limit");
        ALLOCATOR
            .set_limit(config.resources.memory.saturating_mul(1024 * 1024))
            .map_err(|_| PipelineError::MemoryLimit(config.resources.memory))?;

        debug!("Setting up ThreadPool");
        let threadpool = ThreadPoolBuilder::new()
            .num_threads(config.resources.threads as usize)
            .stack_size(2 * 1024 * 1024)
            .build()?;

        Ok(Core {
            config: Arc::new(config),
            threadpool,
        })
    }
}

/// Outcome of processing one cycle.
#[derive(Clone, PartialEq, Eq, Debug)]
pub enum CycleStatus {
    /// File was processed, with the count of produced items.
    Processed(usize),

    /// Input file for the cycle does not exist.
    Missing(PathBuf),

    /// Crop box selects no gridpoints along the axis,
    /// the target lies off the grid.
    OutsideGrid(&'static str),
}

/// Counters of a finished stage.
#[derive(Copy, Clone, PartialEq, Eq, Debug, Default)]
pub struct StageSummary {
    pub processed: usize,
    pub missing: usize,
    pub skipped: usize,
    pub failed: usize,

    /// Items produced over all processed cycles.
    pub items: usize,
}

/// Validates the incident query and writes a fresh run record.
pub fn store_query(config: &Config, args: &QueryArgs) -> Result<IncidentQuery, PipelineError> {
    let query = IncidentQuery::new(args.lat, args.lon, &args.date)?;

    if let Some(parent) = config.paths.record.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }

    RunRecord::new(&query).save(&config.paths.record)?;

    info!(
        "Incident at lat {}, lon {} on {} stored in {}",
        args.lat,
        args.lon,
        args.date,
        config.paths.record.display()
    );

    Ok(query)
}

/// Crops every archive file of the cycle window around the target.
pub fn crop_stage(core: &Core) -> Result<StageSummary, PipelineError> {
    let config = Arc::clone(&core.config);

    let record = RunRecord::load(&config.paths.record)?;
    let query = record.query()?;

    fs::create_dir_all(&config.paths.crop_dir)?;

    let bbox = BoundingBox::around(&query.target, config.domain.crop_radius_km());
    info!(
        "Cropping to lat {:.2}..{:.2}, lon {:.2}..{:.2}",
        bbox.lat_min, bbox.lat_max, bbox.lon_min, bbox.lon_max
    );

    let cycles = CycleWindow::new(&config.window).plan_stamps(query.reference);
    info!("Cycles to crop: {:?}", cycles);

    let summary = run_on_pool(
        &core.threadpool,
        cycles,
        "Cropped cycles",
        "gridpoints kept",
        move |cycle| {
            let in_path = config.archive_path(cycle);

            if !in_path.is_file() {
                return Ok(CycleStatus::Missing(in_path));
            }

            info!("Loading {}", in_path.display());
            let cropped = match CycleGrid::read(&in_path)?.crop(&bbox) {
                Ok(cropped) => cropped,
                Err(GridError::EmptyWindow(axis)) => return Ok(CycleStatus::OutsideGrid(axis)),
                Err(err) => return Err(err),
            };

            let out_path = config.crop_path(cycle);
            cropped.write(&out_path)?;
            info!("Cropped data saved to {}", out_path.display());

            Ok(CycleStatus::Processed(cropped.lats.len() * cropped.lons.len()))
        },
    );

    info!(
        "Cropping finished: {} cycles cropped, {} missing, {} outside the grid, {} failed",
        summary.processed, summary.missing, summary.skipped, summary.failed
    );

    Ok(summary)
}

/// Matches the nearest station and converts every cropped
/// file of the cycle window into time series tables.
pub fn extract_stage(core: &Core) -> Result<StageSummary, PipelineError> {
    let config = Arc::clone(&core.config);

    let mut record = RunRecord::load(&config.paths.record)?;
    let query = record.query()?;

    let stations = load_stations(&config.paths.stations, &config.stations.encoding)?;
    let (station, distance) = nearest_station(&query.target, &stations)?;
    info!(
        "Nearest station: {} ({}), {:.1} km from the target",
        station.id, station.name, distance
    );

    record.attach_station(station);
    record.save(&config.paths.record)?;

    fs::create_dir_all(&config.paths.series_dir)?;

    let station = station.clone();
    let radius_km = config.domain.max_distance_km;
    let cycles = CycleWindow::new(&config.window).plan_stamps(query.reference);
    info!("Cycles to extract: {:?}", cycles);

    let summary = run_on_pool(
        &core.threadpool,
        cycles,
        "Extracted cycles",
        "qualifying points",
        move |cycle| {
            let in_path = config.crop_path(cycle);

            if !in_path.is_file() {
                return Ok(CycleStatus::Missing(in_path));
            }

            info!("Processing {}", in_path.display());
            let grid = CycleGrid::read(&in_path)?;

            let count = series::extract_cycle(
                &grid,
                &query.target,
                radius_km,
                &station,
                cycle,
                &config.paths.series_dir,
                config.output.bom,
            )?;

            Ok(CycleStatus::Processed(count))
        },
    );

    info!(
        "Extraction finished: {} cycles converted, {} missing, {} failed, {} points within {} km",
        summary.processed, summary.missing, summary.failed, summary.items, radius_km
    );

    Ok(summary)
}

/// Deploys one job per cycle onto the threadpool and collects
/// the outcomes, reporting each of them as it arrives.
fn run_on_pool<F>(
    threadpool: &ThreadPool,
    cycles: Vec<String>,
    prefix: &'static str,
    item_label: &'static str,
    job: F,
) -> StageSummary
where
    F: Fn(&str) -> Result<CycleStatus, GridError> + Send + Sync + 'static,
{
    let cycles_count = cycles.len();
    let job = Arc::new(job);

    // set progress bar for processed cycles
    let cycles_bar = ProgressBar::new(cycles_count as u64);
    cycles_bar.set_style(
        ProgressStyle::default_bar()
            .template("{prefix} [{elapsed_precise}] [{wide_bar:.cyan/blue}] {pos}/{len} {msg}")
            .progress_chars("#>-"),
    );
    cycles_bar.set_prefix(prefix);

    let (tx, rx) = mpsc::channel();

    for cycle in cycles {
        let tx = tx.clone();
        let job = Arc::clone(&job);

        threadpool.spawn(move || {
            let result = job(&cycle);
            // receiver outlives all jobs
            tx.send((cycle, result)).ok();
        });
    }

    drop(tx);

    let mut summary = StageSummary::default();

    for (cycle, result) in rx.iter().take(cycles_count) {
        match result {
            Ok(CycleStatus::Processed(count)) => {
                summary.processed += 1;
                summary.items += count;
                info!(
                    "Cycle {}: {} {} ({} in total so far)",
                    cycle, count, item_label, summary.items
                );
            }
            Ok(CycleStatus::Missing(path)) => {
                summary.missing += 1;
                warn!("Cycle {}: {} does not exist, skipping", cycle, path.display());
            }
            Ok(CycleStatus::OutsideGrid(axis)) => {
                summary.skipped += 1;
                warn!(
                    "Cycle {}: crop box selects no gridpoints along {}, skipping",
                    cycle, axis
                );
            }
            Err(err) => {
                summary.failed += 1;
                error!("Cycle {} failed and was skipped: {}", cycle, err);
            }
        }

        cycles_bar.inc(1);
    }

    cycles_bar.finish_with_message("done");

    summary
}
