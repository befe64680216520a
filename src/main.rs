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

//! Ensemble Point Extraction System (EPES) prepares a compact,
//! tabular view of ensemble forecast conditions around an incident.
//!
//! For a target point and incident time the archive of forecast cycles
//! is cropped to a small box around the point, and the cropped grids
//! are then converted into per-gridpoint time series tagged with the
//! nearest observation station.
//!
//! The work is split into independently invoked stages (`query`, `crop`
//! and `extract`) which share a small run record on disk.

mod constants;
mod errors;
mod pipeline;

#[cfg(test)]
mod super_tests;

use cap::Cap;
use clap::{Parser, Subcommand};
use env_logger::Env;
use log::{error, info};
use std::{alloc, path::PathBuf};

type Float = f64;

/// Global allocator used by the pipeline.
///
/// Capping the memory to the limit set in the configuration file
/// gives a meaningful error instead of the process being killed by the OS.
#[global_allocator]
static ALLOCATOR: Cap<alloc::System> = Cap::new(alloc::System, usize::MAX);

/// Command line interface of the pipeline.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to the configuration file.
    #[arg(short, long, default_value = "config.yaml")]
    pub config: PathBuf,

    #[command(subcommand)]
    pub stage: Stage,
}

/// Incident location and time as given by the user.
#[derive(clap::Args, Debug, Clone)]
pub struct QueryArgs {
    /// Target latitude in degrees (e.g. 35.52).
    #[arg(long, allow_hyphen_values = true)]
    pub lat: Float,

    /// Target longitude in degrees (e.g. 130.06).
    #[arg(long, allow_hyphen_values = true)]
    pub lon: Float,

    /// Incident date and hour as YYYYMMDDHH (e.g. 2025020300).
    #[arg(long)]
    pub date: String,
}

#[derive(Subcommand, Debug)]
pub enum Stage {
    /// Store the incident query in the run record.
    Query(QueryArgs),

    /// Crop archive cycles around the incident point.
    Crop,

    /// Match the nearest station and write per-point time series.
    Extract,

    /// Run query, crop and extract one after another.
    Run(QueryArgs),
}

/// The main program function.
/// Prepares the runtime environment and calls the [`pipeline::main`].
///
/// `env_logger` is initiated before anything else so that
/// errors raised while reading the configuration are visible.
fn main() {
    #[cfg(not(feature = "debug"))]
    let logger_env = Env::new().filter_or("EPES_LOG_LEVEL", "info");

    #[cfg(feature = "debug")]
    let logger_env = Env::new().filter_or("EPES_LOG_LEVEL", "debug");

    env_logger::Builder::from_env(logger_env)
        .format_timestamp_millis()
        .init();

    let cli = Cli::parse();

    match pipeline::main(&cli) {
        Ok(_) => info!("Pipeline execution finished. Check the output directories and log."),
        Err(err) => {
            error!("Pipeline execution failed with error: {}", err);
            std::process::exit(1);
        }
    }
}
