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

use thiserror::Error;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Error while reading configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("Error while handling run record: {0}")]
    Record(#[from] RecordError),

    #[error("Error while matching station: {0}")]
    Station(#[from] StationError),

    #[error("Error while creating ThreadPool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),

    #[error("Cannot prepare output directory: {0}")]
    Io(#[from] std::io::Error),

    #[error("Cannot set memory limit of {0} MB")]
    MemoryLimit(usize),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Cannot open config file: {0}")]
    CantOpenFile(#[from] std::io::Error),

    #[error("Cannot deserialize config file: {0}")]
    CantDeserialize(#[from] serde_yaml::Error),

    #[error("Configuration component is out of bounds: {0}")]
    OutOfBounds(&'static str),
}

#[derive(Error, Debug)]
pub enum RecordError {
    #[error("Run record not found at {0}, run the query stage first")]
    NotFound(String),

    #[error("Cannot access run record: {0}")]
    Io(#[from] std::io::Error),

    #[error("Cannot (de)serialize run record: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Incident query is invalid: {0}")]
    InvalidQuery(String),

    #[error("Cannot parse cycle stamp '{0}', expected YYYYMMDDHH")]
    InvalidStamp(String),
}

#[derive(Error, Debug)]
pub enum StationError {
    #[error("Station table not found at {0}")]
    NotFound(String),

    #[error("Station table has no '{0}' column")]
    MissingColumn(&'static str),

    #[error("Station table contains no usable stations")]
    EmptyTable,

    #[error("Unknown station table encoding '{0}'")]
    UnknownEncoding(String),

    #[error("Cannot read station table: {0}")]
    Io(#[from] std::io::Error),

    #[error("Cannot parse station table: {0}")]
    Csv(#[from] csv::Error),
}

/// Errors scoped to a single cycle file.
/// They are reported and the remaining cycles are still processed.
#[derive(Error, Debug)]
pub enum GridError {
    #[error("NetCDF error: {0}")]
    Netcdf(#[from] netcdf::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Missing variable: {0}")]
    MissingVariable(&'static str),

    #[error("Variable {0} has shape inconsistent with the coordinate axes")]
    ShapeMismatch(String),

    #[error("Malformed {0} axis: {1}")]
    MalformedAxis(&'static str, SearchError),

    #[error("Cropped window along {0} is empty, the target is outside the grid")]
    EmptyWindow(&'static str),

    #[error("Time value {0} cannot be represented as a datetime")]
    InvalidTime(f64),
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchError {
    #[error("axis is empty")]
    EmptyAxis,

    #[error("axis contains non-finite values")]
    NonFinite,

    #[error("axis is not monotonic")]
    NonMonotonic,
}
