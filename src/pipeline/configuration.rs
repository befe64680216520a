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

//! Module responsible for parsing and checking the configuration file.
//!
//! The configuration file uses [YAML](https://en.wikipedia.org/wiki/YAML)
//! and `serde` to enforce strong typing and automatic type checking.
//!
//! The structures and their fields in this module directly correspond to
//! the fields inside `config.yaml`. All paths used by the stages are
//! named here explicitly, nothing is resolved against the working directory
//! implicitly apart from relative paths written in the file itself.

use crate::constants::CYCLE_PLACEHOLDER;
use crate::errors::ConfigError;
use crate::Float;
use serde::Deserialize;
use std::{
    fs,
    path::{Path, PathBuf},
};

/// Locations of inputs and outputs of both stages.
#[derive(Clone, PartialEq, Debug, Deserialize)]
pub struct Paths {
    /// Directory with the ensemble model archive (one file per cycle).
    pub archive_dir: PathBuf,

    /// Directory where cropped cycle files are written
    /// and read from by the extraction stage.
    pub crop_dir: PathBuf,

    /// Directory where per-point time series tables are written.
    pub series_dir: PathBuf,

    /// Run record shared by the stages.
    pub record: PathBuf,

    /// Station reference table (CSV).
    pub stations: PathBuf,
}

/// _(Optional)_ File naming of archive and cropped cycle files.
///
/// Both patterns must contain the `{cycle}` placeholder,
/// which is replaced with the cycle stamp (`YYYYMMDDHH`).
#[derive(Clone, PartialEq, Debug, Deserialize)]
pub struct Archive {
    #[serde(default = "Archive::default_file_pattern")]
    pub file_pattern: String,

    #[serde(default = "Archive::default_crop_pattern")]
    pub crop_pattern: String,
}

impl Archive {
    fn default_file_pattern() -> String {
        "ensemble.BMA_3d.{cycle}.wind.nc".to_string()
    }

    fn default_crop_pattern() -> String {
        "cropped_{cycle}.nc".to_string()
    }

    pub fn check_bounds(&self) -> Result<(), ConfigError> {
        if !self.file_pattern.contains(CYCLE_PLACEHOLDER)
            || !self.crop_pattern.contains(CYCLE_PLACEHOLDER)
        {
            return Err(ConfigError::OutOfBounds(
                "File patterns must contain the {cycle} placeholder",
            ));
        }

        Ok(())
    }

    /// Name of the archive file for given cycle.
    pub fn archive_file(&self, cycle: &str) -> String {
        self.file_pattern.replace(CYCLE_PLACEHOLDER, cycle)
    }

    /// Name of the cropped file for given cycle.
    pub fn crop_file(&self, cycle: &str) -> String {
        self.crop_pattern.replace(CYCLE_PLACEHOLDER, cycle)
    }
}

impl Default for Archive {
    fn default() -> Self {
        Archive {
            file_pattern: Archive::default_file_pattern(),
            crop_pattern: Archive::default_crop_pattern(),
        }
    }
}

/// _(Optional)_ Spatial extent of the analysis.
#[derive(Copy, Clone, PartialEq, PartialOrd, Debug, Deserialize)]
pub struct Domain {
    /// Maximum distance (km) from the target of the extracted gridpoints.
    ///
    /// Archive files are cropped to a box with half of this distance
    /// on each side of the target. Defaults to `300`.
    #[serde(default = "Domain::default_max_distance")]
    pub max_distance_km: Float,
}

impl Domain {
    fn default_max_distance() -> Float {
        300.0
    }

    /// Radius (km) used to size the crop box.
    pub fn crop_radius_km(&self) -> Float {
        self.max_distance_km / 2.0
    }

    pub fn check_bounds(&self) -> Result<(), ConfigError> {
        if !self.max_distance_km.is_finite() || self.max_distance_km <= 0.0 {
            return Err(ConfigError::OutOfBounds(
                "Maximum distance must be a positive number of kilometres",
            ));
        }

        Ok(())
    }
}

impl Default for Domain {
    fn default() -> Self {
        Domain {
            max_distance_km: Domain::default_max_distance(),
        }
    }
}

/// Rule of listing cycles preceding the incident.
#[derive(Copy, Clone, PartialEq, Eq, Debug, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WindowMode {
    /// From midnight of the day `lookback_days` before the incident
    /// up to and including the incident time.
    Anchored,

    /// Fixed number of steps counted backward from the incident time.
    Trailing,
}

/// _(Optional)_ Cycle window shared by the crop and extract stages.
#[derive(Copy, Clone, PartialEq, Debug, Deserialize)]
pub struct Window {
    /// Defaults to `10`.
    #[serde(default = "Window::default_lookback")]
    pub lookback_days: u32,

    /// Hours between consecutive cycles. Must divide 24.
    /// Defaults to `12`.
    #[serde(default = "Window::default_cadence")]
    pub cadence_hours: u32,

    /// Defaults to `anchored`.
    #[serde(default = "Window::default_mode")]
    pub mode: WindowMode,
}

impl Window {
    fn default_lookback() -> u32 {
        10
    }

    fn default_cadence() -> u32 {
        12
    }

    fn default_mode() -> WindowMode {
        WindowMode::Anchored
    }

    pub fn check_bounds(&self) -> Result<(), ConfigError> {
        if self.cadence_hours == 0 || 24 % self.cadence_hours != 0 {
            return Err(ConfigError::OutOfBounds(
                "Cycle cadence must be a divisor of 24 hours",
            ));
        }

        if self.lookback_days > 366 {
            return Err(ConfigError::OutOfBounds(
                "Lookback cannot be longer than one year",
            ));
        }

        Ok(())
    }
}

impl Default for Window {
    fn default() -> Self {
        Window {
            lookback_days: Window::default_lookback(),
            cadence_hours: Window::default_cadence(),
            mode: Window::default_mode(),
        }
    }
}

/// _(Optional)_ Reading of the station table.
#[derive(Clone, PartialEq, Debug, Deserialize)]
pub struct Stations {
    /// WHATWG label of the table encoding, eg. `utf-8` or `euc-kr`.
    /// Defaults to `utf-8`.
    #[serde(default = "Stations::default_encoding")]
    pub encoding: String,
}

impl Stations {
    fn default_encoding() -> String {
        "utf-8".to_string()
    }
}

impl Default for Stations {
    fn default() -> Self {
        Stations {
            encoding: Stations::default_encoding(),
        }
    }
}

/// _(Optional)_ Format of time series tables.
#[derive(Copy, Clone, PartialEq, Debug, Deserialize)]
pub struct Output {
    /// Start tables with UTF-8 byte-order mark, so that spreadsheet
    /// software detects the encoding. Defaults to `true`.
    #[serde(default = "Output::default_bom")]
    pub bom: bool,
}

impl Output {
    fn default_bom() -> bool {
        true
    }
}

impl Default for Output {
    fn default() -> Self {
        Output {
            bom: Output::default_bom(),
        }
    }
}

/// _(Optional)_ Fields with information about
/// resources available for the pipeline.
#[derive(Clone, PartialEq, PartialOrd, Debug, Deserialize)]
pub struct Resources {
    /// _(Optional)_ Thread count used to process cycle files.
    /// Each cycle file is processed by exactly one worker.
    ///
    /// Cannot be less than `1`. Defaults to `1`.
    #[serde(default = "Resources::default_threads")]
    pub threads: u16,

    /// _(Optional)_ Heap memory limit in MB.
    /// Useful for enabling meaningful Out-of-memory error messages
    /// when large archive files are read.
    ///
    /// Cannot be less than `128`. Defaults to whole addressable-space.
    #[serde(default = "Resources::default_memory")]
    pub memory: usize,
}

impl Resources {
    fn default_threads() -> u16 {
        1
    }

    fn default_memory() -> usize {
        usize::MAX / (1024 * 1024)
    }

    /// Checks if thread count and memory limit are
    /// above limits.
    pub fn check_bounds(&self) -> Result<(), ConfigError> {
        if self.threads < 1 {
            return Err(ConfigError::OutOfBounds(
                "Available threads cannot be less than 1",
            ));
        }

        if self.memory < 128 {
            return Err(ConfigError::OutOfBounds(
                "Available memory cannot be less than 128 MB",
            ));
        }

        Ok(())
    }
}

impl Default for Resources {
    fn default() -> Self {
        Resources {
            threads: Resources::default_threads(),
            memory: Resources::default_memory(),
        }
    }
}

/// Main config structure representing the fields in
/// configuration file.
#[derive(Clone, PartialEq, Debug, Deserialize)]
pub struct Config {
    pub paths: Paths,

    #[serde(default)]
    pub archive: Archive,

    #[serde(default)]
    pub domain: Domain,

    #[serde(default)]
    pub window: Window,

    #[serde(default)]
    pub stations: Stations,

    #[serde(default)]
    pub output: Output,

    #[serde(default)]
    pub resources: Resources,
}

impl Config {
    /// Config structure constructor, responsible for
    /// deserializing configuration and checking it.
    pub fn new_from_file(file_path: &Path) -> Result<Config, ConfigError> {
        let data = fs::read(file_path)?;
        Config::new_from_slice(data.as_slice())
    }

    pub fn new_from_slice(data: &[u8]) -> Result<Config, ConfigError> {
        let config: Config = serde_yaml::from_slice(data)?;

        config.archive.check_bounds()?;
        config.domain.check_bounds()?;
        config.window.check_bounds()?;
        config.resources.check_bounds()?;

        Ok(config)
    }

    /// Path of the archive file for given cycle.
    pub fn archive_path(&self, cycle: &str) -> PathBuf {
        self.paths.archive_dir.join(self.archive.archive_file(cycle))
    }

    /// Path of the cropped file for given cycle.
    pub fn crop_path(&self, cycle: &str) -> PathBuf {
        self.paths.crop_dir.join(self.archive.crop_file(cycle))
    }

    /// Configuration with default settings rooted in given directory.
    #[cfg(test)]
    pub fn new_in_dir(root: &Path) -> Config {
        Config {
            paths: Paths {
                archive_dir: root.join("archive"),
                crop_dir: root.join("crop"),
                series_dir: root.join("series"),
                record: root.join("target_metadata.json"),
                stations: root.join("stations.csv"),
            },
            archive: Archive::default(),
            domain: Domain::default(),
            window: Window::default(),
            stations: Stations::default(),
            output: Output::default(),
            resources: Resources::default(),
        }
    }
}
