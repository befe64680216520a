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

//! Module converting cropped cycle grids into per-gridpoint
//! time series tables tagged with the matched station.

use super::geo::{nearest_index, GeoPoint};
use super::grid::CycleGrid;
use super::persist::write_atomic;
use super::stations::Station;
use crate::constants::{LAT_NAME, LON_NAME};
use crate::errors::GridError;
use crate::Float;
use chrono::{DateTime, NaiveDateTime};
use log::debug;
use std::{
    fs::File,
    io::Write,
    path::{Path, PathBuf},
};

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";
const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Gridpoint within the search radius of the target.
#[derive(Copy, Clone, PartialEq, PartialOrd, Debug)]
pub struct QualifyingPoint {
    pub lat: Float,
    pub lon: Float,
    pub lat_index: usize,
    pub lon_index: usize,
    pub distance_km: Float,
}

/// Every gridpoint of the grid not farther than `radius_km` from the target.
///
/// Points are taken from the full cross product of the latitude and
/// longitude axes. Indices are looked up again from the coordinate
/// values, so a repeated coordinate value always maps to its first
/// occurrence on the axis.
pub fn qualifying_points(
    grid: &CycleGrid,
    target: &GeoPoint,
    radius_km: Float,
) -> Result<Vec<QualifyingPoint>, GridError> {
    let mut points = vec![];

    for &lat in &grid.lats {
        for &lon in &grid.lons {
            let distance_km = target.distance_to(&GeoPoint::new(lat, lon));

            if distance_km <= radius_km {
                let lat_index = nearest_index(&grid.lats, lat)
                    .map_err(|err| GridError::MalformedAxis(LAT_NAME, err))?;
                let lon_index = nearest_index(&grid.lons, lon)
                    .map_err(|err| GridError::MalformedAxis(LON_NAME, err))?;

                points.push(QualifyingPoint {
                    lat,
                    lon,
                    lat_index,
                    lon_index,
                    distance_km,
                });
            }
        }
    }

    Ok(points)
}

/// Converts seconds since Unix epoch to UTC datetime.
pub fn epoch_to_datetime(seconds: f64) -> Result<NaiveDateTime, GridError> {
    if !seconds.is_finite() {
        return Err(GridError::InvalidTime(seconds));
    }

    let whole = seconds.floor();
    let nanos = ((seconds - whole) * 1e9).round().min(999_999_999.0) as u32;

    DateTime::from_timestamp(whole as i64, nanos)
        .map(|datetime| datetime.naive_utc())
        .ok_or(GridError::InvalidTime(seconds))
}

/// Time series of all variables at one gridpoint of one cycle.
#[derive(Clone, PartialEq, Debug)]
pub struct TimeSeriesRecord {
    pub station_id: String,
    pub cycle: String,
    pub point: QualifyingPoint,
    pub times: Vec<NaiveDateTime>,
    pub columns: Vec<(String, Vec<f32>)>,
}

impl TimeSeriesRecord {
    pub fn build(
        grid: &CycleGrid,
        point: QualifyingPoint,
        station: &Station,
        cycle: &str,
    ) -> Result<Self, GridError> {
        let times = grid
            .times
            .iter()
            .map(|&t| epoch_to_datetime(t))
            .collect::<Result<Vec<_>, _>>()?;

        // columns only for variables varying in time
        let columns = grid
            .variables
            .iter()
            .filter_map(|variable| {
                variable
                    .series_at(point.lat_index, point.lon_index)
                    .map(|values| (variable.name.clone(), values))
            })
            .collect();

        Ok(TimeSeriesRecord {
            station_id: station.id.clone(),
            cycle: cycle.to_string(),
            point,
            times,
            columns,
        })
    }

    /// File name built from station, point position and cycle.
    pub fn file_name(&self) -> String {
        format!(
            "{}_{:.2}_{:.2}_{}.csv",
            self.station_id, self.point.lat, self.point.lon, self.cycle
        )
    }

    pub fn header(&self) -> Vec<String> {
        let mut header = vec!["TIME".to_string()];
        header.extend(self.columns.iter().map(|(name, _)| name.clone()));
        header.extend(
            ["STN_NO", "LAT", "LON", "LAT_I", "LON_J"]
                .iter()
                .map(|s| s.to_string()),
        );

        header
    }

    /// Rows of the table, one per time step.
    pub fn rows(&self) -> Vec<Vec<String>> {
        // axes are stored in single precision in cropped files
        let lat = (self.point.lat as f32).to_string();
        let lon = (self.point.lon as f32).to_string();
        let lat_index = self.point.lat_index.to_string();
        let lon_index = self.point.lon_index.to_string();

        self.times
            .iter()
            .enumerate()
            .map(|(step, time)| {
                let mut row = vec![time.format(TIME_FORMAT).to_string()];

                row.extend(self.columns.iter().map(|(_, values)| {
                    let value = values[step];
                    if value.is_nan() {
                        String::new()
                    } else {
                        value.to_string()
                    }
                }));

                row.extend([
                    self.station_id.clone(),
                    lat.clone(),
                    lon.clone(),
                    lat_index.clone(),
                    lon_index.clone(),
                ]);

                row
            })
            .collect()
    }

    /// Writes the table into the directory and returns its path.
    pub fn write(&self, dir: &Path, bom: bool) -> Result<PathBuf, GridError> {
        let out_path = dir.join(self.file_name());

        write_atomic(&out_path, |temp| -> Result<(), GridError> {
            let mut out_file = File::create(temp)?;

            if bom {
                out_file.write_all(UTF8_BOM)?;
            }

            let mut writer = csv::Writer::from_writer(out_file);

            writer.write_record(self.header())?;

            for row in self.rows() {
                writer.write_record(row)?;
            }

            writer.flush()?;

            Ok(())
        })?;

        Ok(out_path)
    }
}

/// Writes time series tables of every qualifying point
/// of the cropped grid and returns their count.
pub fn extract_cycle(
    grid: &CycleGrid,
    target: &GeoPoint,
    radius_km: Float,
    station: &Station,
    cycle: &str,
    out_dir: &Path,
    bom: bool,
) -> Result<usize, GridError> {
    let points = qualifying_points(grid, target, radius_km)?;

    for point in &points {
        debug!(
            "Saving point: lat {:.2}, lon {:.2} (index: lat {}, lon {}), {:.1} km from target",
            point.lat, point.lon, point.lat_index, point.lon_index, point.distance_km
        );

        let record = TimeSeriesRecord::build(grid, *point, station, cycle)?;
        record.write(out_dir, bom)?;
    }

    Ok(points.len())
}
