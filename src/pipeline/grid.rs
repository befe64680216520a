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

//! Module reading, cropping and writing gridded cycle files.
//!
//! One cycle file holds 1D `latitude`, `longitude` and `time`
//! coordinate variables and any number of data variables declared
//! over `(time, latitude, longitude)` or `(latitude, longitude)`.
//! Whole file is read into memory, as cycle files
//! of the ensemble archive are small enough for that.

use super::geo::{index_window, validate_axis, BoundingBox};
use super::persist::write_atomic;
use crate::constants::{LAT_NAME, LON_NAME, TIME_NAME};
use crate::errors::GridError;
use crate::Float;
use log::{debug, warn};
use ndarray::{s, Array2, Array3};
use std::path::Path;

/// Values of a data variable.
#[derive(Clone, PartialEq, Debug)]
pub enum FieldData {
    /// Array shaped `(time, latitude, longitude)`.
    Varying(Array3<f32>),

    /// Array shaped `(latitude, longitude)`.
    Static(Array2<f32>),
}

#[derive(Clone, PartialEq, Debug)]
pub struct GridVariable {
    pub name: String,
    pub data: FieldData,
}

impl GridVariable {
    /// Values of the variable at one gridpoint for every time step.
    ///
    /// Time-invariant variables have no time series.
    pub fn series_at(&self, lat_index: usize, lon_index: usize) -> Option<Vec<f32>> {
        match &self.data {
            FieldData::Varying(data) => Some(data.slice(s![.., lat_index, lon_index]).to_vec()),
            FieldData::Static(_) => None,
        }
    }
}

/// Gridded data of one forecast cycle.
#[derive(Clone, PartialEq, Debug)]
pub struct CycleGrid {
    pub lats: Vec<Float>,
    pub lons: Vec<Float>,

    /// Seconds since Unix epoch (UTC).
    pub times: Vec<f64>,

    pub variables: Vec<GridVariable>,
}

impl CycleGrid {
    /// Reads the whole cycle file.
    ///
    /// Coordinate axes are validated, so that later nearest-index
    /// searches cannot silently return wrong indices. Variables declared
    /// over other dimensions than supported are skipped with a warning.
    pub fn read(path: &Path) -> Result<Self, GridError> {
        debug!("Reading cycle file {}", path.display());

        let file = netcdf::open(path)?;

        let lats = read_coord(&file, LAT_NAME)?;
        let lons = read_coord(&file, LON_NAME)?;
        let times = read_coord(&file, TIME_NAME)?;

        validate_axis(&lats).map_err(|err| GridError::MalformedAxis(LAT_NAME, err))?;
        validate_axis(&lons).map_err(|err| GridError::MalformedAxis(LON_NAME, err))?;

        let (n_time, n_lat, n_lon) = (times.len(), lats.len(), lons.len());

        let mut variables = vec![];

        for var in file.variables() {
            let name = var.name();

            if name == LAT_NAME || name == LON_NAME || name == TIME_NAME {
                continue;
            }

            let dim_names: Vec<String> = var.dimensions().iter().map(|d| d.name()).collect();
            let dim_names: Vec<&str> = dim_names.iter().map(String::as_str).collect();
            let shape: Vec<usize> = var.dimensions().iter().map(|d| d.len()).collect();

            let data = match dim_names.as_slice() {
                [TIME_NAME, LAT_NAME, LON_NAME] => {
                    if shape != [n_time, n_lat, n_lon] {
                        return Err(GridError::ShapeMismatch(name));
                    }

                    let values = read_unpacked(&var)?;
                    let data = Array3::from_shape_vec((n_time, n_lat, n_lon), values)
                        .map_err(|_| GridError::ShapeMismatch(name.clone()))?;

                    FieldData::Varying(data)
                }
                [LAT_NAME, LON_NAME] => {
                    if shape != [n_lat, n_lon] {
                        return Err(GridError::ShapeMismatch(name));
                    }

                    let values = read_unpacked(&var)?;
                    let data = Array2::from_shape_vec((n_lat, n_lon), values)
                        .map_err(|_| GridError::ShapeMismatch(name.clone()))?;

                    FieldData::Static(data)
                }
                other => {
                    warn!(
                        "Skipping variable {} in {} declared over unsupported dimensions {:?}",
                        name,
                        path.display(),
                        other
                    );
                    continue;
                }
            };

            variables.push(GridVariable { name, data });
        }

        Ok(CycleGrid {
            lats,
            lons,
            times,
            variables,
        })
    }

    /// New grid restricted to the box, with the time axis untouched.
    ///
    /// The window along each axis spans from the index nearest to the
    /// lower box edge up to, but excluding, the index nearest to the
    /// upper box edge.
    pub fn crop(&self, bbox: &BoundingBox) -> Result<Self, GridError> {
        let (lat_start, lat_end) = index_window(&self.lats, bbox.lat_min, bbox.lat_max)
            .map_err(|err| GridError::MalformedAxis(LAT_NAME, err))?;
        let (lon_start, lon_end) = index_window(&self.lons, bbox.lon_min, bbox.lon_max)
            .map_err(|err| GridError::MalformedAxis(LON_NAME, err))?;

        if lat_start == lat_end {
            return Err(GridError::EmptyWindow(LAT_NAME));
        }

        if lon_start == lon_end {
            return Err(GridError::EmptyWindow(LON_NAME));
        }

        debug!(
            "Cropping to latitude indices {}..{} and longitude indices {}..{}",
            lat_start, lat_end, lon_start, lon_end
        );

        let variables = self
            .variables
            .iter()
            .map(|variable| {
                let data = match &variable.data {
                    FieldData::Varying(data) => FieldData::Varying(
                        data.slice(s![.., lat_start..lat_end, lon_start..lon_end])
                            .to_owned(),
                    ),
                    FieldData::Static(data) => FieldData::Static(
                        data.slice(s![lat_start..lat_end, lon_start..lon_end])
                            .to_owned(),
                    ),
                };

                GridVariable {
                    name: variable.name.clone(),
                    data,
                }
            })
            .collect();

        Ok(CycleGrid {
            lats: self.lats[lat_start..lat_end].to_vec(),
            lons: self.lons[lon_start..lon_end].to_vec(),
            times: self.times.clone(),
            variables,
        })
    }

    /// Writes the grid as a new NetCDF file, replacing
    /// the destination only once the file is complete.
    ///
    /// Coordinates and variables are stored in single precision, the time
    /// axis in double precision. Every variable is declared over
    /// `(time, latitude, longitude)`, time-invariant ones are repeated
    /// along the time axis.
    pub fn write(&self, path: &Path) -> Result<(), GridError> {
        write_atomic(path, |temp| self.write_netcdf(temp))
    }

    fn write_netcdf(&self, path: &Path) -> Result<(), GridError> {
        let (n_time, n_lat, n_lon) = (self.times.len(), self.lats.len(), self.lons.len());

        let mut file = netcdf::create(path)?;

        file.add_dimension(LAT_NAME, n_lat)?;
        file.add_dimension(LON_NAME, n_lon)?;
        file.add_dimension(TIME_NAME, n_time)?;

        {
            let mut lat_var = file.add_variable::<f32>(LAT_NAME, &[LAT_NAME])?;
            lat_var.put_attribute("standard_name", "latitude")?;
            lat_var.put_attribute("units", "degrees_north")?;
            lat_var.put_values(&to_single(&self.lats), ..)?;
        }

        {
            let mut lon_var = file.add_variable::<f32>(LON_NAME, &[LON_NAME])?;
            lon_var.put_attribute("standard_name", "longitude")?;
            lon_var.put_attribute("units", "degrees_east")?;
            lon_var.put_values(&to_single(&self.lons), ..)?;
        }

        {
            let mut time_var = file.add_variable::<f64>(TIME_NAME, &[TIME_NAME])?;
            time_var.put_attribute("standard_name", "time")?;
            time_var.put_attribute("units", "seconds since 1970-01-01 00:00:00")?;
            time_var.put_values(&self.times, ..)?;
        }

        for variable in &self.variables {
            let values: Vec<f32> = match &variable.data {
                FieldData::Varying(data) => data.iter().copied().collect(),
                FieldData::Static(data) => data
                    .broadcast((n_time, n_lat, n_lon))
                    .ok_or_else(|| GridError::ShapeMismatch(variable.name.clone()))?
                    .iter()
                    .copied()
                    .collect(),
            };

            if values.len() != n_time * n_lat * n_lon {
                return Err(GridError::ShapeMismatch(variable.name.clone()));
            }

            let mut var =
                file.add_variable::<f32>(&variable.name, &[TIME_NAME, LAT_NAME, LON_NAME])?;
            var.put_values(&values, ..)?;
        }

        Ok(())
    }
}

fn to_single(values: &[Float]) -> Vec<f32> {
    values.iter().map(|&v| v as f32).collect()
}

/// Reads a 1D coordinate variable.
fn read_coord(file: &netcdf::File, name: &'static str) -> Result<Vec<f64>, GridError> {
    let var = file
        .variable(name)
        .ok_or(GridError::MissingVariable(name))?;

    Ok(var.get_values::<f64, _>(..)?)
}

/// Reads variable values, applying packing attributes
/// and replacing fill values with NaN.
fn read_unpacked(var: &netcdf::Variable) -> Result<Vec<f32>, GridError> {
    let scale = numeric_attribute(var, "scale_factor").unwrap_or(1.0);
    let offset = numeric_attribute(var, "add_offset").unwrap_or(0.0);
    let fill = numeric_attribute(var, "_FillValue").or_else(|| numeric_attribute(var, "missing_value"));

    // fill values are compared in the packed representation
    let raw: Vec<f64> = var.get_values::<f64, _>(..)?;

    Ok(raw
        .into_iter()
        .map(|value| {
            if fill.map_or(false, |fill| value == fill) || !value.is_finite() {
                f32::NAN
            } else {
                (value * scale + offset) as f32
            }
        })
        .collect())
}

fn numeric_attribute(var: &netcdf::Variable, name: &str) -> Option<f64> {
    var.attribute(name)
        .and_then(|attr| attr.value().ok())
        .and_then(|value| match value {
            netcdf::AttributeValue::Double(v) => Some(v),
            netcdf::AttributeValue::Float(v) => Some(f64::from(v)),
            netcdf::AttributeValue::Int(v) => Some(f64::from(v)),
            netcdf::AttributeValue::Short(v) => Some(f64::from(v)),
            netcdf::AttributeValue::Schar(v) => Some(f64::from(v)),
            netcdf::AttributeValue::Uchar(v) => Some(f64::from(v)),
            netcdf::AttributeValue::Ushort(v) => Some(f64::from(v)),
            netcdf::AttributeValue::Uint(v) => Some(f64::from(v)),
            _ => None,
        })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::{CycleGrid, FieldData, GridVariable};
    use crate::errors::{GridError, SearchError};
    use crate::pipeline::geo::{BoundingBox, GeoPoint};
    use ndarray::{Array2, Array3};

    /// Axis from `start` with `count` values spaced by `step`.
    pub(crate) fn axis(start: f64, step: f64, count: usize) -> Vec<f64> {
        (0..count).map(|i| start + step * i as f64).collect()
    }

    /// Grid over lat 30..40 and lon 125..135 every 0.5 degree,
    /// with one time-varying and one time-invariant variable
    /// whose values encode their indices.
    pub(crate) fn sample_grid() -> CycleGrid {
        let lats = axis(30.0, 0.5, 21);
        let lons = axis(125.0, 0.5, 21);
        let times = vec![1_737_676_800.0, 1_737_720_000.0];

        let wind = Array3::from_shape_fn((2, 21, 21), |(t, j, i)| (t * 10_000 + j * 100 + i) as f32);
        let height = Array2::from_shape_fn((21, 21), |(j, i)| (j * 100 + i) as f32);

        CycleGrid {
            lats,
            lons,
            times,
            variables: vec![
                GridVariable {
                    name: "u10".to_string(),
                    data: FieldData::Varying(wind),
                },
                GridVariable {
                    name: "hgt".to_string(),
                    data: FieldData::Static(height),
                },
            ],
        }
    }

    #[test]
    fn crop_keeps_time_and_slices_space() {
        let grid = sample_grid();
        let bbox = BoundingBox::around(&GeoPoint::new(35.52, 130.06), 150.0);

        let cropped = grid.crop(&bbox).unwrap();

        // nearest to 34.17 is 34.0 (index 8), to 36.87 is 37.0 (index 14)
        assert_eq!(cropped.lats, axis(34.0, 0.5, 6));
        // nearest to 128.40 is 128.5 (index 7), to 131.72 is 131.5 (index 13)
        assert_eq!(cropped.lons, axis(128.5, 0.5, 6));
        assert_eq!(cropped.times, grid.times);

        match &cropped.variables[0].data {
            FieldData::Varying(data) => {
                assert_eq!(data.dim(), (2, 6, 6));
                assert_eq!(data[[1, 0, 0]], 10_807.0);
                assert_eq!(data[[0, 5, 5]], 1_312.0);
            }
            other => panic!("unexpected data {:?}", other),
        }

        match &cropped.variables[1].data {
            FieldData::Static(data) => {
                assert_eq!(data.dim(), (6, 6));
                assert_eq!(data[[0, 0]], 807.0);
            }
            other => panic!("unexpected data {:?}", other),
        }
    }

    #[test]
    fn crop_on_descending_latitudes() {
        let mut grid = sample_grid();
        grid.lats.reverse();

        let bbox = BoundingBox::around(&GeoPoint::new(35.52, 130.06), 150.0);
        let cropped = grid.crop(&bbox).unwrap();

        // 37.0 sits at index 6 and 34.0 at index 12 of the reversed axis
        assert_eq!(cropped.lats, vec![37.0, 36.5, 36.0, 35.5, 35.0, 34.5]);
    }

    #[test]
    fn crop_outside_grid_is_empty() {
        let grid = sample_grid();
        let bbox = BoundingBox::around(&GeoPoint::new(-40.0, 130.06), 150.0);

        assert!(matches!(grid.crop(&bbox), Err(GridError::EmptyWindow(_))));
    }

    #[test]
    fn only_varying_variables_have_series() {
        let grid = sample_grid();

        assert_eq!(grid.variables[0].series_at(3, 4), Some(vec![304.0, 10_304.0]));
        assert_eq!(grid.variables[1].series_at(3, 4), None);
    }

    /// Writes a file with given axes and one `u10` field,
    /// optionally leaving the longitude variable out.
    fn write_raw_file(path: &std::path::Path, lats: &[f64], lons: &[f64], with_lons: bool) {
        let mut file = netcdf::create(path).unwrap();
        file.add_dimension("latitude", lats.len()).unwrap();
        file.add_dimension("longitude", lons.len()).unwrap();
        file.add_dimension("time", 1).unwrap();

        file.add_variable::<f64>("latitude", &["latitude"])
            .unwrap()
            .put_values(lats, ..)
            .unwrap();
        if with_lons {
            file.add_variable::<f64>("longitude", &["longitude"])
                .unwrap()
                .put_values(lons, ..)
                .unwrap();
        }
        file.add_variable::<f64>("time", &["time"])
            .unwrap()
            .put_values(&[1_737_676_800.0], ..)
            .unwrap();
        file.add_variable::<f32>("u10", &["time", "latitude", "longitude"])
            .unwrap()
            .put_values(&vec![1.0_f32; lats.len() * lons.len()], ..)
            .unwrap();
    }

    #[test]
    fn unordered_axis_in_file_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ensemble.BMA_3d.2025012400.wind.nc");
        write_raw_file(&path, &[30.0, 31.0, 30.5], &axis(125.0, 0.5, 3), true);

        assert!(matches!(
            CycleGrid::read(&path),
            Err(GridError::MalformedAxis("latitude", SearchError::NonMonotonic))
        ));
    }

    #[test]
    fn missing_axis_in_file_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ensemble.BMA_3d.2025012400.wind.nc");
        write_raw_file(&path, &axis(30.0, 0.5, 3), &axis(125.0, 0.5, 3), false);

        assert!(matches!(
            CycleGrid::read(&path),
            Err(GridError::MissingVariable("longitude"))
        ));
    }

    #[test]
    fn written_grid_reads_back_with_broadcast_statics() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cropped_2025012400.nc");

        let grid = sample_grid()
            .crop(&BoundingBox::around(&GeoPoint::new(35.52, 130.06), 150.0))
            .unwrap();
        grid.write(&path).unwrap();

        let read = CycleGrid::read(&path).unwrap();

        assert_eq!(read.lats, grid.lats);
        assert_eq!(read.lons, grid.lons);
        assert_eq!(read.times, grid.times);
        assert_eq!(read.variables[0], grid.variables[0]);

        match &read.variables[1].data {
            FieldData::Varying(data) => {
                assert_eq!(data.dim(), (2, 6, 6));
                assert_eq!(data[[0, 2, 3]], data[[1, 2, 3]]);
                assert_eq!(data[[1, 2, 3]], 1_010.0);
            }
            other => panic!("unexpected data {:?}", other),
        }
    }

    #[test]
    fn cropping_is_repeatable() {
        let dir = tempfile::tempdir().unwrap();
        let bbox = BoundingBox::around(&GeoPoint::new(35.52, 130.06), 150.0);

        let first = dir.path().join("first.nc");
        let second = dir.path().join("second.nc");
        sample_grid().crop(&bbox).unwrap().write(&first).unwrap();
        sample_grid().crop(&bbox).unwrap().write(&second).unwrap();

        assert_eq!(
            CycleGrid::read(&first).unwrap(),
            CycleGrid::read(&second).unwrap()
        );
    }
}
