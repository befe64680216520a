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

//! Module containing constants used by the pipeline.

use crate::Float;

/// Mean Earth radius (km) used in great-circle distances.
pub const EARTH_RADIUS_KM: Float = 6371.0;

/// Length of one degree of latitude (km).
///
/// The length of one degree of longitude is this value
/// scaled by the cosine of latitude.
pub const KM_PER_DEGREE_LAT: Float = 111.32;

/// Format of cycle stamps in file names and in the run record.
pub const CYCLE_STAMP_FORMAT: &str = "%Y%m%d%H";

/// Placeholder replaced by the cycle stamp in file name patterns.
pub const CYCLE_PLACEHOLDER: &str = "{cycle}";

pub const LAT_NAME: &str = "latitude";
pub const LON_NAME: &str = "longitude";
pub const TIME_NAME: &str = "time";
