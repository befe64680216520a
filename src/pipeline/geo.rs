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

//! Module with geographic helpers used by both stages:
//! great-circle distance, nearest-index search on coordinate
//! axes and sizing of the crop box around the target.

use crate::constants::{EARTH_RADIUS_KM, KM_PER_DEGREE_LAT};
use crate::errors::SearchError;
use crate::Float;

/// Geographic point in degrees.
#[derive(Copy, Clone, PartialEq, PartialOrd, Debug, Default)]
pub struct GeoPoint {
    pub lat: Float,
    pub lon: Float,
}

impl GeoPoint {
    pub fn new(lat: Float, lon: Float) -> Self {
        GeoPoint { lat, lon }
    }

    /// Haversine great-circle distance in kilometres.
    pub fn distance_to(&self, other: &GeoPoint) -> Float {
        haversine(self.lat, self.lon, other.lat, other.lon)
    }
}

/// Great-circle distance (km) between two points
/// given in degrees, on a sphere of radius [`EARTH_RADIUS_KM`].
pub fn haversine(lat_1: Float, lon_1: Float, lat_2: Float, lon_2: Float) -> Float {
    let phi_1 = lat_1.to_radians();
    let phi_2 = lat_2.to_radians();
    let d_phi = phi_2 - phi_1;
    let d_lambda = lon_2.to_radians() - lon_1.to_radians();

    let a = (d_phi / 2.0).sin().powi(2) + phi_1.cos() * phi_2.cos() * (d_lambda / 2.0).sin().powi(2);

    2.0 * EARTH_RADIUS_KM * a.sqrt().asin()
}

/// Checks that the axis can be searched: it must be non-empty,
/// finite and monotonic (ascending or descending). Repeated
/// values are allowed.
pub fn validate_axis(axis: &[Float]) -> Result<(), SearchError> {
    if axis.is_empty() {
        return Err(SearchError::EmptyAxis);
    }

    if axis.iter().any(|v| !v.is_finite()) {
        return Err(SearchError::NonFinite);
    }

    let ascending = axis.windows(2).all(|w| w[0] <= w[1]);
    let descending = axis.windows(2).all(|w| w[0] >= w[1]);

    if !ascending && !descending {
        return Err(SearchError::NonMonotonic);
    }

    Ok(())
}

/// Index of the axis entry closest to `x`.
///
/// Linear scan keeping the first minimum, so ties and repeated
/// values resolve to the lowest index. Values outside the axis
/// resolve to the nearest end of the axis.
pub fn nearest_index(axis: &[Float], x: Float) -> Result<usize, SearchError> {
    if axis.is_empty() {
        return Err(SearchError::EmptyAxis);
    }

    let mut best = 0;
    let mut best_diff = (axis[0] - x).abs();

    for (i, value) in axis.iter().enumerate().skip(1) {
        let diff = (value - x).abs();

        if diff < best_diff {
            best = i;
            best_diff = diff;
        }
    }

    Ok(best)
}

/// Nearest indices of both ends of a coordinate range.
///
/// The pair follows the order of `(from, to)`, so on a descending
/// axis the first index can be the larger one.
pub fn nearest_index_pair(
    axis: &[Float],
    from: Float,
    to: Float,
) -> Result<(usize, usize), SearchError> {
    Ok((nearest_index(axis, from)?, nearest_index(axis, to)?))
}

/// Half-open index window `[start, end)` between the nearest
/// indices of `from` and `to`, regardless of axis direction.
pub fn index_window(axis: &[Float], from: Float, to: Float) -> Result<(usize, usize), SearchError> {
    let (i, j) = nearest_index_pair(axis, from, to)?;

    Ok((i.min(j), i.max(j)))
}

/// Geographic box around a point.
#[derive(Copy, Clone, PartialEq, PartialOrd, Debug)]
pub struct BoundingBox {
    pub lat_min: Float,
    pub lat_max: Float,
    pub lon_min: Float,
    pub lon_max: Float,
}

impl BoundingBox {
    /// Box spanning `radius_km` to each side of the center.
    ///
    /// Length of a degree of longitude shrinks with latitude,
    /// so the longitude half-span depends on the center latitude.
    /// It is capped at 180 degrees close to the poles.
    pub fn around(center: &GeoPoint, radius_km: Float) -> Self {
        let (lat_span, lon_span) = half_spans(center.lat, radius_km);

        BoundingBox {
            lat_min: center.lat - lat_span,
            lat_max: center.lat + lat_span,
            lon_min: center.lon - lon_span,
            lon_max: center.lon + lon_span,
        }
    }
}

/// Latitude and longitude half-spans (degrees) of `radius_km`
/// at given latitude.
pub fn half_spans(lat: Float, radius_km: Float) -> (Float, Float) {
    let lat_span = radius_km / KM_PER_DEGREE_LAT;

    let km_per_degree_lon = KM_PER_DEGREE_LAT * lat.to_radians().cos();
    let lon_span = if km_per_degree_lon > 0.0 {
        (radius_km / km_per_degree_lon).min(180.0)
    } else {
        180.0
    };

    (lat_span, lon_span)
}
