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

//! Module reading the station reference table and
//! selecting the station nearest to the incident.

use super::geo::GeoPoint;
use crate::errors::StationError;
use crate::Float;
use encoding_rs::Encoding;
use log::{debug, warn};
use serde::Deserialize;
use std::{borrow::Cow, fs, path::Path};

/// Observation station.
#[derive(Clone, PartialEq, Debug)]
pub struct Station {
    pub id: String,
    pub name: String,
    pub location: GeoPoint,
}

/// Row of the station table. Column names of the national
/// metadata table are accepted along with plain english ones.
#[derive(Debug, Deserialize)]
struct StationRow {
    #[serde(alias = "station_id", alias = "id")]
    stn_num: String,
    #[serde(alias = "station_name", alias = "name")]
    stn_na: String,
    #[serde(alias = "latitude")]
    lat: Float,
    #[serde(alias = "longitude")]
    lon: Float,
}

/// Accepted names of the required columns, the first one is canonical.
const REQUIRED_COLUMNS: [&[&str]; 4] = [
    &["stn_num", "station_id", "id"],
    &["stn_na", "station_name", "name"],
    &["lat", "latitude"],
    &["lon", "longitude"],
];

/// Reads all stations from a CSV table in given encoding.
///
/// Rows that cannot be parsed are skipped with a warning,
/// the table must however yield at least one station.
pub fn load_stations(path: &Path, encoding_label: &str) -> Result<Vec<Station>, StationError> {
    if !path.is_file() {
        return Err(StationError::NotFound(path.display().to_string()));
    }

    let encoding = Encoding::for_label(encoding_label.as_bytes())
        .ok_or_else(|| StationError::UnknownEncoding(encoding_label.to_string()))?;

    debug!(
        "Reading station table {} as {}",
        path.display(),
        encoding.name()
    );

    let raw = fs::read(path)?;
    // BOM, if present, takes precedence over the configured encoding
    let (text, _, had_errors) = encoding.decode(&raw);

    if had_errors {
        warn!(
            "Station table {} contains bytes invalid in {}, they were replaced",
            path.display(),
            encoding.name()
        );
    }

    let stations = parse_stations(text)?;

    if stations.is_empty() {
        return Err(StationError::EmptyTable);
    }

    Ok(stations)
}

fn parse_stations(text: Cow<str>) -> Result<Vec<Station>, StationError> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(text.as_bytes());

    let headers = reader.headers()?.clone();

    for names in REQUIRED_COLUMNS {
        if !headers.iter().any(|header| names.contains(&header)) {
            return Err(StationError::MissingColumn(names[0]));
        }
    }

    let mut stations = vec![];

    for (line, row) in reader.deserialize::<StationRow>().enumerate() {
        match row {
            Ok(row) => stations.push(Station {
                id: row.stn_num,
                name: row.stn_na,
                location: GeoPoint::new(row.lat, row.lon),
            }),
            Err(err) => warn!("Skipping station table row {}: {}", line + 2, err),
        }
    }

    Ok(stations)
}

/// Station closest to the target.
///
/// Ties are resolved to the station listed first.
pub fn nearest_station<'a>(
    target: &GeoPoint,
    stations: &'a [Station],
) -> Result<(&'a Station, Float), StationError> {
    let mut nearest: Option<(&Station, Float)> = None;

    for station in stations {
        let distance = target.distance_to(&station.location);

        // NaN distances never win
        if distance.is_nan() {
            continue;
        }

        match nearest {
            Some((_, best)) if distance >= best => {}
            _ => nearest = Some((station, distance)),
        }
    }

    nearest.ok_or(StationError::EmptyTable)
}

#[cfg(test)]
mod tests {
    use super::{load_stations, nearest_station, Station};
    use crate::errors::StationError;
    use crate::pipeline::geo::GeoPoint;
    use std::fs;

    fn station(id: &str, lat: f64, lon: f64) -> Station {
        Station {
            id: id.to_string(),
            name: format!("station {}", id),
            location: GeoPoint::new(lat, lon),
        }
    }

    #[test]
    fn picks_the_closest() {
        let stations = vec![
            station("a", 37.46, 131.11),
            station("b", 35.10, 129.03),
            station("c", 33.51, 126.53),
        ];

        let (found, distance) = nearest_station(&GeoPoint::new(35.52, 130.06), &stations).unwrap();

        assert_eq!(found.id, "b");
        assert!(distance > 0.0 && distance < 120.0);
    }

    #[test]
    fn ties_go_to_first_listed() {
        let stations = vec![station("east", 0.0, 1.0), station("west", 0.0, -1.0)];

        let (found, _) = nearest_station(&GeoPoint::new(0.0, 0.0), &stations).unwrap();

        assert_eq!(found.id, "east");
    }

    #[test]
    fn empty_table_is_an_error() {
        let result = nearest_station(&GeoPoint::new(0.0, 0.0), &[]);

        assert!(matches!(result, Err(StationError::EmptyTable)));
    }

    #[test]
    fn reads_legacy_korean_encoding() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("SAR_meta_data.csv");

        let text = "stn_num,stn_na,lat,lon\n22105,동해,37.48,129.95\n22106,포항,36.35,129.78\n";
        let (encoded, _, _) = encoding_rs::EUC_KR.encode(text);
        fs::write(&path, &encoded).unwrap();

        let stations = load_stations(&path, "euc-kr").unwrap();

        assert_eq!(stations.len(), 2);
        assert_eq!(stations[0].id, "22105");
        assert_eq!(stations[0].name, "동해");
        assert_eq!(stations[1].location, GeoPoint::new(36.35, 129.78));
    }

    #[test]
    fn header_only_table_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stations.csv");
        fs::write(&path, "station_id,name,latitude,longitude\n").unwrap();

        let result = load_stations(&path, "utf-8");

        assert!(matches!(result, Err(StationError::EmptyTable)));
    }

    #[test]
    fn table_without_coordinates_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stations.csv");
        fs::write(&path, "stn_num,stn_na\n22105,Donghae\n").unwrap();

        let result = load_stations(&path, "utf-8");

        assert!(matches!(result, Err(StationError::MissingColumn("lat"))));
    }

    #[test]
    fn missing_table_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let result = load_stations(&dir.path().join("absent.csv"), "utf-8");

        assert!(matches!(result, Err(StationError::NotFound(_))));
    }
}
