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

//! Module handling the run record shared by the stages.
//!
//! The record is a small JSON document written by the query stage
//! (`target_lat`, `target_lon`, `target_date`) and extended by the
//! extraction stage with the matched station (`station_num`,
//! `station_name`). Fields are only ever added, fields unknown to
//! this version are kept when the record is rewritten.

use super::cycles::parse_stamp;
use super::geo::GeoPoint;
use super::persist::write_atomic;
use super::stations::Station;
use crate::errors::RecordError;
use crate::Float;
use chrono::NaiveDateTime;
use log::debug;
use serde::{Deserialize, Deserializer, Serialize};
use std::{fs, path::Path};

/// Incident point and time, validated.
#[derive(Copy, Clone, PartialEq, PartialOrd, Debug)]
pub struct IncidentQuery {
    pub target: GeoPoint,
    pub reference: NaiveDateTime,
}

impl IncidentQuery {
    pub fn new(lat: Float, lon: Float, date: &str) -> Result<Self, RecordError> {
        if !lat.is_finite() || !(-90.0..=90.0).contains(&lat) {
            return Err(RecordError::InvalidQuery(format!(
                "latitude {} outside [-90, 90]",
                lat
            )));
        }

        if !lon.is_finite() || !(-180.0..=180.0).contains(&lon) {
            return Err(RecordError::InvalidQuery(format!(
                "longitude {} outside [-180, 180]",
                lon
            )));
        }

        let reference = parse_stamp(date)?;

        Ok(IncidentQuery {
            target: GeoPoint::new(lat, lon),
            reference,
        })
    }
}

/// On-disk shape of the run record.
#[derive(Clone, PartialEq, Debug, Serialize, Deserialize)]
pub struct RunRecord {
    pub target_lat: Float,
    pub target_lon: Float,
    pub target_date: String,

    #[serde(
        default,
        deserialize_with = "station_num_from_any",
        skip_serializing_if = "Option::is_none"
    )]
    pub station_num: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub station_name: Option<String>,

    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// Station numbers were written as JSON numbers by older tools.
fn station_num_from_any<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum NumOrString {
        Int(i64),
        Float(Float),
        Text(String),
    }

    Ok(
        Option::<NumOrString>::deserialize(deserializer)?.map(|value| match value {
            NumOrString::Int(num) => num.to_string(),
            NumOrString::Float(num) => num.to_string(),
            NumOrString::Text(text) => text,
        }),
    )
}

impl RunRecord {
    pub fn new(query: &IncidentQuery) -> Self {
        RunRecord {
            target_lat: query.target.lat,
            target_lon: query.target.lon,
            target_date: super::cycles::format_stamp(&query.reference),
            station_num: None,
            station_name: None,
            extra: serde_json::Map::new(),
        }
    }

    /// Reads the record. A missing record is fatal for the stages.
    pub fn load(path: &Path) -> Result<Self, RecordError> {
        if !path.is_file() {
            return Err(RecordError::NotFound(path.display().to_string()));
        }

        debug!("Reading run record from {}", path.display());
        let data = fs::read(path)?;
        let record: RunRecord = serde_json::from_slice(&data)?;

        Ok(record)
    }

    pub fn save(&self, path: &Path) -> Result<(), RecordError> {
        debug!("Writing run record to {}", path.display());
        let data = serde_json::to_vec_pretty(self)?;

        write_atomic(path, |temp| -> Result<(), RecordError> {
            fs::write(temp, &data)?;
            Ok(())
        })
    }

    /// Validated incident query stored in the record.
    pub fn query(&self) -> Result<IncidentQuery, RecordError> {
        IncidentQuery::new(self.target_lat, self.target_lon, &self.target_date)
    }

    pub fn attach_station(&mut self, station: &Station) {
        self.station_num = Some(station.id.clone());
        self.station_name = Some(station.name.clone());
    }
}
