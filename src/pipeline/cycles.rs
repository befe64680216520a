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

//! Module planning which forecast cycles are processed
//! for an incident.
//!
//! Both stages take their list of cycles from [`CycleWindow::plan`]
//! with the same window configuration, so the cropped files written
//! by one stage are exactly the files looked for by the other.

use super::configuration::{Window, WindowMode};
use crate::constants::CYCLE_STAMP_FORMAT;
use crate::errors::RecordError;
use chrono::{Duration, NaiveDateTime, Timelike};

/// Parses a `YYYYMMDDHH` cycle stamp.
pub fn parse_stamp(stamp: &str) -> Result<NaiveDateTime, RecordError> {
    if stamp.len() != 10 || !stamp.bytes().all(|b| b.is_ascii_digit()) {
        return Err(RecordError::InvalidStamp(stamp.to_string()));
    }

    // chrono needs minutes to build a datetime
    NaiveDateTime::parse_from_str(&format!("{}00", stamp), "%Y%m%d%H%M")
        .map_err(|_| RecordError::InvalidStamp(stamp.to_string()))
}

pub fn format_stamp(datetime: &NaiveDateTime) -> String {
    datetime.format(CYCLE_STAMP_FORMAT).to_string()
}

/// Window of cycles preceding (and including) the reference time.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub struct CycleWindow {
    pub lookback_days: u32,
    pub cadence_hours: u32,
    pub mode: WindowMode,
}

impl CycleWindow {
    pub fn new(window: &Window) -> Self {
        CycleWindow {
            lookback_days: window.lookback_days,
            cadence_hours: window.cadence_hours,
            mode: window.mode,
        }
    }

    /// Ascending list of cycle times for the reference time.
    ///
    /// In [`WindowMode::Anchored`] the window starts at midnight
    /// `lookback_days` before the reference day and steps up to the
    /// reference time, inclusive when it falls on the cadence.
    /// In [`WindowMode::Trailing`] it holds
    /// `lookback_days * 24 / cadence_hours + 1` cycles counted
    /// backward from the reference time.
    ///
    /// For reference times at midnight both modes give the same list.
    pub fn plan(&self, reference: NaiveDateTime) -> Vec<NaiveDateTime> {
        let step = Duration::hours(i64::from(self.cadence_hours));

        match self.mode {
            WindowMode::Anchored => {
                let midnight =
                    reference - Duration::seconds(i64::from(reference.num_seconds_from_midnight()));
                let start = midnight - Duration::days(i64::from(self.lookback_days));

                let mut cycles = vec![];
                let mut current = start;

                while current <= reference {
                    cycles.push(current);
                    current += step;
                }

                cycles
            }
            WindowMode::Trailing => {
                let count = self.lookback_days * 24 / self.cadence_hours + 1;

                let mut cycles: Vec<NaiveDateTime> = (0..count)
                    .map(|i| reference - step * i as i32)
                    .collect();
                cycles.reverse();

                cycles
            }
        }
    }

    /// Same as [`CycleWindow::plan`] but with cycles rendered as stamps.
    pub fn plan_stamps(&self, reference: NaiveDateTime) -> Vec<String> {
        self.plan(reference).iter().map(format_stamp).collect()
    }
}
