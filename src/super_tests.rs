//! This is a module for end-to-end tests of the pipeline,
//! but with access to private fields and methods.
//!
//! Every test builds a small mock archive in a temporary directory,
//! so the stages can be run exactly as from the command line.

use crate::errors::{PipelineError, RecordError, StationError};
use crate::pipeline::{crop_stage, extract_stage, store_query, Config, Core};
use crate::QueryArgs;
use std::{fs, path::Path};

const STATIONS: &str = "stn_num,stn_na,lat,lon
22101,Deokjeokdo,37.24,126.02
22104,Geojedo,34.77,128.90
22106,Pohang,36.35,129.78
";

fn axis(start: f64, step: f64, count: usize) -> Vec<f64> {
    (0..count).map(|i| start + step * i as f64).collect()
}

/// Archive file with a single time-invariant variable `u10`
/// over lat 30..40 and lon 125..135 at 0.5 degree.
fn write_mock_archive(path: &Path) {
    let lats = axis(30.0, 0.5, 21);
    let lons = axis(125.0, 0.5, 21);
    let times = [1_737_676_800.0_f64, 1_737_698_400.0];

    let u10: Vec<f32> = (0..21)
        .flat_map(|j| (0..21).map(move |i| (j * 100 + i) as f32))
        .collect();

    let mut file = netcdf::create(path).unwrap();
    file.add_dimension("latitude", lats.len()).unwrap();
    file.add_dimension("longitude", lons.len()).unwrap();
    file.add_dimension("time", times.len()).unwrap();

    file.add_variable::<f64>("latitude", &["latitude"])
        .unwrap()
        .put_values(&lats, ..)
        .unwrap();
    file.add_variable::<f64>("longitude", &["longitude"])
        .unwrap()
        .put_values(&lons, ..)
        .unwrap();
    file.add_variable::<f64>("time", &["time"])
        .unwrap()
        .put_values(&times, ..)
        .unwrap();
    file.add_variable::<f32>("u10", &["latitude", "longitude"])
        .unwrap()
        .put_values(&u10, ..)
        .unwrap();
}

fn prepare(root: &Path) -> Core {
    let config = Config::new_in_dir(root);

    fs::create_dir_all(&config.paths.archive_dir).unwrap();
    write_mock_archive(&config.archive_path("2025012400"));
    fs::write(&config.paths.stations, STATIONS).unwrap();

    Core::from_config(config).unwrap()
}

fn query() -> QueryArgs {
    QueryArgs {
        lat: 35.52,
        lon: 130.06,
        date: "2025020300".to_string(),
    }
}

fn csv_files(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = fs::read_dir(dir)
        .unwrap()
        .map(|entry| entry.unwrap().file_name().to_string_lossy().to_string())
        .collect();
    names.sort();
    names
}

#[test]
fn incident_end_to_end() {
    let dir = tempfile::tempdir().unwrap();
    let core = prepare(dir.path());

    store_query(&core.config, &query()).unwrap();

    let cropped = crop_stage(&core).unwrap();
    assert_eq!(cropped.processed, 1);
    assert_eq!(cropped.missing, 20);
    assert_eq!(cropped.failed, 0);
    // lat 34.0..36.5 and lon 128.5..131.0
    assert_eq!(cropped.items, 36);
    assert!(core.config.crop_path("2025012400").is_file());

    let extracted = extract_stage(&core).unwrap();
    assert_eq!(extracted.processed, 1);
    assert_eq!(extracted.missing, 20);
    assert_eq!(extracted.items, 36);

    let record: serde_json::Value =
        serde_json::from_slice(&fs::read(&core.config.paths.record).unwrap()).unwrap();
    assert_eq!(record["station_num"], "22106");
    assert_eq!(record["station_name"], "Pohang");
    assert_eq!(record["target_date"], "2025020300");

    let names = csv_files(&core.config.paths.series_dir);
    assert_eq!(names.len(), 36);
    assert_eq!(names[0], "22106_34.00_128.50_2025012400.csv");
    assert!(names.iter().all(|name| name.ends_with("_2025012400.csv")));

    // lat 35.5 is index 11 and lon 130.0 index 10 of the archive
    let table = fs::read(core.config.paths.series_dir.join("22106_35.50_130.00_2025012400.csv"))
        .unwrap();
    let text = String::from_utf8(table).unwrap();
    let lines: Vec<&str> = text.trim_start_matches('\u{feff}').lines().collect();

    assert_eq!(lines[0], "TIME,u10,STN_NO,LAT,LON,LAT_I,LON_J");
    assert_eq!(lines[1], "2025-01-24 00:00:00,1110,22106,35.5,130,3,3");
    assert_eq!(lines[2], "2025-01-24 06:00:00,1110,22106,35.5,130,3,3");
    assert_eq!(lines.len(), 3);
}

#[test]
fn stages_are_repeatable() {
    let dir = tempfile::tempdir().unwrap();
    let core = prepare(dir.path());
    store_query(&core.config, &query()).unwrap();

    let table = core
        .config
        .paths
        .series_dir
        .join("22106_35.50_130.00_2025012400.csv");

    crop_stage(&core).unwrap();
    let first = fs::read(core.config.crop_path("2025012400")).unwrap();
    extract_stage(&core).unwrap();
    let first_tables = csv_files(&core.config.paths.series_dir);
    let first_table = fs::read(&table).unwrap();

    crop_stage(&core).unwrap();
    let second = fs::read(core.config.crop_path("2025012400")).unwrap();
    extract_stage(&core).unwrap();

    // outputs are bit-identical between runs
    assert!(first == second);
    assert_eq!(first_table, fs::read(&table).unwrap());
    assert_eq!(first_tables, csv_files(&core.config.paths.series_dir));
}

#[test]
fn target_off_the_grid_is_skipped() {
    let dir = tempfile::tempdir().unwrap();
    let core = prepare(dir.path());

    let args = QueryArgs {
        lat: 20.0,
        lon: 130.06,
        date: "2025020300".to_string(),
    };
    store_query(&core.config, &args).unwrap();

    let cropped = crop_stage(&core).unwrap();

    assert_eq!(cropped.processed, 0);
    assert_eq!(cropped.skipped, 1);
    assert_eq!(cropped.failed, 0);
    assert_eq!(cropped.missing, 20);
    assert!(!core.config.crop_path("2025012400").exists());

    let extracted = extract_stage(&core).unwrap();

    assert_eq!(extracted.processed, 0);
    assert_eq!(extracted.missing, 21);
}

#[test]
fn broken_cycle_does_not_stop_the_stage() {
    let dir = tempfile::tempdir().unwrap();
    let core = prepare(dir.path());
    store_query(&core.config, &query()).unwrap();

    fs::write(core.config.archive_path("2025012412"), b"not a netcdf file").unwrap();

    let cropped = crop_stage(&core).unwrap();

    assert_eq!(cropped.processed, 1);
    assert_eq!(cropped.failed, 1);
    assert_eq!(cropped.missing, 19);
    assert!(!core.config.crop_path("2025012412").exists());
    // no temporary leftovers in the output directory
    assert_eq!(csv_files(&core.config.paths.crop_dir), vec!["cropped_2025012400.nc"]);
}

#[test]
fn missing_record_is_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let core = prepare(dir.path());

    assert!(matches!(
        crop_stage(&core),
        Err(PipelineError::Record(RecordError::NotFound(_)))
    ));
    assert!(matches!(
        extract_stage(&core),
        Err(PipelineError::Record(RecordError::NotFound(_)))
    ));
}

#[test]
fn missing_station_table_is_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let core = prepare(dir.path());
    store_query(&core.config, &query()).unwrap();
    fs::remove_file(&core.config.paths.stations).unwrap();

    assert!(matches!(
        extract_stage(&core),
        Err(PipelineError::Station(StationError::NotFound(_)))
    ));
}
