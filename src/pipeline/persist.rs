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

//! Module for writing output files atomically.
//!
//! Every output is first written to a hidden temporary file in the
//! destination directory and renamed into place when complete. If writing
//! fails the temporary file is removed, so readers of the output
//! directories never see truncated files.

use std::{io, path::Path};

/// Writes `target` through `write`, which receives the path of
/// a temporary file in the same directory.
pub fn write_atomic<E, F>(target: &Path, write: F) -> Result<(), E>
where
    E: From<io::Error>,
    F: FnOnce(&Path) -> Result<(), E>,
{
    let dir = match target.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    let temp_path = tempfile::Builder::new()
        .prefix(".epes-")
        .suffix(".part")
        .tempfile_in(dir)?
        .into_temp_path();

    write(&temp_path)?;

    // rename within one directory, temp file is dropped on failure
    temp_path.persist(target).map_err(|err| err.error)?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::write_atomic;
    use std::{fs, io};

    #[test]
    fn finished_write_lands_in_place() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("out.txt");

        write_atomic::<io::Error, _>(&target, |path| fs::write(path, "done")).unwrap();

        assert_eq!(fs::read_to_string(&target).unwrap(), "done");
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[test]
    fn failed_write_leaves_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("out.txt");

        let result = write_atomic::<io::Error, _>(&target, |path| {
            fs::write(path, "partial")?;
            Err(io::Error::new(io::ErrorKind::Other, "interrupted"))
        });

        assert!(result.is_err());
        assert!(!target.exists());
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
    }
}
