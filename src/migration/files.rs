//! Migration files on disk: `<version>_<table>.up.sql` and `<version>_<table>.down.sql`.

use super::{Migration, MigrationError};
use chrono::{DateTime, Datelike, Timelike, Utc};
use regex::Regex;
use std::fs;
use std::path::{Path, PathBuf};

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> MigrationError + '_ {
    move |source| MigrationError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// `YYYYMMDDHHMMSS` as a number.
fn timestamp_version(now: DateTime<Utc>) -> i64 {
    i64::from(now.year()) * 10_000_000_000
        + i64::from(now.month()) * 100_000_000
        + i64::from(now.day()) * 1_000_000
        + i64::from(now.hour()) * 10_000
        + i64::from(now.minute()) * 100
        + i64::from(now.second())
}

/// Versions of the migration files already in `dir`. A missing directory has none.
pub fn existing_versions(dir: &Path) -> Result<Vec<i64>, MigrationError> {
    if !dir.exists() {
        return Ok(Vec::new());
    }
    let re = Regex::new(r"^(\d+)_.*\.sql$").map_err(|e| MigrationError::Io {
        path: dir.to_path_buf(),
        source: std::io::Error::new(std::io::ErrorKind::Other, e),
    })?;
    let mut versions = Vec::new();
    for entry in fs::read_dir(dir).map_err(io_error(dir))? {
        let entry = entry.map_err(io_error(dir))?;
        let name = entry.file_name();
        let Some(name) = name.to_str() else { continue };
        if let Some(version) = re
            .captures(name)
            .and_then(|caps| caps.get(1))
            .and_then(|m| m.as_str().parse::<i64>().ok())
        {
            versions.push(version);
        }
    }
    versions.sort_unstable();
    Ok(versions)
}

/// Timestamp of `now`, bumped past every version already in `dir`.
pub fn next_version(dir: &Path, now: DateTime<Utc>) -> Result<i64, MigrationError> {
    let stamp = timestamp_version(now);
    Ok(match existing_versions(dir)?.last() {
        Some(&highest) if highest >= stamp => highest + 1,
        _ => stamp,
    })
}

/// Write the up/down pair under `version` and return both paths. Creates `dir` if needed.
pub fn write_migration(
    dir: &Path,
    table: &str,
    migration: &Migration,
    version: i64,
) -> Result<(PathBuf, PathBuf), MigrationError> {
    fs::create_dir_all(dir).map_err(io_error(dir))?;
    let up = dir.join(format!("{}_{}.up.sql", version, table));
    let down = dir.join(format!("{}_{}.down.sql", version, table));
    fs::write(&up, &migration.up).map_err(io_error(&up))?;
    fs::write(&down, &migration.down).map_err(io_error(&down))?;
    Ok((up, down))
}
