//! Persisted intermediate artifacts
//!
//! Expensive stage outputs are stored as JSON under the cache directory and
//! reused on later runs until they are explicitly invalidated. Writes go to a
//! temporary file in the destination directory that is then renamed into
//! place, so an interrupted run never leaves a truncated artifact behind.

use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use log::{debug, info};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tempfile::NamedTempFile;

use crate::config::Config;
use crate::error::Result;

pub const ANNOTATION: &str = "annotation.json";
pub const EXPRESSION: &str = "expression.json";
pub const PERMUTED_SCORES: &str = "permuted_scores.json";

const ARTIFACTS: [&str; 3] = [ANNOTATION, EXPRESSION, PERMUTED_SCORES];

/// Serialize `value` to `path` atomically
pub fn write_atomic<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let parent = path
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));
    fs::create_dir_all(&parent)?;

    let tmp = NamedTempFile::new_in(&parent)?;
    {
        let mut writer = BufWriter::new(tmp.as_file());
        serde_json::to_writer(&mut writer, value)?;
        writer.flush()?;
    }
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

/// Read a cached artifact; `None` when it does not exist
pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    if !path.exists() {
        return Ok(None);
    }
    let reader = BufReader::new(File::open(path)?);
    Ok(Some(serde_json::from_reader(reader)?))
}

/// Reuse the artifact at `path`, or compute and persist it
///
/// With `force` any stored artifact is ignored and overwritten.
pub fn load_or_compute<T, F>(path: &Path, force: bool, compute: F) -> Result<T>
where
    T: Serialize + DeserializeOwned,
    F: FnOnce() -> Result<T>,
{
    if !force {
        if let Some(value) = read_json(path)? {
            info!("Reusing cached {}", path.display());
            return Ok(value);
        }
    }
    let value = compute()?;
    write_atomic(path, &value)?;
    debug!("Cached {}", path.display());
    Ok(value)
}

/// Remove every cached artifact of the configured run; returns the removed paths
pub fn invalidate(config: &Config) -> Result<Vec<PathBuf>> {
    let mut removed = Vec::new();
    for name in ARTIFACTS {
        let path = config.cache_path(name);
        if path.exists() {
            fs::remove_file(&path)?;
            info!("Removed {}", path.display());
            removed.push(path);
        }
    }
    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use tempfile::tempdir;

    #[test]
    fn test_write_and_read_back() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("values.json");
        write_atomic(&path, &vec![1.0, 2.5]).unwrap();
        let values: Option<Vec<f64>> = read_json(&path).unwrap();
        assert_eq!(values, Some(vec![1.0, 2.5]));
        // Only the artifact itself remains in the directory
        assert_eq!(fs::read_dir(path.parent().unwrap()).unwrap().count(), 1);
    }

    #[test]
    fn test_missing_artifact() {
        let dir = tempdir().unwrap();
        let values: Option<Vec<f64>> = read_json(&dir.path().join("none.json")).unwrap();
        assert!(values.is_none());
    }

    #[test]
    fn test_load_or_compute_reuses_artifact() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("scores.json");
        let calls = Cell::new(0);
        let compute = || {
            calls.set(calls.get() + 1);
            Ok(vec![calls.get() as f64])
        };

        let first: Vec<f64> = load_or_compute(&path, false, compute).unwrap();
        let second: Vec<f64> = load_or_compute(&path, false, compute).unwrap();
        assert_eq!(first, second);
        assert_eq!(calls.get(), 1);

        let forced: Vec<f64> = load_or_compute(&path, true, compute).unwrap();
        assert_eq!(forced, vec![2.0]);
    }
}
