//! Fixture file reader

use std::fs;
use std::path::{Path, PathBuf};

use super::format::Fixture;
use super::FIXTURE_EXTENSION;
use crate::Result;

/// Parse a fixture file
///
/// # Errors
///
/// Returns error if the file cannot be read or is not a valid fixture
pub fn read_fixture(path: &Path) -> Result<Fixture> {
    let content = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&content)?)
}

/// Recursively collect fixture files under `root`, sorted
///
/// # Errors
///
/// Returns error if a directory cannot be read
pub fn list_fixtures(root: &Path) -> Result<Vec<PathBuf>> {
    let mut fixtures = Vec::new();
    let mut pending = vec![root.to_path_buf()];

    while let Some(dir) = pending.pop() {
        for entry in fs::read_dir(&dir)? {
            let path = entry?.path();

            if path.is_dir() {
                pending.push(path);
            } else if path.extension().and_then(|s| s.to_str()) == Some(FIXTURE_EXTENSION) {
                fixtures.push(path);
            }
        }
    }

    fixtures.sort();
    Ok(fixtures)
}
