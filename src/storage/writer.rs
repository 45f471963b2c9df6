//! Fixture file writer

use std::fs;
use std::io::Write;
use std::path::Path;

use tempfile::NamedTempFile;

use super::format::Fixture;
use crate::{RecorderError, Result};

/// Write a fixture atomically, creating parent directories
///
/// The JSON is written to a temporary file next to `path` and renamed over
/// it, so readers never observe a partial fixture. Concurrent writers to the
/// same path are last-write-wins.
///
/// # Errors
///
/// Returns error if the directory, temp file or rename fails
pub fn write_fixture(path: &Path, fixture: &Fixture) -> Result<()> {
    let dir = path.parent().ok_or_else(|| {
        RecorderError::Other(format!("Fixture path has no parent: {}", path.display()))
    })?;
    fs::create_dir_all(dir)?;

    let mut serialized = serde_json::to_string_pretty(fixture)?;
    serialized.push('\n');

    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(serialized.as_bytes())?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| RecorderError::Io(e.error))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{Headers, RequestRecord, ResponseRecord};
    use serde_json::json;
    use tempfile::TempDir;

    fn fixture() -> Fixture {
        Fixture {
            request: RequestRecord {
                method: "POST".to_string(),
                href: "http://localhost/items".to_string(),
                headers: Headers::new(),
                body: json!({ "name": "x" }),
                body_encoding: None,
            },
            response: ResponseRecord {
                status_code: 201,
                headers: Headers::new(),
                body: json!(""),
                body_encoding: None,
            },
        }
    }

    #[test]
    fn test_creates_intermediate_directories() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("localhost/items/123.json");

        write_fixture(&path, &fixture()).unwrap();
        assert!(path.is_file());
    }

    #[test]
    fn test_pretty_printed_and_leaves_no_temp_files() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("123.json");

        write_fixture(&path, &fixture()).unwrap();
        write_fixture(&path, &fixture()).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        assert!(content.starts_with("{\n  \"request\": {"));
        assert!(content.contains("\"statusCode\": 201"));
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 1);
    }
}
