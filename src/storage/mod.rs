//! Content-addressed fixture storage
//!
//! Fixtures live at `<root>/<hostname>/<pathname>/<hash>[-<identity>].json`.

mod format;
mod reader;
mod writer;

use std::path::{Path, PathBuf};

pub use format::{Fixture, HeaderField, Headers, RequestRecord, ResponseRecord};
pub use reader::{list_fixtures, read_fixture};
pub use writer::write_fixture;

use crate::fingerprint::fixture_filename;
use crate::normalize::RequestUrl;
use crate::{RecorderError, Result};

/// Fixture file extension
pub const FIXTURE_EXTENSION: &str = "json";

/// Fixture store rooted at a directory
#[derive(Debug, Clone)]
pub struct FixtureStore {
    root: PathBuf,
}

impl FixtureStore {
    /// Create a store; the directory is created lazily on first write
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Root directory
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Address of the fixture for a normalized request
    ///
    /// # Errors
    ///
    /// Returns error if the href has no hostname or pathname
    pub fn path_for(&self, request: &RequestRecord, identity: Option<&str>) -> Result<PathBuf> {
        let url = RequestUrl::parse(&request.href)?;

        if url.host.is_empty() {
            return Err(RecorderError::InvalidHref {
                href: request.href.clone(),
                reason: "cannot parse hostname".to_string(),
            });
        }

        if url.path.is_empty() {
            return Err(RecorderError::InvalidHref {
                href: request.href.clone(),
                reason: "cannot parse pathname".to_string(),
            });
        }

        let mut path = self.root.join(url.host.trim_matches(|c| c == '[' || c == ']'));
        for segment in url.path.split('/') {
            match segment {
                "" | "." | ".." => {}
                segment => path.push(segment),
            }
        }

        let filename = fixture_filename(request, identity)?;
        path.push(format!("{filename}.{FIXTURE_EXTENSION}"));

        Ok(path)
    }

    /// Whether a fixture exists at `path`
    #[must_use]
    pub fn exists(&self, path: &Path) -> bool {
        path.is_file()
    }

    /// Read the fixture stored at `path`
    ///
    /// # Errors
    ///
    /// Returns [`RecorderError::MissingFixture`] if absent, or a parse error
    pub fn read(&self, path: &Path, request: &RequestRecord) -> Result<Fixture> {
        if !self.exists(path) {
            return Err(RecorderError::MissingFixture {
                method: request.method.clone(),
                href: request.href.clone(),
                path: self.display_path(path),
            });
        }

        read_fixture(path)
    }

    /// Write a fixture, replacing any existing one at `path`
    ///
    /// # Errors
    ///
    /// Returns error if the directory or file cannot be written
    pub fn write(&self, path: &Path, fixture: &Fixture) -> Result<()> {
        write_fixture(path, fixture)
    }

    /// Every fixture file under the root
    ///
    /// # Errors
    ///
    /// Returns error if a directory cannot be read
    pub fn list(&self) -> Result<Vec<PathBuf>> {
        if !self.root.exists() {
            return Ok(Vec::new());
        }
        list_fixtures(&self.root)
    }

    /// Path relative to the working directory when possible
    fn display_path(&self, path: &Path) -> PathBuf {
        std::env::current_dir()
            .ok()
            .and_then(|cwd| path.strip_prefix(cwd).ok().map(|rel| Path::new(".").join(rel)))
            .unwrap_or_else(|| path.to_path_buf())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn request(href: &str) -> RequestRecord {
        RequestRecord {
            method: "GET".to_string(),
            href: href.to_string(),
            headers: Headers::new(),
            body: json!(""),
            body_encoding: None,
        }
    }

    fn fixture(href: &str, body: serde_json::Value) -> Fixture {
        Fixture {
            request: request(href),
            response: ResponseRecord {
                status_code: 200,
                headers: Headers::new(),
                body,
                body_encoding: None,
            },
        }
    }

    #[test]
    fn test_path_layout() {
        let store = FixtureStore::new("/tmp/fx");
        let req = request("https://api.example.com/widgets");
        let hash = crate::fingerprint::fingerprint_request(&req).unwrap();

        assert_eq!(
            store.path_for(&req, None).unwrap(),
            PathBuf::from(format!("/tmp/fx/api.example.com/widgets/{hash}.json"))
        );
        assert_eq!(
            store.path_for(&req, Some("alice")).unwrap(),
            PathBuf::from(format!("/tmp/fx/api.example.com/widgets/{hash}-alice.json"))
        );
    }

    #[test]
    fn test_path_cannot_escape_root() {
        let store = FixtureStore::new("/tmp/fx");
        let path = store
            .path_for(&request("https://evil.test/a/../../../etc"), None)
            .unwrap();

        assert!(path.starts_with("/tmp/fx/evil.test"));
        assert!(!path.components().any(|c| c == std::path::Component::ParentDir));
    }

    #[test]
    fn test_write_then_read() {
        let dir = TempDir::new().unwrap();
        let store = FixtureStore::new(dir.path());
        let fx = fixture("https://api.example.com/widgets/1", json!({ "id": 1 }));

        let path = store.path_for(&fx.request, None).unwrap();
        assert!(!store.exists(&path));

        store.write(&path, &fx).unwrap();
        assert!(store.exists(&path));
        assert_eq!(store.read(&path, &fx.request).unwrap(), fx);
        assert_eq!(store.list().unwrap(), vec![path]);
    }

    #[test]
    fn test_overwrite_replaces_whole_fixture() {
        let dir = TempDir::new().unwrap();
        let store = FixtureStore::new(dir.path());
        let first = fixture("https://api.example.com/w", json!({ "a": 1, "b": 2 }));
        let second = fixture("https://api.example.com/w", json!({ "c": 3 }));
        let path = store.path_for(&first.request, None).unwrap();

        store.write(&path, &first).unwrap();
        store.write(&path, &second).unwrap();

        assert_eq!(store.read(&path, &second.request).unwrap(), second);
    }

    #[test]
    fn test_missing_fixture_names_path() {
        let dir = TempDir::new().unwrap();
        let store = FixtureStore::new(dir.path());
        let req = request("https://some.fake.api/");
        let path = store.path_for(&req, None).unwrap();

        let err = store.read(&path, &req).unwrap_err();
        assert!(err.is_missing_fixture());

        let hash = crate::fingerprint::fingerprint_request(&req).unwrap();
        assert!(err.to_string().contains(&format!("{hash}.json")));
        assert!(err.to_string().contains("GET https://some.fake.api/"));
    }

    #[test]
    fn test_list_empty_root() {
        let dir = TempDir::new().unwrap();
        let store = FixtureStore::new(dir.path().join("missing"));
        assert!(store.list().unwrap().is_empty());
    }
}
