//! On-disk fixture format
//!
//! A fixture is a pretty-printed UTF-8 JSON document:
//!
//! ```json
//! {
//!   "request": { "method": "GET", "href": "https://api.example.com/widgets", "headers": {}, "body": "" },
//!   "response": { "statusCode": 200, "headers": {}, "body": { "widgets": [] } }
//! }
//! ```
//!
//! Bodies that are not plain text carry a `bodyEncoding` sibling (see
//! [`BodyEncoding`]).

use std::collections::BTreeMap;

use hyper::header::{HeaderMap, HeaderName, HeaderValue};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::body::BodyEncoding;
use crate::{RecorderError, Result};

/// A header value, single or repeated (e.g. `set-cookie`)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum HeaderField {
    /// Single value
    One(String),
    /// Repeated header, in received order
    Many(Vec<String>),
}

impl HeaderField {
    /// First value
    #[must_use]
    pub fn first(&self) -> Option<&str> {
        match self {
            Self::One(value) => Some(value),
            Self::Many(values) => values.first().map(String::as_str),
        }
    }

    /// All values in order
    pub fn values(&self) -> impl Iterator<Item = &str> {
        let values: &[String] = match self {
            Self::One(value) => std::slice::from_ref(value),
            Self::Many(values) => values,
        };
        values.iter().map(String::as_str)
    }

    fn push(&mut self, value: String) {
        match self {
            Self::One(existing) => {
                let first = std::mem::take(existing);
                *self = Self::Many(vec![first, value]);
            }
            Self::Many(values) => values.push(value),
        }
    }
}

impl From<String> for HeaderField {
    fn from(value: String) -> Self {
        Self::One(value)
    }
}

impl From<&str> for HeaderField {
    fn from(value: &str) -> Self {
        Self::One(value.to_string())
    }
}

/// Header map with case-insensitive names and sorted, stable iteration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(
    from = "BTreeMap<String, HeaderField>",
    into = "BTreeMap<String, HeaderField>"
)]
pub struct Headers(BTreeMap<String, HeaderField>);

impl Headers {
    /// Empty header map
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up a header
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&HeaderField> {
        self.0.get(&name.to_ascii_lowercase())
    }

    /// First value of a header
    #[must_use]
    pub fn get_str(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(HeaderField::first)
    }

    /// Whether a header is present
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Set a header, replacing any previous value
    pub fn insert(&mut self, name: &str, value: impl Into<HeaderField>) {
        self.0.insert(name.to_ascii_lowercase(), value.into());
    }

    /// Add a value, turning an existing header into a repeated one
    pub fn append(&mut self, name: &str, value: impl Into<String>) {
        let value = value.into();
        match self.0.get_mut(&name.to_ascii_lowercase()) {
            Some(field) => field.push(value),
            None => self.insert(name, value),
        }
    }

    /// Remove a header
    pub fn remove(&mut self, name: &str) -> Option<HeaderField> {
        self.0.remove(&name.to_ascii_lowercase())
    }

    /// Iterate headers by lowercase name
    pub fn iter(&self) -> impl Iterator<Item = (&str, &HeaderField)> {
        self.0.iter().map(|(name, field)| (name.as_str(), field))
    }

    /// Number of distinct header names
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether there are no headers
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Convert from a hyper header map
    ///
    /// Fixtures are UTF-8 JSON, so a value carrying non-UTF-8 obs-text bytes
    /// is stored with those bytes replaced by U+FFFD and replays that way.
    #[must_use]
    pub fn from_header_map(map: &HeaderMap) -> Self {
        let mut headers = Self::new();
        for (name, value) in map {
            headers.append(
                name.as_str(),
                String::from_utf8_lossy(value.as_bytes()).into_owned(),
            );
        }
        headers
    }

    /// Convert into a hyper header map
    ///
    /// # Errors
    ///
    /// Returns error if a name or value is not a valid HTTP header
    pub fn to_header_map(&self) -> Result<HeaderMap> {
        let mut map = HeaderMap::with_capacity(self.len());
        for (name, field) in self.iter() {
            let header_name = HeaderName::from_bytes(name.as_bytes()).map_err(|e| {
                RecorderError::InvalidRequest(format!("Invalid header name {name:?}: {e}"))
            })?;
            for value in field.values() {
                let header_value = HeaderValue::from_str(value).map_err(|e| {
                    RecorderError::InvalidRequest(format!("Invalid value for header {name}: {e}"))
                })?;
                map.append(header_name.clone(), header_value);
            }
        }
        Ok(map)
    }
}

impl From<BTreeMap<String, HeaderField>> for Headers {
    fn from(map: BTreeMap<String, HeaderField>) -> Self {
        Self(
            map.into_iter()
                .map(|(name, field)| (name.to_ascii_lowercase(), field))
                .collect(),
        )
    }
}

impl From<Headers> for BTreeMap<String, HeaderField> {
    fn from(headers: Headers) -> Self {
        headers.0
    }
}

/// Normalized request as stored and hashed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestRecord {
    /// HTTP method
    pub method: String,
    /// Absolute URL
    pub href: String,
    /// Request headers (without `host`)
    pub headers: Headers,
    /// Encoded body
    #[serde(default)]
    pub body: Value,
    /// How `body` is encoded, absent for text and JSON
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body_encoding: Option<BodyEncoding>,
}

/// Stored response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseRecord {
    /// HTTP status code
    pub status_code: u16,
    /// Response headers
    pub headers: Headers,
    /// Encoded body
    #[serde(default)]
    pub body: Value,
    /// How `body` is encoded, absent for text and JSON
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body_encoding: Option<BodyEncoding>,
}

/// A persisted request/response pair
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fixture {
    /// Normalized request
    pub request: RequestRecord,
    /// Response to replay
    pub response: ResponseRecord,
}
