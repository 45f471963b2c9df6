//! Request normalization
//!
//! Turns an intercepted request into the canonical shape that is hashed and
//! stored. Normalization is deterministic: the same logical request always
//! produces the same [`RequestRecord`].

use std::fmt;
use std::sync::Arc;

use hyper::http::uri::Authority;
use hyper::Uri;
use serde_json::Value;
use tracing::error;

use crate::body::{self, BodyEncoding};
use crate::network::CapturedRequest;
use crate::storage::{Headers, RequestRecord, ResponseRecord};
use crate::{RecorderError, Result};

/// Mutable URL components of a request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestUrl {
    /// `http` or `https`
    pub scheme: String,
    /// Hostname, without port
    pub host: String,
    /// Explicit non-default port
    pub port: Option<u16>,
    /// Path, always starting with `/`
    pub path: String,
    /// Decoded query pairs in original order
    pub query: Vec<(String, Option<String>)>,
}

impl RequestUrl {
    /// Parse an absolute href
    ///
    /// # Errors
    ///
    /// Returns error if the href has no hostname or cannot be parsed
    pub fn parse(href: &str) -> Result<Self> {
        let uri: Uri = href.parse().map_err(|e| RecorderError::InvalidHref {
            href: href.to_string(),
            reason: format!("{e}"),
        })?;
        Self::from_parts(&uri, None)
    }

    /// Resolve the full URL of a request from its URI and `Host` header
    ///
    /// Absolute-form URIs are used as-is; origin-form URIs take their
    /// authority from `Host`. Scheme defaults to `http`, host to `localhost`.
    ///
    /// # Errors
    ///
    /// Returns error if the host cannot be parsed
    pub fn from_parts(uri: &Uri, host_header: Option<&str>) -> Result<Self> {
        let scheme = uri.scheme_str().unwrap_or("http").to_ascii_lowercase();

        let authority = match uri.authority() {
            Some(authority) => Some(authority.clone()),
            None => host_header
                .map(str::trim)
                .filter(|host| !host.is_empty())
                .map(|host| {
                    host.parse::<Authority>().map_err(|e| RecorderError::InvalidHref {
                        href: uri.to_string(),
                        reason: format!("invalid host {host:?}: {e}"),
                    })
                })
                .transpose()?,
        };

        let (host, port) = match &authority {
            Some(authority) => (authority.host().to_ascii_lowercase(), authority.port_u16()),
            None => ("localhost".to_string(), None),
        };

        if host.is_empty() {
            return Err(RecorderError::InvalidHref {
                href: uri.to_string(),
                reason: "missing hostname".to_string(),
            });
        }

        let path = match uri.path() {
            "" => "/".to_string(),
            path if path.starts_with('/') => path.to_string(),
            path => format!("/{path}"),
        };

        let mut url = Self {
            scheme,
            host,
            port: None,
            path,
            query: uri.query().map(parse_query).unwrap_or_default(),
        };
        url.set_port(port);
        Ok(url)
    }

    /// Set the port, dropping it when it is the scheme's default
    pub fn set_port(&mut self, port: Option<u16>) {
        self.port = port.filter(|&port| Some(port) != default_port(&self.scheme));
    }

    /// First value of a query parameter
    #[must_use]
    pub fn query_value(&self, key: &str) -> Option<&str> {
        self.query
            .iter()
            .find(|(k, _)| k == key)
            .and_then(|(_, v)| v.as_deref())
    }

    /// Replace the first value of a query parameter, appending it if absent
    pub fn set_query(&mut self, key: &str, value: impl Into<String>) {
        let value = Some(value.into());
        match self.query.iter_mut().find(|(k, _)| k == key) {
            Some(pair) => pair.1 = value,
            None => self.query.push((key.to_string(), value)),
        }
    }

    /// Remove every value of a query parameter
    pub fn remove_query(&mut self, key: &str) {
        self.query.retain(|(k, _)| k != key);
    }

    /// `scheme://host[:port]`
    #[must_use]
    pub fn origin(&self) -> String {
        match self.port {
            Some(port) => format!("{}://{}:{port}", self.scheme, self.host),
            None => format!("{}://{}", self.scheme, self.host),
        }
    }

    /// Serialize back into an absolute href
    #[must_use]
    pub fn to_href(&self) -> String {
        let mut href = self.origin();
        href.push_str(&self.path);

        if !self.query.is_empty() {
            href.push('?');
            for (i, (key, value)) in self.query.iter().enumerate() {
                if i > 0 {
                    href.push('&');
                }
                href.push_str(&urlencoding::encode(key));
                if let Some(value) = value {
                    href.push('=');
                    href.push_str(&urlencoding::encode(value));
                }
            }
        }

        href
    }
}

impl fmt::Display for RequestUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_href())
    }
}

fn default_port(scheme: &str) -> Option<u16> {
    match scheme {
        "http" => Some(80),
        "https" => Some(443),
        _ => None,
    }
}

fn parse_query(query: &str) -> Vec<(String, Option<String>)> {
    query
        .split('&')
        .filter(|pair| !pair.is_empty())
        .map(|pair| match pair.split_once('=') {
            Some((key, value)) => (decode_component(key), Some(decode_component(value))),
            None => (decode_component(pair), None),
        })
        .collect()
}

fn decode_component(component: &str) -> String {
    let spaced = component.replace('+', " ");
    urlencoding::decode(&spaced)
        .map(std::borrow::Cow::into_owned)
        .unwrap_or(spaced)
}

/// A request in normalized form, as seen by user callbacks
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedRequest {
    /// HTTP method
    pub method: String,
    /// URL components; re-serialized into `href` after normalizers run
    pub url: RequestUrl,
    /// Headers without `host`
    pub headers: Headers,
    /// Encoded body
    pub body: Value,
    /// Body encoding marker
    pub body_encoding: Option<BodyEncoding>,
}

impl NormalizedRequest {
    /// Current href
    #[must_use]
    pub fn href(&self) -> String {
        self.url.to_href()
    }

    /// Rebuild from a stored record
    ///
    /// # Errors
    ///
    /// Returns error if the record's href cannot be parsed
    pub fn from_record(record: &RequestRecord) -> Result<Self> {
        Ok(Self {
            method: record.method.clone(),
            url: RequestUrl::parse(&record.href)?,
            headers: record.headers.clone(),
            body: record.body.clone(),
            body_encoding: record.body_encoding,
        })
    }

    /// Freeze into the stored record
    #[must_use]
    pub fn into_record(self) -> RequestRecord {
        RequestRecord {
            href: self.url.to_href(),
            method: self.method,
            headers: self.headers,
            body: self.body,
            body_encoding: self.body_encoding,
        }
    }
}

/// User-supplied normalization step
///
/// May mutate the request (and the response, when present) in place, e.g.
/// to replace a rotating token with a stable placeholder.
pub trait Normalize: Send + Sync {
    /// Normalize in place
    fn normalize(&self, request: &mut NormalizedRequest, response: Option<&mut ResponseRecord>);
}

impl<F> Normalize for F
where
    F: Fn(&mut NormalizedRequest, Option<&mut ResponseRecord>) + Send + Sync,
{
    fn normalize(&self, request: &mut NormalizedRequest, response: Option<&mut ResponseRecord>) {
        self(request, response);
    }
}

/// Canonicalizes intercepted requests
#[derive(Clone, Default)]
pub struct Normalizer {
    ephemeral_port_agents: Vec<String>,
    normalizers: Vec<Arc<dyn Normalize>>,
}

impl fmt::Debug for Normalizer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Normalizer")
            .field("ephemeral_port_agents", &self.ephemeral_port_agents)
            .field("normalizers", &self.normalizers.len())
            .finish()
    }
}

impl Normalizer {
    /// Create a normalizer
    #[must_use]
    pub fn new(ephemeral_port_agents: Vec<String>, normalizers: Vec<Arc<dyn Normalize>>) -> Self {
        Self {
            ephemeral_port_agents,
            normalizers,
        }
    }

    /// Resolve the full URL of a captured request
    ///
    /// # Errors
    ///
    /// Returns error if no hostname can be resolved
    pub fn resolve_url(captured: &CapturedRequest) -> Result<RequestUrl> {
        let host = captured
            .headers
            .get(hyper::header::HOST)
            .and_then(|value| value.to_str().ok());

        RequestUrl::from_parts(&captured.uri, host).map_err(|e| {
            error!(
                method = %captured.method,
                uri = %captured.uri,
                "Cannot resolve request URL: {e}"
            );
            e
        })
    }

    /// Normalize a captured request, optionally alongside its response
    ///
    /// # Errors
    ///
    /// Returns error if the request URL cannot be resolved
    pub fn normalize(
        &self,
        captured: &CapturedRequest,
        mut response: Option<&mut ResponseRecord>,
    ) -> Result<NormalizedRequest> {
        let mut url = Self::resolve_url(captured)?;

        let mut headers = Headers::from_header_map(&captured.headers);
        headers.remove("host");

        if self.has_ephemeral_port(&headers) {
            url.port = None;
        }

        let encoded = body::encode(&headers, &captured.chunks);
        let mut request = NormalizedRequest {
            method: captured.method.as_str().to_ascii_uppercase(),
            url,
            headers,
            body: encoded.value,
            body_encoding: encoded.encoding,
        };

        for normalizer in &self.normalizers {
            normalizer.normalize(&mut request, response.as_deref_mut());
        }

        Ok(request)
    }

    fn has_ephemeral_port(&self, headers: &Headers) -> bool {
        headers.get("user-agent").is_some_and(|field| {
            field.values().any(|agent| {
                self.ephemeral_port_agents
                    .iter()
                    .any(|marker| agent.contains(marker.as_str()))
            })
        })
    }
}
