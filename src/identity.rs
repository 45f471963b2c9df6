//! Identity resolution for otherwise-identical requests
//!
//! A user callback inspects each normalized request (and its response, when
//! known) and either registers a `token -> identity` association or names a
//! token to look up. The resolved identity becomes the fixture filename
//! suffix, so per-user traffic is recorded separately.

use std::fmt;
use std::sync::Arc;

use dashmap::DashMap;
use tracing::debug;

use crate::fingerprint::fnv1a_32;
use crate::normalize::NormalizedRequest;
use crate::storage::ResponseRecord;
use crate::{RecorderError, Result};

/// Result of an identify callback
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Identification {
    /// No identity influence
    None,
    /// Look up the identity previously registered for this token
    Token(String),
    /// `token` henceforth resolves to `identity`
    Register {
        /// Logical actor, e.g. a username
        identity: String,
        /// Correlation token, e.g. an access token
        token: String,
    },
}

/// User-supplied identity callback
pub trait Identify: Send + Sync {
    /// Identify a request
    fn identify(&self, request: &NormalizedRequest, response: Option<&ResponseRecord>)
        -> Identification;
}

impl<F> Identify for F
where
    F: Fn(&NormalizedRequest, Option<&ResponseRecord>) -> Identification + Send + Sync,
{
    fn identify(
        &self,
        request: &NormalizedRequest,
        response: Option<&ResponseRecord>,
    ) -> Identification {
        self(request, response)
    }
}

/// In-memory `token -> identity` map, append-only for the recorder's lifetime
#[derive(Debug, Default)]
pub struct IdentityMap {
    identities: DashMap<String, String>,
}

impl IdentityMap {
    /// Create an empty map
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Associate a token with an identity
    pub fn register(&self, token: &str, identity: &str) {
        self.identities.insert(token.to_string(), identity.to_string());
    }

    /// Identity registered for a token
    #[must_use]
    pub fn get(&self, token: &str) -> Option<String> {
        self.identities.get(token).map(|entry| entry.value().clone())
    }

    /// Number of known tokens
    #[must_use]
    pub fn len(&self) -> usize {
        self.identities.len()
    }

    /// Whether no token is known yet
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.identities.is_empty()
    }
}

/// Resolves fixture identities through the configured callback
#[derive(Default)]
pub struct IdentityResolver {
    identify: Option<Arc<dyn Identify>>,
    identities: IdentityMap,
}

impl fmt::Debug for IdentityResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IdentityResolver")
            .field("identify", &self.identify.is_some())
            .field("identities", &self.identities.len())
            .finish()
    }
}

impl IdentityResolver {
    /// Create a resolver; without a callback every request is anonymous
    #[must_use]
    pub fn new(identify: Option<Arc<dyn Identify>>) -> Self {
        Self {
            identify,
            identities: IdentityMap::new(),
        }
    }

    /// Known identities
    #[must_use]
    pub fn identities(&self) -> &IdentityMap {
        &self.identities
    }

    /// Resolve the identity of a request, registering new tokens on the way
    ///
    /// Unknown tokens resolve to the token itself. The returned identity is
    /// already safe to use in a filename.
    ///
    /// # Errors
    ///
    /// Returns error if the callback registers an empty token
    pub fn resolve(
        &self,
        request: &NormalizedRequest,
        response: Option<&ResponseRecord>,
    ) -> Result<Option<String>> {
        let Some(identify) = &self.identify else {
            return Ok(None);
        };

        let identity = match identify.identify(request, response) {
            Identification::None => return Ok(None),
            Identification::Register { identity, token } => {
                if token.is_empty() {
                    return Err(RecorderError::InvalidIdentity(format!(
                        "identify() registered identity {identity:?} with an empty token"
                    )));
                }
                debug!("Registered identity {identity} for {} {}", request.method, request.href());
                self.identities.register(&token, &identity);
                identity
            }
            Identification::Token(token) => self.identities.get(&token).unwrap_or(token),
        };

        if identity.is_empty() {
            return Ok(None);
        }

        Ok(Some(filename_safe(&identity)))
    }
}

/// Longest identity suffix kept verbatim, in bytes
pub const MAX_IDENTITY_LEN: usize = 64;

/// Make an identity usable as a filename suffix
///
/// Identities longer than [`MAX_IDENTITY_LEN`] (e.g. raw bearer tokens) keep
/// a short prefix followed by the FNV-1a hash of the whole identity.
fn filename_safe(identity: &str) -> String {
    let mut safe: String = identity
        .chars()
        .map(|c| match c {
            '/' | '\\' | '\0' | ':' => '_',
            c => c,
        })
        .collect();

    if safe.starts_with('.') {
        safe.replace_range(..1, "_");
    }

    if safe.len() > MAX_IDENTITY_LEN {
        let mut cut = MAX_IDENTITY_LEN / 2;
        while !safe.is_char_boundary(cut) {
            cut -= 1;
        }
        let hash = fnv1a_32(identity.as_bytes());
        safe.truncate(cut);
        safe.push_str(&format!("-{hash:08x}"));
    }

    safe
}
