//! Request fingerprinting for content-addressed fixtures

use crate::storage::RequestRecord;
use crate::Result;

/// FNV-1a 32-bit offset basis
const FNV_OFFSET_BASIS: u32 = 0x811c_9dc5;

/// FNV-1a 32-bit prime
const FNV_PRIME: u32 = 0x0100_0193;

/// FNV-1a 32-bit hash
#[must_use]
pub fn fnv1a_32(data: &[u8]) -> u32 {
    data.iter().fold(FNV_OFFSET_BASIS, |hash, &byte| {
        (hash ^ u32::from(byte)).wrapping_mul(FNV_PRIME)
    })
}

/// Canonical serialization hashed for a request
///
/// # Errors
///
/// Returns error if the record cannot be serialized
pub fn canonical_json(request: &RequestRecord) -> Result<String> {
    Ok(serde_json::to_string(request)?)
}

/// Fingerprint of a normalized request
///
/// # Errors
///
/// Returns error if the record cannot be serialized
pub fn fingerprint_request(request: &RequestRecord) -> Result<u32> {
    Ok(fnv1a_32(canonical_json(request)?.as_bytes()))
}

/// Fixture file stem: `<hash>` or `<hash>-<identity>`
///
/// # Errors
///
/// Returns error if the record cannot be serialized
pub fn fixture_filename(request: &RequestRecord, identity: Option<&str>) -> Result<String> {
    let hash = fingerprint_request(request)?;
    Ok(match identity {
        Some(identity) if !identity.is_empty() => format!("{hash}-{identity}"),
        _ => hash.to_string(),
    })
}
