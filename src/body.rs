//! Lossless body encoding for fixtures
//!
//! Bodies travel as ordered chunk lists. Compressed chunked payloads keep
//! their chunk boundaries (each chunk hex-encoded); everything else is
//! concatenated and stored as text, decoded JSON, or hex when binary.

use bytes::{Bytes, BytesMut};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::storage::Headers;
use crate::{RecorderError, Result};

/// Bytes inspected when sniffing for binary content
const SNIFF_LEN: usize = 512;

/// Marker for bodies that are not stored as plain text or JSON
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BodyEncoding {
    /// One binary buffer as a hex string
    Hex,
    /// Ordered list of hex-encoded chunks
    Chunks,
}

/// Body in its stored form
#[derive(Debug, Clone, PartialEq)]
pub struct EncodedBody {
    /// JSON value written to the fixture
    pub value: Value,
    /// Encoding marker, `None` for text and JSON
    pub encoding: Option<BodyEncoding>,
}

/// Whether headers describe a gzip-compressed, chunked payload
#[must_use]
pub fn is_chunked_gzip(headers: &Headers) -> bool {
    let gzip = headers
        .get("content-encoding")
        .is_some_and(|field| field.values().any(|v| v.trim().eq_ignore_ascii_case("gzip")));
    let chunked = headers.get("transfer-encoding").is_some_and(|field| {
        field
            .values()
            .flat_map(|v| v.split(','))
            .any(|v| v.trim().eq_ignore_ascii_case("chunked"))
    });
    gzip && chunked
}

fn is_json_content_type(headers: &Headers) -> bool {
    headers.get_str("content-type").is_some_and(|ct| {
        let mime = ct.split(';').next().unwrap_or_default().trim();
        mime.eq_ignore_ascii_case("application/json") || mime.ends_with("+json")
    })
}

/// Structural sniff for binary content
#[must_use]
pub fn looks_binary(data: &[u8]) -> bool {
    if std::str::from_utf8(data).is_err() {
        return true;
    }

    let sample = &data[..data.len().min(SNIFF_LEN)];
    if sample.contains(&0) {
        return true;
    }

    let suspicious = sample
        .iter()
        .filter(|&&b| (b < 0x20 && !matches!(b, b'\t' | b'\n' | b'\r' | 0x0c | 0x08)) || b == 0x7f)
        .count();

    suspicious * 10 > sample.len()
}

/// Encode captured chunks for storage
#[must_use]
pub fn encode(headers: &Headers, chunks: &[Bytes]) -> EncodedBody {
    if is_chunked_gzip(headers) {
        return EncodedBody {
            value: Value::Array(
                chunks
                    .iter()
                    .map(|chunk| Value::String(hex::encode(chunk)))
                    .collect(),
            ),
            encoding: Some(BodyEncoding::Chunks),
        };
    }

    let data = concat(chunks);
    if data.is_empty() {
        return EncodedBody {
            value: Value::String(String::new()),
            encoding: None,
        };
    }

    if looks_binary(&data) {
        return EncodedBody {
            value: Value::String(hex::encode(&data)),
            encoding: Some(BodyEncoding::Hex),
        };
    }

    let text = String::from_utf8_lossy(&data).into_owned();

    if is_json_content_type(headers) {
        match serde_json::from_str::<Value>(&text) {
            // Only keep decoded JSON when it reproduces the original bytes.
            // A stored null means "no body", so a literal null stays text.
            Ok(json)
                if !json.is_string() && !json.is_null() && reserializes_to(&json, &text) =>
            {
                return EncodedBody {
                    value: json,
                    encoding: None,
                };
            }
            Ok(_) => debug!("JSON body is not in canonical form, storing as text"),
            Err(e) => debug!("Body is not valid JSON, storing as text: {e}"),
        }
    }

    EncodedBody {
        value: Value::String(text),
        encoding: None,
    }
}

/// Decode a stored body into the chunks to write
///
/// # Errors
///
/// Returns error if a hex body or chunk is malformed
pub fn decode(value: &Value, encoding: Option<BodyEncoding>) -> Result<Vec<Bytes>> {
    match encoding {
        Some(BodyEncoding::Chunks) => {
            let Value::Array(items) = value else {
                return Err(RecorderError::Body(
                    "Chunked body must be a list of hex strings".to_string(),
                ));
            };
            items
                .iter()
                .enumerate()
                .map(|(i, item)| {
                    let hex_chunk = item.as_str().ok_or_else(|| {
                        RecorderError::Body(format!("Chunk {i} is not a string: {item}"))
                    })?;
                    decode_hex(hex_chunk).map_err(|e| RecorderError::Body(format!("Chunk {i}: {e}")))
                })
                .collect()
        }
        Some(BodyEncoding::Hex) => {
            let hex_body = value.as_str().ok_or_else(|| {
                RecorderError::Body(format!("Hex body is not a string: {value}"))
            })?;
            Ok(non_empty(decode_hex(hex_body)?))
        }
        None => match value {
            Value::Null => Ok(Vec::new()),
            Value::String(text) => Ok(non_empty(Bytes::from(text.clone()))),
            json => Ok(non_empty(Bytes::from(serde_json::to_vec(json)?))),
        },
    }
}

fn reserializes_to(json: &Value, text: &str) -> bool {
    serde_json::to_string(json).is_ok_and(|compact| compact == text)
}

/// Total size of a chunk list
#[must_use]
pub fn decoded_len(chunks: &[Bytes]) -> usize {
    chunks.iter().map(Bytes::len).sum()
}

fn decode_hex(data: &str) -> Result<Bytes> {
    hex::decode(data)
        .map(Bytes::from)
        .map_err(|e| RecorderError::Body(format!("Invalid hex body: {e}")))
}

fn non_empty(chunk: Bytes) -> Vec<Bytes> {
    if chunk.is_empty() {
        Vec::new()
    } else {
        vec![chunk]
    }
}

fn concat(chunks: &[Bytes]) -> Bytes {
    match chunks {
        [] => Bytes::new(),
        [single] => single.clone(),
        _ => {
            let mut buf = BytesMut::with_capacity(decoded_len(chunks));
            for chunk in chunks {
                buf.extend_from_slice(chunk);
            }
            buf.freeze()
        }
    }
}
