//! Byte-exact capture of request and response bodies

use bytes::{Buf, Bytes};
use http_body_util::BodyExt;
use hyper::body::Body;
use hyper::header::HeaderMap;
use hyper::{Method, Request, StatusCode, Uri};

use crate::config::LimitsConfig;
use crate::{RecorderError, Result};

/// An intercepted request with its body as written, chunk by chunk
#[derive(Debug, Clone)]
pub struct CapturedRequest {
    /// Request method
    pub method: Method,
    /// URI as issued (absolute or origin-form)
    pub uri: Uri,
    /// Headers as issued
    pub headers: HeaderMap,
    /// Body chunks in write order
    pub chunks: Vec<Bytes>,
}

impl CapturedRequest {
    /// Drain an outgoing request
    ///
    /// # Errors
    ///
    /// Returns error if the request exceeds the limits or the body fails
    pub async fn from_request<B>(request: Request<B>, limits: &LimitsConfig) -> Result<Self>
    where
        B: Body,
        B::Error: std::fmt::Display,
    {
        validate_request(&request, limits)?;

        let (parts, body) = request.into_parts();
        let chunks = read_chunks(body, limits.max_request_size).await?;

        Ok(Self {
            method: parts.method,
            uri: parts.uri,
            headers: parts.headers,
            chunks,
        })
    }
}

/// A fully drained response
#[derive(Debug, Clone)]
pub struct CapturedResponse {
    /// Status code
    pub status: StatusCode,
    /// Response headers
    pub headers: HeaderMap,
    /// Body chunks in received order
    pub chunks: Vec<Bytes>,
}

/// Check declared size and header count before reading the body
///
/// # Errors
///
/// Returns error if the request is too large or has too many headers
pub fn validate_request<B>(request: &Request<B>, limits: &LimitsConfig) -> Result<()> {
    if let Some(length) = request
        .headers()
        .get(hyper::header::CONTENT_LENGTH)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.parse::<usize>().ok())
    {
        if length > limits.max_request_size {
            return Err(RecorderError::DataTooLarge {
                size: length,
                limit: limits.max_request_size,
            });
        }
    }

    let header_count = request.headers().len();
    if header_count > limits.max_headers {
        return Err(RecorderError::InvalidRequest(format!(
            "Too many headers: {header_count} > {}",
            limits.max_headers
        )));
    }

    Ok(())
}

/// Read every data frame of a body, keeping frame boundaries
///
/// # Errors
///
/// Returns error if the body fails or exceeds `max_size`
pub async fn read_chunks<B>(body: B, max_size: usize) -> Result<Vec<Bytes>>
where
    B: Body,
    B::Error: std::fmt::Display,
{
    let mut body = std::pin::pin!(body);
    let mut chunks = Vec::new();
    let mut total = 0usize;

    while let Some(frame) = body.frame().await {
        let frame = frame.map_err(|e| RecorderError::Body(format!("Failed to read body: {e}")))?;

        let Ok(mut data) = frame.into_data() else {
            continue;
        };

        let chunk = data.copy_to_bytes(data.remaining());
        total += chunk.len();
        if total > max_size {
            return Err(RecorderError::DataTooLarge {
                size: total,
                limit: max_size,
            });
        }

        if !chunk.is_empty() {
            chunks.push(chunk);
        }
    }

    Ok(chunks)
}
