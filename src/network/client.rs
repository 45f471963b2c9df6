//! Passthrough client performing the real network call

use std::convert::Infallible;
use std::time::Duration;

use futures_util::stream;
use http_body_util::combinators::BoxBody;
use http_body_util::{BodyExt, Empty, Full, StreamBody};
use hyper::body::{Bytes, Frame};
use hyper::{Request, Uri};
use hyper_rustls::HttpsConnector;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use tracing::{debug, warn};

use crate::normalize::RequestUrl;
use crate::{RecorderError, Result};

use super::capture::{read_chunks, CapturedRequest, CapturedResponse};
use super::CONNECT_TIMEOUT_MS;

/// Body that replays a list of chunks
pub type ChunkBody = BoxBody<Bytes, Infallible>;

/// HTTP(S) client for passthrough requests
#[derive(Clone)]
pub struct PassthroughClient {
    client: Client<HttpsConnector<HttpConnector>, ChunkBody>,
    timeout: Duration,
    max_response_size: usize,
}

impl PassthroughClient {
    /// Create a client accepting both `http` and `https` targets
    ///
    /// # Errors
    ///
    /// Returns error if the TLS configuration cannot be built
    pub fn new(timeout: Duration, max_response_size: usize) -> Result<Self> {
        let mut http_connector = HttpConnector::new();
        http_connector.enforce_http(false);
        http_connector.set_connect_timeout(Some(Duration::from_millis(CONNECT_TIMEOUT_MS)));

        let https_connector = hyper_rustls::HttpsConnectorBuilder::new()
            .with_provider_and_webpki_roots(rustls::crypto::ring::default_provider())
            .map_err(|e| RecorderError::Tls(e.to_string()))?
            .https_or_http()
            .enable_http1()
            .wrap_connector(http_connector);

        let client = Client::builder(TokioExecutor::new())
            .pool_idle_timeout(Duration::from_secs(90))
            .pool_max_idle_per_host(10)
            .build(https_connector);

        Ok(Self {
            client,
            timeout,
            max_response_size,
        })
    }

    /// Forward a captured request and drain the response
    ///
    /// # Errors
    ///
    /// Returns the network error, a timeout, or a body error; nothing is
    /// retried
    pub async fn forward(
        &self,
        request: &CapturedRequest,
        url: &RequestUrl,
    ) -> Result<CapturedResponse> {
        let uri = target_uri(request, url)?;
        let timeout_ms = u64::try_from(self.timeout.as_millis()).unwrap_or(u64::MAX);

        debug!("Forwarding {} to {}", request.method, uri);

        match tokio::time::timeout(self.timeout, self.send(request, uri.clone())).await {
            Ok(result) => result,
            Err(_) => {
                warn!("Request to {uri} timed out after {timeout_ms}ms");
                Err(RecorderError::Timeout {
                    href: uri.to_string(),
                    timeout_ms,
                })
            }
        }
    }

    async fn send(&self, request: &CapturedRequest, uri: Uri) -> Result<CapturedResponse> {
        let mut builder = Request::builder().method(request.method.clone()).uri(uri);
        if let Some(headers) = builder.headers_mut() {
            headers.extend(request.headers.clone());
        }

        let http_request = builder
            .body(chunk_body(&request.chunks))
            .map_err(|e| RecorderError::InvalidRequest(format!("Failed to build request: {e}")))?;

        let response = self.client.request(http_request).await.map_err(|e| {
            warn!("Request failed: {e}");
            RecorderError::Network(e)
        })?;

        let (parts, body) = response.into_parts();
        let chunks = read_chunks(body, self.max_response_size).await?;

        Ok(CapturedResponse {
            status: parts.status,
            headers: parts.headers,
            chunks,
        })
    }
}

/// Body that writes the captured chunks with their original boundaries
#[must_use]
pub fn chunk_body(chunks: &[Bytes]) -> ChunkBody {
    match chunks {
        [] => Empty::new().boxed(),
        [single] => Full::new(single.clone()).boxed(),
        _ => {
            let frames: Vec<std::result::Result<Frame<Bytes>, Infallible>> =
                chunks.iter().cloned().map(|c| Ok(Frame::data(c))).collect();
            StreamBody::new(stream::iter(frames)).boxed()
        }
    }
}

/// Absolute URI for the real call: resolved origin plus the path and query
/// exactly as issued
fn target_uri(request: &CapturedRequest, url: &RequestUrl) -> Result<Uri> {
    let path_and_query = request
        .uri
        .path_and_query()
        .map_or("/", |pq| pq.as_str());
    let uri = format!("{}{path_and_query}", url.origin());

    uri.parse::<Uri>()
        .map_err(|e| RecorderError::InvalidRequest(format!("Invalid URI '{uri}': {e}")))
}
