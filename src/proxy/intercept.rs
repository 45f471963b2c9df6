//! Interception layer: a `tower::Service` every outgoing request goes through

use std::fmt::Display;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, OnceLock};
use std::task::{Context, Poll};

use hyper::body::Body;
use hyper::{Request, Response};
use tower::Service;
use tracing::warn;

use crate::network::{chunk_body, CapturedRequest, CapturedResponse, ChunkBody};
use crate::{RecorderError, Result};

use super::recorder::Recorder;

/// Body of an intercepted response, yielding stored or received chunks in order
pub type FixtureBody = ChunkBody;

static INSTALLED: OnceLock<Arc<Recorder>> = OnceLock::new();

/// Install the process-wide recorder
///
/// Only the first call installs; later calls log a warning and return the
/// recorder already in place.
pub fn install(recorder: Recorder) -> Arc<Recorder> {
    let mut fresh = false;
    let installed = INSTALLED.get_or_init(|| {
        fresh = true;
        Arc::new(recorder)
    });

    if !fresh {
        warn!("Recorder already installed, keeping the existing one");
    }

    Arc::clone(installed)
}

/// The process-wide recorder, if installed
#[must_use]
pub fn installed() -> Option<Arc<Recorder>> {
    INSTALLED.get().cloned()
}

/// Routes requests through a [`Recorder`] before any socket is opened
#[derive(Debug, Clone)]
pub struct Interceptor {
    recorder: Arc<Recorder>,
}

impl Interceptor {
    /// Intercept with `recorder`
    #[must_use]
    pub fn new(recorder: Arc<Recorder>) -> Self {
        Self { recorder }
    }

    /// Intercept with the installed recorder
    #[must_use]
    pub fn global() -> Option<Self> {
        installed().map(Self::new)
    }

    /// Underlying recorder
    #[must_use]
    pub fn recorder(&self) -> &Arc<Recorder> {
        &self.recorder
    }

    /// Send one request through the recorder
    ///
    /// # Errors
    ///
    /// Returns the same errors as [`Recorder::handle`], plus capture errors
    pub async fn send<B>(&self, request: Request<B>) -> Result<Response<FixtureBody>>
    where
        B: Body,
        B::Error: Display,
    {
        let captured = CapturedRequest::from_request(request, self.recorder.limits()).await?;
        let response = self.recorder.handle(captured).await?;
        into_response(response)
    }
}

impl<B> Service<Request<B>> for Interceptor
where
    B: Body + Send + 'static,
    B::Data: Send,
    B::Error: Display + Send,
{
    type Response = Response<FixtureBody>;
    type Error = RecorderError;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response>> + Send>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, request: Request<B>) -> Self::Future {
        let interceptor = self.clone();
        Box::pin(async move { interceptor.send(request).await })
    }
}

fn into_response(response: CapturedResponse) -> Result<Response<FixtureBody>> {
    let CapturedResponse {
        status,
        headers,
        chunks,
    } = response;

    let mut builder = Response::builder().status(status);
    if let Some(map) = builder.headers_mut() {
        *map = headers;
    }

    builder
        .body(chunk_body(&chunks))
        .map_err(|e| RecorderError::Other(format!("Failed to build response: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Config, Mode};
    use crate::network::read_chunks;
    use crate::storage::{Fixture, Headers, RequestRecord, ResponseRecord};
    use bytes::Bytes;
    use http_body_util::Empty;
    use serde_json::json;
    use tempfile::TempDir;
    use tower::ServiceExt;

    #[test]
    fn test_install_once() {
        let dir = TempDir::new().unwrap();
        let first = install(Recorder::new(Config::new(Mode::Replay, dir.path())).unwrap());
        let second = install(Recorder::new(Config::new(Mode::Record, dir.path())).unwrap());

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(second.mode(), Mode::Replay);
        assert!(installed().is_some_and(|r| Arc::ptr_eq(&r, &first)));
        assert!(Interceptor::global().is_some());
    }

    #[tokio::test]
    async fn test_service_replays_through_tower() {
        let dir = TempDir::new().unwrap();
        let recorder = Arc::new(Recorder::new(Config::new(Mode::Replay, dir.path())).unwrap());

        let request = RequestRecord {
            method: "GET".to_string(),
            href: "http://api.invalid/ping".to_string(),
            headers: Headers::new(),
            body: json!(""),
            body_encoding: None,
        };
        let path = recorder.store().path_for(&request, None).unwrap();
        let mut headers = Headers::new();
        headers.insert("x-fixture", "yes");
        recorder
            .store()
            .write(
                &path,
                &Fixture {
                    request,
                    response: ResponseRecord {
                        status_code: 200,
                        headers,
                        body: json!("pong"),
                        body_encoding: None,
                    },
                },
            )
            .unwrap();

        let response = Interceptor::new(recorder)
            .oneshot(
                Request::get("http://api.invalid/ping")
                    .body(Empty::<Bytes>::new())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), 200);
        assert_eq!(response.headers()["x-fixture"], "yes");
        let chunks = read_chunks(response.into_body(), 1024).await.unwrap();
        assert_eq!(chunks, vec![Bytes::from_static(b"pong")]);
    }
}
