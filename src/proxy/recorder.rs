//! Record/replay orchestration for one intercepted request

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use hyper::header::{HeaderValue, CONTENT_LENGTH};
use hyper::StatusCode;
use tracing::{debug, error, info, warn};

use crate::body;
use crate::config::{Config, LimitsConfig, Mode};
use crate::identity::{Identification, Identify, IdentityMap, IdentityResolver};
use crate::network::{CapturedRequest, CapturedResponse, PassthroughClient};
use crate::normalize::{NormalizedRequest, Normalize, Normalizer, RequestUrl};
use crate::storage::{Fixture, FixtureStore, Headers, RequestRecord, ResponseRecord};
use crate::{RecorderError, Result};

use super::mode::{Action, ModeController};
use super::pending::PendingWrites;

/// User-supplied predicate; `true` sends the request straight to the network
pub trait Ignore: Send + Sync {
    /// Whether to bypass fixtures for this request
    fn ignore(&self, request: &NormalizedRequest) -> bool;
}

impl<F> Ignore for F
where
    F: Fn(&NormalizedRequest) -> bool + Send + Sync,
{
    fn ignore(&self, request: &NormalizedRequest) -> bool {
        self(request)
    }
}

/// Callbacks that customize recording
#[derive(Clone, Default)]
pub struct Hooks {
    /// Ignore predicate
    pub ignore: Option<Arc<dyn Ignore>>,
    /// Identity callback
    pub identify: Option<Arc<dyn Identify>>,
    /// Normalizers, applied in order
    pub normalizers: Vec<Arc<dyn Normalize>>,
}

impl fmt::Debug for Hooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Hooks")
            .field("ignore", &self.ignore.is_some())
            .field("identify", &self.identify.is_some())
            .field("normalizers", &self.normalizers.len())
            .finish()
    }
}

/// Builder for [`Recorder`]
#[derive(Debug, Default)]
pub struct RecorderBuilder {
    config: Config,
    hooks: Hooks,
}

impl RecorderBuilder {
    /// Start from a configuration
    #[must_use]
    pub fn new(config: Config) -> Self {
        Self {
            config,
            hooks: Hooks::default(),
        }
    }

    /// Replace all hooks at once
    #[must_use]
    pub fn hooks(mut self, hooks: Hooks) -> Self {
        self.hooks = hooks;
        self
    }

    /// Set the ignore predicate
    #[must_use]
    pub fn ignore<F>(mut self, ignore: F) -> Self
    where
        F: Fn(&NormalizedRequest) -> bool + Send + Sync + 'static,
    {
        self.hooks.ignore = Some(Arc::new(ignore));
        self
    }

    /// Set the identity callback
    #[must_use]
    pub fn identify<F>(mut self, identify: F) -> Self
    where
        F: Fn(&NormalizedRequest, Option<&ResponseRecord>) -> Identification
            + Send
            + Sync
            + 'static,
    {
        self.hooks.identify = Some(Arc::new(identify));
        self
    }

    /// Append a normalizer
    #[must_use]
    pub fn normalizer<F>(mut self, normalizer: F) -> Self
    where
        F: Fn(&mut NormalizedRequest, Option<&mut ResponseRecord>) + Send + Sync + 'static,
    {
        self.hooks.normalizers.push(Arc::new(normalizer));
        self
    }

    /// Build the recorder
    ///
    /// # Errors
    ///
    /// Returns error if the configuration is invalid or the client cannot be
    /// created
    pub fn build(self) -> Result<Recorder> {
        let Self { config, hooks } = self;
        config.validate()?;

        let mode = config.resolve_mode();
        let client = PassthroughClient::new(
            Duration::from_millis(config.passthrough_timeout_ms),
            config.limits.max_response_size,
        )?;

        info!(
            "Recorder starting in {mode} mode, fixtures at {}",
            config.fixtures_path.display()
        );

        Ok(Recorder {
            mode: ModeController::new(mode),
            store: FixtureStore::new(config.fixtures_path.clone()),
            normalizer: Normalizer::new(config.ephemeral_port_agents.clone(), hooks.normalizers),
            identity: IdentityResolver::new(hooks.identify),
            ignore: hooks.ignore,
            client,
            limits: config.limits,
            pending: PendingWrites::new(),
        })
    }
}

/// HTTP interaction recorder
pub struct Recorder {
    mode: ModeController,
    store: FixtureStore,
    normalizer: Normalizer,
    identity: IdentityResolver,
    ignore: Option<Arc<dyn Ignore>>,
    client: PassthroughClient,
    limits: LimitsConfig,
    pending: PendingWrites,
}

impl fmt::Debug for Recorder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Recorder")
            .field("mode", &self.mode.mode())
            .field("store", &self.store)
            .field("normalizer", &self.normalizer)
            .field("identity", &self.identity)
            .field("pending", &self.pending.pending())
            .finish_non_exhaustive()
    }
}

impl Recorder {
    /// Builder starting from `config`
    #[must_use]
    pub fn builder(config: Config) -> RecorderBuilder {
        RecorderBuilder::new(config)
    }

    /// Recorder without hooks
    ///
    /// # Errors
    ///
    /// Returns error if the configuration is invalid
    pub fn new(config: Config) -> Result<Self> {
        RecorderBuilder::new(config).build()
    }

    /// Current mode
    #[must_use]
    pub fn mode(&self) -> Mode {
        self.mode.mode()
    }

    /// Switch mode, returning the previous one
    pub fn set_mode(&self, mode: Mode) -> Mode {
        self.mode.set_mode(mode)
    }

    /// Switch to record mode
    pub fn record(&self) {
        self.mode.record();
    }

    /// Switch to replay mode
    pub fn replay(&self) {
        self.mode.replay();
    }

    /// Switch to rerecord mode
    pub fn rerecord(&self) {
        self.mode.rerecord();
    }

    /// Switch to bypass mode
    pub fn bypass(&self) {
        self.mode.bypass();
    }

    /// Alias of [`Recorder::bypass`]
    pub fn ignore(&self) {
        self.mode.ignore();
    }

    /// Fixture store
    #[must_use]
    pub fn store(&self) -> &FixtureStore {
        &self.store
    }

    /// Identities learned so far
    #[must_use]
    pub fn identities(&self) -> &IdentityMap {
        self.identity.identities()
    }

    /// Capture limits
    #[must_use]
    pub fn limits(&self) -> &LimitsConfig {
        &self.limits
    }

    /// Wait for every deferred fixture write to finish
    pub async fn flush(&self) {
        self.pending.flush().await;
    }

    /// Fixture address a request maps to right now, without handling it
    ///
    /// # Errors
    ///
    /// Returns error if the request cannot be normalized or identified
    pub fn fixture_path(&self, captured: &CapturedRequest) -> Result<PathBuf> {
        let normalized = self.normalizer.normalize(captured, None)?;
        self.address(normalized).map(|(_, path)| path)
    }

    /// Handle one intercepted request
    ///
    /// # Errors
    ///
    /// Returns the network error in passthrough and record, a
    /// [`RecorderError::MissingFixture`] in replay, or a normalization error
    pub async fn handle(&self, captured: CapturedRequest) -> Result<CapturedResponse> {
        let url = Normalizer::resolve_url(&captured)?;
        let normalized = self.normalizer.normalize(&captured, None)?;
        let href = normalized.href();
        let method = normalized.method.clone();

        let ignored = self
            .ignore
            .as_ref()
            .is_some_and(|ignore| ignore.ignore(&normalized));
        let mode = self.mode.mode();

        if ModeController::bypasses(mode, ignored) {
            debug!("Bypassing {method} {href}");
            return self.client.forward(&captured, &url).await;
        }

        let (request, path) = self.address(normalized)?;
        let has_fixture = mode == Mode::Record && self.fixture_exists(&path).await?;

        match ModeController::plan(mode, ignored, || has_fixture) {
            Action::Passthrough => {
                debug!("Bypassing {method} {href}");
                self.client.forward(&captured, &url).await
            }
            Action::Replay => {
                debug!("Replaying {method} {href} from {}", path.display());
                self.replay_fixture(path, request).await
            }
            Action::Record { overwrite } => {
                if overwrite {
                    info!("Rerecording {method} {href}");
                } else {
                    info!("Recording {method} {href}");
                }
                self.record_live(&captured, &url).await
            }
        }
    }

    fn address(&self, normalized: NormalizedRequest) -> Result<(RequestRecord, PathBuf)> {
        let identity = self.identity.resolve(&normalized, None)?;
        let request = normalized.into_record();
        let path = self.store.path_for(&request, identity.as_deref())?;
        Ok((request, path))
    }

    async fn fixture_exists(&self, path: &Path) -> Result<bool> {
        let store = self.store.clone();
        let path = path.to_path_buf();
        tokio::task::spawn_blocking(move || store.exists(&path))
            .await
            .map_err(|e| RecorderError::Other(format!("Fixture lookup task failed: {e}")))
    }

    async fn replay_fixture(&self, path: PathBuf, request: RequestRecord) -> Result<CapturedResponse> {
        let store = self.store.clone();
        let fixture = tokio::task::spawn_blocking(move || store.read(&path, &request))
            .await
            .map_err(|e| RecorderError::Other(format!("Fixture read task failed: {e}")))?
            .map_err(|e| {
                if let RecorderError::MissingFixture { path, .. } = &e {
                    warn!("No fixture at {}", path.display());
                }
                e
            })?;

        let stored_request = NormalizedRequest::from_record(&fixture.request)?;
        self.identity.resolve(&stored_request, Some(&fixture.response))?;

        synthesize(&fixture.response)
    }

    async fn record_live(&self, captured: &CapturedRequest, url: &RequestUrl) -> Result<CapturedResponse> {
        let response = self.client.forward(captured, url).await?;

        let headers = Headers::from_header_map(&response.headers);
        let encoded = body::encode(&headers, &response.chunks);
        let mut response_record = ResponseRecord {
            status_code: response.status.as_u16(),
            headers,
            body: encoded.value,
            body_encoding: encoded.encoding,
        };

        let normalized = self
            .normalizer
            .normalize(captured, Some(&mut response_record))?;
        self.identity.resolve(&normalized, Some(&response_record))?;
        let (request, path) = self.address(normalized)?;

        self.persist(
            path,
            Fixture {
                request,
                response: response_record,
            },
        );

        Ok(response)
    }

    /// Write the fixture on the blocking pool without holding up the caller
    fn persist(&self, path: PathBuf, fixture: Fixture) {
        let guard = self.pending.track();
        let store = self.store.clone();

        tokio::spawn(async move {
            let _guard = guard;
            let shown = path.display().to_string();

            match tokio::task::spawn_blocking(move || store.write(&path, &fixture)).await {
                Ok(Ok(())) => debug!("Saved fixture {shown}"),
                Ok(Err(e)) => error!("Failed to save fixture {shown}: {e}"),
                Err(e) => error!("Fixture write task for {shown} failed: {e}"),
            }
        });
    }
}

/// Rebuild a response from its stored record
///
/// A stored `content-length` is rewritten to the decoded body length.
///
/// # Errors
///
/// Returns error if the status, headers or body are malformed
pub fn synthesize(record: &ResponseRecord) -> Result<CapturedResponse> {
    let status = StatusCode::from_u16(record.status_code).map_err(|e| {
        RecorderError::Body(format!("Invalid stored status {}: {e}", record.status_code))
    })?;
    let chunks = body::decode(&record.body, record.body_encoding)?;

    let mut headers = record.headers.to_header_map()?;
    if headers.contains_key(CONTENT_LENGTH) {
        headers.insert(CONTENT_LENGTH, HeaderValue::from(body::decoded_len(&chunks)));
    }

    Ok(CapturedResponse {
        status,
        headers,
        chunks,
    })
}
