//! Configuration types for Fixtape

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::{RecorderError, Result};

/// Environment variable overriding the mode when the config does not set one
pub const MODE_ENV_VAR: &str = "RECORDER_MODE";

/// Config file looked up by [`Config::discover`]
pub const CONFIG_FILE_NAME: &str = "fixtape.toml";

/// Default fixture root, relative to the working directory
pub const DEFAULT_FIXTURES_DIR: &str = "__fixtures__";

/// Operating mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum Mode {
    /// Replay existing fixtures, record missing ones
    Record = 0,
    /// Serve from fixtures only
    Replay = 1,
    /// Always hit the network and overwrite fixtures
    Rerecord = 2,
    /// Always hit the network, never touch fixtures
    #[serde(alias = "ignore")]
    Bypass = 3,
}

impl Mode {
    /// Lowercase name as used in config files and the environment
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Record => "record",
            Self::Replay => "replay",
            Self::Rerecord => "rerecord",
            Self::Bypass => "bypass",
        }
    }

    pub(crate) fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Record,
            1 => Self::Replay,
            2 => Self::Rerecord,
            _ => Self::Bypass,
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Mode {
    type Err = RecorderError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "record" => Ok(Self::Record),
            "replay" => Ok(Self::Replay),
            "rerecord" => Ok(Self::Rerecord),
            "bypass" | "ignore" => Ok(Self::Bypass),
            other => Err(RecorderError::ConfigError(format!(
                "Unknown mode {other:?}, expected record, replay, rerecord or bypass"
            ))),
        }
    }
}

/// Main configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Operating mode; falls back to the environment when unset
    #[serde(default)]
    pub mode: Option<Mode>,
    /// Root directory for fixtures
    #[serde(default = "default_fixtures_path")]
    pub fixtures_path: PathBuf,
    /// User-agent markers of local test clients whose ports are ephemeral
    #[serde(default = "default_ephemeral_port_agents")]
    pub ephemeral_port_agents: Vec<String>,
    /// Timeout for real network calls
    #[serde(default = "default_passthrough_timeout_ms")]
    pub passthrough_timeout_ms: u64,
    /// Resource limits
    #[serde(default)]
    pub limits: LimitsConfig,
}

fn default_fixtures_path() -> PathBuf {
    std::env::current_dir()
        .map(|cwd| cwd.join(DEFAULT_FIXTURES_DIR))
        .unwrap_or_else(|_| PathBuf::from(DEFAULT_FIXTURES_DIR))
}

fn default_ephemeral_port_agents() -> Vec<String> {
    vec!["node-superagent".to_string()]
}

fn default_passthrough_timeout_ms() -> u64 {
    30_000
}

impl Default for Config {
    fn default() -> Self {
        Self {
            mode: None,
            fixtures_path: default_fixtures_path(),
            ephemeral_port_agents: default_ephemeral_port_agents(),
            passthrough_timeout_ms: default_passthrough_timeout_ms(),
            limits: LimitsConfig::default(),
        }
    }
}

/// Resource limits
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimitsConfig {
    /// Maximum captured request body size in bytes
    pub max_request_size: usize,
    /// Maximum captured response body size in bytes
    pub max_response_size: usize,
    /// Maximum headers per request
    pub max_headers: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_request_size: 16 * 1024 * 1024,   // 16 MB
            max_response_size: 256 * 1024 * 1024, // 256 MB
            max_headers: 128,
        }
    }
}

impl Config {
    /// Create a configuration with an explicit mode and fixture root
    #[must_use]
    pub fn new(mode: Mode, fixtures_path: impl Into<PathBuf>) -> Self {
        Self {
            mode: Some(mode),
            fixtures_path: fixtures_path.into(),
            ..Self::default()
        }
    }

    /// Load configuration from TOML file
    ///
    /// # Errors
    ///
    /// Returns error if file cannot be read or parsed
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| RecorderError::ConfigError(format!("Failed to read config file: {e}")))?;

        let config: Self = toml::from_str(&content)
            .map_err(|e| RecorderError::ConfigError(format!("Failed to parse config: {e}")))?;

        config.validate()?;
        Ok(config)
    }

    /// Load `fixtape.toml` from `dir` if present, defaults otherwise
    ///
    /// # Errors
    ///
    /// Returns error if the file exists but is invalid
    pub fn discover(dir: &Path) -> Result<Self> {
        let path = dir.join(CONFIG_FILE_NAME);
        if path.is_file() {
            Self::from_file(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Validate configuration
    ///
    /// # Errors
    ///
    /// Returns error if configuration is invalid
    pub fn validate(&self) -> Result<()> {
        if self.fixtures_path.as_os_str().is_empty() {
            return Err(RecorderError::ConfigError(
                "fixtures_path cannot be empty".to_string(),
            ));
        }

        if self.passthrough_timeout_ms == 0 {
            return Err(RecorderError::ConfigError(
                "passthrough_timeout_ms must be > 0".to_string(),
            ));
        }

        if self.limits.max_request_size == 0
            || self.limits.max_response_size == 0
            || self.limits.max_headers == 0
        {
            return Err(RecorderError::ConfigError(
                "limits must be > 0".to_string(),
            ));
        }

        Ok(())
    }

    /// Mode to start in: explicit config, then `RECORDER_MODE`, then the
    /// test-environment default
    #[must_use]
    pub fn resolve_mode(&self) -> Mode {
        self.resolve_mode_with(|key| std::env::var(key).ok())
    }

    /// [`Config::resolve_mode`] with an injectable environment lookup
    pub fn resolve_mode_with<F>(&self, env: F) -> Mode
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(mode) = self.mode {
            return mode;
        }

        if let Some(value) = env(MODE_ENV_VAR) {
            match value.parse() {
                Ok(mode) => return mode,
                Err(e) => warn!("Ignoring {MODE_ENV_VAR}: {e}"),
            }
        }

        if is_test_environment(&env) {
            Mode::Replay
        } else {
            Mode::Record
        }
    }
}

fn is_test_environment<F>(env: &F) -> bool
where
    F: Fn(&str) -> Option<String>,
{
    let ci = env("CI").is_some_and(|value| {
        let value = value.trim().to_ascii_lowercase();
        !(value.is_empty() || value == "0" || value == "false")
    });

    ci || env("RECORDER_ENV").is_some_and(|value| value.eq_ignore_ascii_case("test"))
}
