//! Configuration module for trsync.
//!
//! Typed view of `config.yaml`: feeds to follow, polling cadence, retry
//! budgets and where state and output live. Every section has defaults, so
//! a file only needs the keys it changes.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::domain::{DomainError, EndpointDescriptor};

// ---------------------------------------------------------------------------
// Config struct with sub-sections
// ---------------------------------------------------------------------------

/// Top-level configuration for trsync.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub feeds: Vec<FeedConfig>,
    pub sync: SyncConfig,
    pub transport_retry: RetryConfig,
    pub apply_retry: RetryConfig,
    pub persist_retry: RetryConfig,
    pub state: StateConfig,
    pub sink: SinkConfig,
    pub logging: LoggingConfig,
}

/// One tracked TRS feed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedConfig {
    /// URI of the TRS document.
    pub uri: String,
    /// HTTP Basic username; must be given together with `password`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    /// HTTP Basic password; must be given together with `username`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
}

impl FeedConfig {
    pub fn anonymous(uri: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            username: None,
            password: None,
        }
    }

    pub fn basic_auth(
        uri: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            uri: uri.into(),
            username: Some(username.into()),
            password: Some(password.into()),
        }
    }

    /// Builds the validated endpoint descriptor for this feed.
    pub fn endpoint(&self) -> Result<EndpointDescriptor, DomainError> {
        EndpointDescriptor::from_parts(&self.uri, self.username.clone(), self.password.clone())
    }
}

/// Polling settings shared by all feeds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Seconds to wait between poll cycles.
    pub poll_interval_secs: u64,
    /// Per-request HTTP timeout in seconds.
    pub request_timeout_secs: u64,
}

impl SyncConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// Exponential backoff settings for one retry site.
///
/// Fields omitted from a section take the transport defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Delay before the first retry, in milliseconds.
    pub base_delay_ms: u64,
    /// Growth factor applied per attempt.
    pub multiplier: f64,
    /// Upper bound for a single delay, in milliseconds.
    pub max_delay_ms: u64,
    /// Total attempts including the first one.
    pub max_attempts: u32,
    /// Randomize each delay to avoid synchronized retries.
    pub jitter: bool,
}

impl RetryConfig {
    pub fn transport() -> Self {
        Self {
            base_delay_ms: 500,
            multiplier: 2.0,
            max_delay_ms: 30_000,
            max_attempts: 5,
            jitter: true,
        }
    }

    pub fn apply() -> Self {
        Self {
            base_delay_ms: 200,
            multiplier: 2.0,
            max_delay_ms: 5_000,
            max_attempts: 3,
            jitter: true,
        }
    }

    pub fn persist() -> Self {
        Self {
            base_delay_ms: 100,
            multiplier: 2.0,
            max_delay_ms: 2_000,
            max_attempts: 5,
            jitter: true,
        }
    }

    fn validate_into(&self, section: &str, errors: &mut Vec<ValidationError>) {
        if self.max_attempts == 0 {
            errors.push(ValidationError {
                field: format!("{section}.max_attempts"),
                message: "must be at least 1".into(),
            });
        }
        if !(self.multiplier >= 1.0) {
            errors.push(ValidationError {
                field: format!("{section}.multiplier"),
                message: format!("must be >= 1.0, got {}", self.multiplier),
            });
        }
        if self.base_delay_ms > self.max_delay_ms {
            errors.push(ValidationError {
                field: format!("{section}.base_delay_ms"),
                message: format!(
                    "base_delay_ms ({}) must not exceed max_delay_ms ({})",
                    self.base_delay_ms, self.max_delay_ms
                ),
            });
        }
    }
}

/// Cursor persistence settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StateConfig {
    /// Path of the SQLite cursor database.
    pub database: PathBuf,
}

/// Downstream sink settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SinkConfig {
    /// File receiving one JSON line per applied change.
    pub output: PathBuf,
}

/// Log verbosity
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter when `RUST_LOG` is unset
    pub level: String,
}

// ---------------------------------------------------------------------------
// Config::load()
// ---------------------------------------------------------------------------

impl Config {
    /// Reads and parses the YAML file at `path`
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Like [`Config::load`], with built-in defaults when the file is missing or invalid
    pub fn load_or_default(path: &Path) -> Self {
        Self::load(path).unwrap_or_default()
    }

    /// `config.yaml` under the platform config directory
    ///
    /// Typically `$XDG_CONFIG_HOME/trsync/config.yaml` on Linux.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| home_relative(".config"))
            .join("trsync")
            .join("config.yaml")
    }

    /// Endpoint descriptors for every configured feed, in file order.
    pub fn endpoints(&self) -> Result<Vec<EndpointDescriptor>, DomainError> {
        self.feeds.iter().map(FeedConfig::endpoint).collect()
    }
}

// ---------------------------------------------------------------------------
// Defaults
// ---------------------------------------------------------------------------

fn data_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| home_relative(".local/share"))
        .join("trsync")
}

/// `$HOME/<rel>`, or `<rel>` under the working directory without a home
fn home_relative(rel: &str) -> PathBuf {
    dirs::home_dir().unwrap_or_default().join(rel)
}

impl Default for Config {
    fn default() -> Self {
        Self {
            feeds: Vec::new(),
            sync: SyncConfig::default(),
            transport_retry: RetryConfig::transport(),
            apply_retry: RetryConfig::apply(),
            persist_retry: RetryConfig::persist(),
            state: StateConfig::default(),
            sink: SinkConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: 20,
            request_timeout_secs: 30,
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self::transport()
    }
}

impl Default for StateConfig {
    fn default() -> Self {
        Self {
            database: data_dir().join("cursors.db"),
        }
    }
}

impl Default for SinkConfig {
    fn default() -> Self {
        Self {
            output: data_dir().join("changes.jsonl"),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Config::validate()
// ---------------------------------------------------------------------------

/// One problem found by [`Config::validate`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Dotted path to the offending field, e.g. `"sync.poll_interval_secs"`.
    pub field: String,
    /// What is wrong with it
    pub message: String,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Accepted `logging.level` values
const VALID_LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

impl Config {
    /// Checks the whole configuration, reporting every problem at once
    ///
    /// An empty result means the configuration is usable.
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        // --- feeds ---
        if self.feeds.is_empty() {
            errors.push(ValidationError {
                field: "feeds".into(),
                message: "at least one feed must be configured".into(),
            });
        }
        let mut seen = HashSet::new();
        for (i, feed) in self.feeds.iter().enumerate() {
            match feed.endpoint() {
                Ok(endpoint) => {
                    if !seen.insert(endpoint.feed_uri().clone()) {
                        errors.push(ValidationError {
                            field: format!("feeds[{i}].uri"),
                            message: format!("duplicate feed '{}'", feed.uri),
                        });
                    }
                }
                Err(e) => errors.push(ValidationError {
                    field: format!("feeds[{i}]"),
                    message: e.to_string(),
                }),
            }
        }

        // --- sync ---
        if self.sync.poll_interval_secs == 0 {
            errors.push(ValidationError {
                field: "sync.poll_interval_secs".into(),
                message: "must be greater than 0".into(),
            });
        }
        if self.sync.request_timeout_secs == 0 {
            errors.push(ValidationError {
                field: "sync.request_timeout_secs".into(),
                message: "must be greater than 0".into(),
            });
        }

        // --- retry policies ---
        self.transport_retry
            .validate_into("transport_retry", &mut errors);
        self.apply_retry.validate_into("apply_retry", &mut errors);
        self.persist_retry.validate_into("persist_retry", &mut errors);

        // --- logging ---
        if !VALID_LOG_LEVELS.contains(&self.logging.level.as_str()) {
            errors.push(ValidationError {
                field: "logging.level".into(),
                message: format!(
                    "invalid level '{}'; valid options: {}",
                    self.logging.level,
                    VALID_LOG_LEVELS.join(", ")
                ),
            });
        }

        errors
    }
}

// ---------------------------------------------------------------------------
// ConfigBuilder
// ---------------------------------------------------------------------------

/// Programmatic [`Config`] construction, mainly for tests and embedding
///
/// Every setter overrides one field of [`Config::default`].
///
/// # Example
///
/// ```rust,no_run
/// use trs_core::config::{ConfigBuilder, FeedConfig};
///
/// let config = ConfigBuilder::new()
///     .feed(FeedConfig::anonymous("https://trs.example.com/trs"))
///     .sync_poll_interval_secs(60)
///     .logging_level("debug")
///     .build();
/// ```
#[derive(Debug, Clone)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Builder holding the defaults
    pub fn new() -> Self {
        Self {
            config: Config::default(),
        }
    }

    // --- feeds ---

    pub fn feed(mut self, feed: FeedConfig) -> Self {
        self.config.feeds.push(feed);
        self
    }

    // --- sync ---

    pub fn sync_poll_interval_secs(mut self, seconds: u64) -> Self {
        self.config.sync.poll_interval_secs = seconds;
        self
    }

    pub fn sync_request_timeout_secs(mut self, seconds: u64) -> Self {
        self.config.sync.request_timeout_secs = seconds;
        self
    }

    // --- retry ---

    pub fn transport_retry(mut self, retry: RetryConfig) -> Self {
        self.config.transport_retry = retry;
        self
    }

    pub fn apply_retry(mut self, retry: RetryConfig) -> Self {
        self.config.apply_retry = retry;
        self
    }

    pub fn persist_retry(mut self, retry: RetryConfig) -> Self {
        self.config.persist_retry = retry;
        self
    }

    // --- state / sink ---

    pub fn state_database(mut self, path: PathBuf) -> Self {
        self.config.state.database = path;
        self
    }

    pub fn sink_output(mut self, path: PathBuf) -> Self {
        self.config.sink.output = path;
        self
    }

    // --- logging ---

    pub fn logging_level(mut self, level: impl Into<String>) -> Self {
        self.config.logging.level = level.into();
        self
    }

    // --- build ---

    /// The configuration as built, unchecked
    pub fn build(self) -> Config {
        self.config
    }

    /// The configuration as built, or every validation error it has
    pub fn build_validated(self) -> Result<Config, Vec<ValidationError>> {
        let config = self.build();
        let errors = config.validate();
        if errors.is_empty() {
            Ok(config)
        } else {
            Err(errors)
        }
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
