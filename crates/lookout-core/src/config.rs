//! Configuration module for Lookout.
//!
//! Provides typed configuration structs that map to the YAML configuration file,
//! with loading, validation, defaults, and a builder pattern for programmatic use.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::domain::{AppStamp, Environment, ReportLevel};

// ---------------------------------------------------------------------------
// Config struct with sub-sections
// ---------------------------------------------------------------------------

/// Top-level configuration for Lookout.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub report: ReportConfig,
    pub capture: CaptureConfig,
    pub sanitize: SanitizeConfig,
    pub logging: LoggingConfig,
    pub metrics: MetricsConfig,
    /// Raise send-attempt logs to info visibility.
    pub debug: bool,
}

/// Delivery pipeline settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportConfig {
    /// Collector URL. Empty disables network delivery.
    pub endpoint: String,
    pub app_id: String,
    pub app_version: String,
    pub environment: Environment,
    /// Batch items on a timer instead of sending each one immediately.
    pub batch_report: bool,
    pub batch_size: usize,
    pub batch_interval_ms: u64,
    pub max_retry_count: u32,
    /// Delay between retries of a single (non-batched) item.
    pub retry_interval_ms: u64,
    pub use_beacon: bool,
    /// Extra request headers sent with every POST.
    pub headers: BTreeMap<String, String>,
    pub report_level: ReportLevel,
    /// Probability in `[0, 1]` that a report is kept.
    pub sample_rate: f64,
    pub integrations: BTreeMap<String, IntegrationConfig>,
    /// Request another flush on the next tick while items remain queued.
    pub eager_drain: bool,
    pub request_timeout_ms: u64,
}

/// Per-integration switch and free-form options.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IntegrationConfig {
    pub enabled: bool,
    pub options: BTreeMap<String, serde_json::Value>,
}

/// Error capture helper settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// Messages containing any of these substrings are ignored.
    pub ignore_errors: Vec<String>,
    /// Messages matching any of these regular expressions are ignored.
    pub ignore_patterns: Vec<String>,
    /// Per-fingerprint cap; counters reset every minute.
    pub max_errors_per_minute: u32,
    pub capture_panics: bool,
}

/// Ingestion-time payload sanitizer settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SanitizeConfig {
    /// Containers nested deeper than this are replaced by a marker.
    pub max_depth: usize,
    /// Strings longer than this many characters are truncated.
    pub max_string_len: usize,
    /// Replace the home directory with `<HOME>`.
    pub strip_paths: bool,
    /// Replace the current username with `<USER>`.
    pub strip_usernames: bool,
}

/// Logging / tracing settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: `trace`, `debug`, `info`, `warn`, or `error`.
    pub level: String,
    /// Emit JSON lines instead of the human-readable format.
    pub json: bool,
}

/// Prometheus metrics endpoint settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    pub enabled: bool,
    /// Socket address for the `/metrics` and `/status` server.
    pub listen: String,
}

// ---------------------------------------------------------------------------
// Config::load()
// ---------------------------------------------------------------------------

impl Config {
    /// Load configuration from a YAML file at `path`.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Try to load from `path`; fall back to [`Config::default`] on any error.
    pub fn load_or_default(path: &Path) -> Self {
        Self::load(path).unwrap_or_default()
    }

    /// Platform-appropriate default path for the configuration file.
    ///
    /// Typically `$XDG_CONFIG_HOME/lookout/config.yaml` on Linux.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("~/.config"))
            .join("lookout")
            .join("config.yaml")
    }
}

impl ReportConfig {
    pub fn batch_interval(&self) -> Duration {
        Duration::from_millis(self.batch_interval_ms)
    }

    pub fn retry_interval(&self) -> Duration {
        Duration::from_millis(self.retry_interval_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    /// Whether network delivery is configured at all.
    pub fn has_endpoint(&self) -> bool {
        !self.endpoint.trim().is_empty()
    }

    /// Whether the integration named `name` is switched on.
    pub fn integration_enabled(&self, name: &str) -> bool {
        self.integrations
            .get(name)
            .map(|i| i.enabled)
            .unwrap_or(false)
    }

    /// Application identity stamped onto every payload.
    pub fn stamp(&self) -> AppStamp {
        AppStamp {
            app_id: self.app_id.clone(),
            app_version: self.app_version.clone(),
            environment: self.environment,
        }
    }
}

// ---------------------------------------------------------------------------
// Defaults
// ---------------------------------------------------------------------------

// Config derives Default because all its fields implement Default.
// (clippy::derivable_impls)

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            endpoint: String::new(),
            app_id: String::new(),
            app_version: "1.0.0".to_string(),
            environment: Environment::Production,
            batch_report: true,
            batch_size: 10,
            batch_interval_ms: 5_000,
            max_retry_count: 3,
            retry_interval_ms: 3_000,
            use_beacon: true,
            headers: BTreeMap::new(),
            report_level: ReportLevel::Error,
            sample_rate: 1.0,
            integrations: BTreeMap::new(),
            eager_drain: true,
            request_timeout_ms: 10_000,
        }
    }
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            ignore_errors: Vec::new(),
            ignore_patterns: vec![
                "(?i)^Network Error$".to_string(),
                r"(?i)^Script error\.?$".to_string(),
            ],
            max_errors_per_minute: 30,
            capture_panics: true,
        }
    }
}

impl Default for SanitizeConfig {
    fn default() -> Self {
        Self {
            max_depth: 8,
            max_string_len: 8_192,
            strip_paths: true,
            strip_usernames: true,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            listen: "127.0.0.1:9464".to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Config::validate()
// ---------------------------------------------------------------------------

/// A single validation error found in the configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Dotted path to the offending field, e.g. `"report.batch_size"`.
    pub field: String,
    /// Human-readable explanation.
    pub message: String,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Valid values for `logging.level`.
const VALID_LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

impl Config {
    /// Validate the configuration and return all errors found.
    ///
    /// An empty vector means the configuration is valid.
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        // --- report ---
        if self.report.has_endpoint() {
            match url::Url::parse(&self.report.endpoint) {
                Ok(url) if matches!(url.scheme(), "http" | "https") => {}
                Ok(url) => errors.push(ValidationError {
                    field: "report.endpoint".into(),
                    message: format!("unsupported scheme '{}'; use http or https", url.scheme()),
                }),
                Err(e) => errors.push(ValidationError {
                    field: "report.endpoint".into(),
                    message: format!("not an absolute URL: {e}"),
                }),
            }
        }
        if !(0.0..=1.0).contains(&self.report.sample_rate) {
            errors.push(ValidationError {
                field: "report.sample_rate".into(),
                message: format!("{} is outside [0, 1]", self.report.sample_rate),
            });
        }
        if self.report.batch_size == 0 {
            errors.push(ValidationError {
                field: "report.batch_size".into(),
                message: "must be greater than 0".into(),
            });
        }
        if self.report.batch_interval_ms == 0 {
            errors.push(ValidationError {
                field: "report.batch_interval_ms".into(),
                message: "must be greater than 0".into(),
            });
        }
        if self.report.request_timeout_ms == 0 {
            errors.push(ValidationError {
                field: "report.request_timeout_ms".into(),
                message: "must be greater than 0".into(),
            });
        }
        for name in self.report.headers.keys() {
            if name.trim().is_empty() {
                errors.push(ValidationError {
                    field: "report.headers".into(),
                    message: "header names must not be empty".into(),
                });
            }
        }

        // --- capture ---
        for (i, pattern) in self.capture.ignore_patterns.iter().enumerate() {
            if let Err(e) = regex::Regex::new(pattern) {
                errors.push(ValidationError {
                    field: format!("capture.ignore_patterns[{i}]"),
                    message: format!("invalid regex: {e}"),
                });
            }
        }
        if self.capture.max_errors_per_minute == 0 {
            errors.push(ValidationError {
                field: "capture.max_errors_per_minute".into(),
                message: "must be greater than 0".into(),
            });
        }

        // --- sanitize ---
        if self.sanitize.max_depth == 0 {
            errors.push(ValidationError {
                field: "sanitize.max_depth".into(),
                message: "must be greater than 0".into(),
            });
        }
        if self.sanitize.max_string_len == 0 {
            errors.push(ValidationError {
                field: "sanitize.max_string_len".into(),
                message: "must be greater than 0".into(),
            });
        }

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

        // --- metrics ---
        if self.metrics.enabled
            && self.metrics.listen.parse::<std::net::SocketAddr>().is_err()
        {
            errors.push(ValidationError {
                field: "metrics.listen".into(),
                message: format!("not a socket address: {}", self.metrics.listen),
            });
        }

        errors
    }
}

// ---------------------------------------------------------------------------
// ConfigBuilder
// ---------------------------------------------------------------------------

/// Builder for constructing a [`Config`] programmatically.
///
/// Starts from [`Config::default`] and allows selective overrides.
///
/// # Example
///
/// ```rust,no_run
/// use lookout_core::config::ConfigBuilder;
///
/// let config = ConfigBuilder::new()
///     .endpoint("https://collector.example.com/report")
///     .app_id("shop-web")
///     .batch_size(20)
///     .build();
/// ```
#[derive(Debug, Clone)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Create a new builder initialised with [`Config::default`] values.
    pub fn new() -> Self {
        Self {
            config: Config::default(),
        }
    }

    // --- report ---

    pub fn endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.config.report.endpoint = endpoint.into();
        self
    }

    pub fn app_id(mut self, app_id: impl Into<String>) -> Self {
        self.config.report.app_id = app_id.into();
        self
    }

    pub fn app_version(mut self, version: impl Into<String>) -> Self {
        self.config.report.app_version = version.into();
        self
    }

    pub fn environment(mut self, environment: Environment) -> Self {
        self.config.report.environment = environment;
        self
    }

    pub fn batch_report(mut self, enabled: bool) -> Self {
        self.config.report.batch_report = enabled;
        self
    }

    pub fn batch_size(mut self, size: usize) -> Self {
        self.config.report.batch_size = size;
        self
    }

    pub fn batch_interval_ms(mut self, ms: u64) -> Self {
        self.config.report.batch_interval_ms = ms;
        self
    }

    pub fn max_retry_count(mut self, n: u32) -> Self {
        self.config.report.max_retry_count = n;
        self
    }

    pub fn retry_interval_ms(mut self, ms: u64) -> Self {
        self.config.report.retry_interval_ms = ms;
        self
    }

    pub fn use_beacon(mut self, enabled: bool) -> Self {
        self.config.report.use_beacon = enabled;
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.config.report.headers.insert(name.into(), value.into());
        self
    }

    pub fn report_level(mut self, level: ReportLevel) -> Self {
        self.config.report.report_level = level;
        self
    }

    pub fn sample_rate(mut self, rate: f64) -> Self {
        self.config.report.sample_rate = rate;
        self
    }

    pub fn integration(mut self, name: impl Into<String>, enabled: bool) -> Self {
        self.config.report.integrations.insert(
            name.into(),
            IntegrationConfig {
                enabled,
                options: BTreeMap::new(),
            },
        );
        self
    }

    pub fn eager_drain(mut self, enabled: bool) -> Self {
        self.config.report.eager_drain = enabled;
        self
    }

    pub fn request_timeout_ms(mut self, ms: u64) -> Self {
        self.config.report.request_timeout_ms = ms;
        self
    }

    // --- capture ---

    pub fn ignore_error(mut self, substring: impl Into<String>) -> Self {
        self.config.capture.ignore_errors.push(substring.into());
        self
    }

    pub fn max_errors_per_minute(mut self, n: u32) -> Self {
        self.config.capture.max_errors_per_minute = n;
        self
    }

    // --- logging / metrics / debug ---

    pub fn logging_level(mut self, level: impl Into<String>) -> Self {
        self.config.logging.level = level.into();
        self
    }

    pub fn metrics_listen(mut self, listen: impl Into<String>) -> Self {
        self.config.metrics.enabled = true;
        self.config.metrics.listen = listen.into();
        self
    }

    pub fn debug(mut self, enabled: bool) -> Self {
        self.config.debug = enabled;
        self
    }

    // --- build ---

    /// Consume the builder and return the finished [`Config`].
    pub fn build(self) -> Config {
        self.config
    }

    /// Build and validate in one step. Returns `Err` with the list of
    /// validation errors if the configuration is invalid.
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
