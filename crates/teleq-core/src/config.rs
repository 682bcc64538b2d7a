//! Configuration module for teleq.
//!
//! Provides typed configuration structs that map to the YAML configuration file,
//! with loading, validation, defaults, and a builder pattern for programmatic use.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::domain::event::{DEFAULT_MAX_AGE_SECS, DEFAULT_MAX_QUEUE_SIZE, DEFAULT_MAX_RETRIES};
use crate::domain::{FlushIntervals, RetentionPolicy, TelemetryMode};

// ---------------------------------------------------------------------------
// Config struct with sub-sections
// ---------------------------------------------------------------------------

/// Top-level configuration for teleq.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub queue: QueueConfig,
    pub flush: FlushConfig,
    pub logging: LoggingConfig,
}

/// Storage and retention settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// Path to the SQLite database file.
    pub database: PathBuf,
    /// Maximum number of stored events after pruning.
    pub max_queue_size: u64,
    /// Events older than this many seconds are pruned regardless of priority.
    pub max_age_seconds: u64,
    /// Failed uploads tolerated before an event is dropped.
    pub max_retries: u32,
}

/// Flush pipeline settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FlushConfig {
    /// Events requested from the queue per cycle.
    pub batch_size: u32,
    /// Upper bound for a single uploader call.
    pub upload_timeout_seconds: u64,
    /// Upper bound for the best-effort flush when the app goes to background.
    pub background_budget_seconds: u64,
    /// Seconds between maintenance prunes.
    pub prune_interval_seconds: u64,
    /// Periodic flush interval per telemetry mode.
    pub intervals: IntervalsConfig,
}

/// Periodic flush interval in seconds per mode; `null` disables the timer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IntervalsConfig {
    pub full: Option<u64>,
    pub normal: Option<u64>,
    pub reduced: Option<u64>,
    pub minimal: Option<u64>,
}

/// Logging / tracing settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: `trace`, `debug`, `info`, `warn`, or `error`.
    pub level: String,
    /// Output format: `pretty` or `json`.
    pub format: String,
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
    /// Typically `$XDG_CONFIG_HOME/teleq/config.yaml` on Linux.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("~/.config"))
            .join("teleq")
            .join("config.yaml")
    }
}

// ---------------------------------------------------------------------------
// Defaults
// ---------------------------------------------------------------------------

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            database: dirs::data_local_dir()
                .unwrap_or_else(|| PathBuf::from("~/.local/share"))
                .join("teleq")
                .join("events.db"),
            max_queue_size: DEFAULT_MAX_QUEUE_SIZE,
            max_age_seconds: DEFAULT_MAX_AGE_SECS,
            max_retries: DEFAULT_MAX_RETRIES,
        }
    }
}

impl Default for FlushConfig {
    fn default() -> Self {
        Self {
            batch_size: 100,
            upload_timeout_seconds: 10,
            background_budget_seconds: 5,
            prune_interval_seconds: 3600,
            intervals: IntervalsConfig::default(),
        }
    }
}

impl Default for IntervalsConfig {
    fn default() -> Self {
        Self {
            full: Some(15),
            normal: Some(30),
            reduced: Some(60),
            minimal: None,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Conversions into domain types
// ---------------------------------------------------------------------------

impl QueueConfig {
    /// Retention limits enforced by the store.
    pub fn retention(&self) -> RetentionPolicy {
        RetentionPolicy {
            max_queue_size: self.max_queue_size,
            max_age: Duration::from_secs(self.max_age_seconds),
            max_retries: self.max_retries,
        }
    }
}

impl FlushConfig {
    pub fn upload_timeout(&self) -> Duration {
        Duration::from_secs(self.upload_timeout_seconds)
    }

    pub fn background_budget(&self) -> Duration {
        Duration::from_secs(self.background_budget_seconds)
    }

    pub fn prune_interval(&self) -> Duration {
        Duration::from_secs(self.prune_interval_seconds)
    }
}

impl IntervalsConfig {
    pub fn to_intervals(&self) -> FlushIntervals {
        FlushIntervals {
            full: self.full.map(Duration::from_secs),
            normal: self.normal.map(Duration::from_secs),
            reduced: self.reduced.map(Duration::from_secs),
            minimal: self.minimal.map(Duration::from_secs),
        }
    }

    fn get(&self, mode: TelemetryMode) -> Option<u64> {
        match mode {
            TelemetryMode::Full => self.full,
            TelemetryMode::Normal => self.normal,
            TelemetryMode::Reduced => self.reduced,
            TelemetryMode::Minimal => self.minimal,
        }
    }
}

// ---------------------------------------------------------------------------
// Config::validate()
// ---------------------------------------------------------------------------

/// A single validation error found in the configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Dotted path to the offending field, e.g. `"flush.batch_size"`.
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

/// Valid values for `logging.format`.
const VALID_LOG_FORMATS: &[&str] = &["pretty", "json"];

impl Config {
    /// Validate the configuration and return all errors found.
    ///
    /// An empty vector means the configuration is valid.
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();
        let mut positive = |field: &str, value: u64| {
            if value == 0 {
                errors.push(ValidationError {
                    field: field.into(),
                    message: "must be greater than 0".into(),
                });
            }
        };

        // --- queue ---
        positive("queue.max_queue_size", self.queue.max_queue_size);
        positive("queue.max_age_seconds", self.queue.max_age_seconds);
        positive("queue.max_retries", u64::from(self.queue.max_retries));

        // --- flush ---
        positive("flush.batch_size", u64::from(self.flush.batch_size));
        positive(
            "flush.upload_timeout_seconds",
            self.flush.upload_timeout_seconds,
        );
        positive(
            "flush.background_budget_seconds",
            self.flush.background_budget_seconds,
        );
        positive(
            "flush.prune_interval_seconds",
            self.flush.prune_interval_seconds,
        );
        for mode in [
            TelemetryMode::Full,
            TelemetryMode::Normal,
            TelemetryMode::Reduced,
            TelemetryMode::Minimal,
        ] {
            if self.flush.intervals.get(mode) == Some(0) {
                errors.push(ValidationError {
                    field: format!("flush.intervals.{mode}"),
                    message: "must be greater than 0 (use null to disable)".into(),
                });
            }
        }

        if self.queue.database.as_os_str().is_empty() {
            errors.push(ValidationError {
                field: "queue.database".into(),
                message: "must not be empty".into(),
            });
        }

        if u64::from(self.flush.batch_size) > self.queue.max_queue_size
            && self.queue.max_queue_size > 0
        {
            errors.push(ValidationError {
                field: "flush.batch_size".into(),
                message: format!(
                    "must not exceed queue.max_queue_size ({})",
                    self.queue.max_queue_size
                ),
            });
        }

        // --- logging ---
        if !VALID_LOG_LEVELS.contains(&self.logging.level.as_str()) {
            errors.push(ValidationError {
                field: "logging.level".into(),
                message: format!(
                    "invalid level '{}'; expected one of: {}",
                    self.logging.level,
                    VALID_LOG_LEVELS.join(", ")
                ),
            });
        }
        if !VALID_LOG_FORMATS.contains(&self.logging.format.as_str()) {
            errors.push(ValidationError {
                field: "logging.format".into(),
                message: format!(
                    "invalid format '{}'; expected one of: {}",
                    self.logging.format,
                    VALID_LOG_FORMATS.join(", ")
                ),
            });
        }

        errors
    }
}

// ---------------------------------------------------------------------------
// ConfigBuilder
// ---------------------------------------------------------------------------

/// Fluent builder for [`Config`].
///
/// ```
/// use teleq_core::config::ConfigBuilder;
/// use std::path::PathBuf;
///
/// let config = ConfigBuilder::new()
///     .database(PathBuf::from("/tmp/events.db"))
///     .batch_size(50)
///     .logging_level("debug")
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

    // --- queue ---

    pub fn database(mut self, path: PathBuf) -> Self {
        self.config.queue.database = path;
        self
    }

    pub fn max_queue_size(mut self, n: u64) -> Self {
        self.config.queue.max_queue_size = n;
        self
    }

    pub fn max_age_seconds(mut self, seconds: u64) -> Self {
        self.config.queue.max_age_seconds = seconds;
        self
    }

    pub fn max_retries(mut self, n: u32) -> Self {
        self.config.queue.max_retries = n;
        self
    }

    // --- flush ---

    pub fn batch_size(mut self, n: u32) -> Self {
        self.config.flush.batch_size = n;
        self
    }

    pub fn upload_timeout_seconds(mut self, seconds: u64) -> Self {
        self.config.flush.upload_timeout_seconds = seconds;
        self
    }

    pub fn background_budget_seconds(mut self, seconds: u64) -> Self {
        self.config.flush.background_budget_seconds = seconds;
        self
    }

    pub fn prune_interval_seconds(mut self, seconds: u64) -> Self {
        self.config.flush.prune_interval_seconds = seconds;
        self
    }

    /// Set the periodic interval for one mode; `None` disables it.
    pub fn interval(mut self, mode: TelemetryMode, seconds: Option<u64>) -> Self {
        let intervals = &mut self.config.flush.intervals;
        match mode {
            TelemetryMode::Full => intervals.full = seconds,
            TelemetryMode::Normal => intervals.normal = seconds,
            TelemetryMode::Reduced => intervals.reduced = seconds,
            TelemetryMode::Minimal => intervals.minimal = seconds,
        }
        self
    }

    // --- logging ---

    pub fn logging_level(mut self, level: impl Into<String>) -> Self {
        self.config.logging.level = level.into();
        self
    }

    pub fn logging_format(mut self, format: impl Into<String>) -> Self {
        self.config.logging.format = format.into();
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

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    // -- Defaults --

    #[test]
    fn default_config_has_sensible_values() {
        let cfg = Config::default();
        assert_eq!(cfg.queue.max_queue_size, 10_000);
        assert_eq!(cfg.queue.max_age_seconds, 604_800);
        assert_eq!(cfg.queue.max_retries, 5);
        assert!(cfg.queue.database.ends_with("teleq/events.db"));
        assert_eq!(cfg.flush.batch_size, 100);
        assert_eq!(cfg.flush.upload_timeout_seconds, 10);
        assert_eq!(cfg.flush.background_budget_seconds, 5);
        assert_eq!(cfg.flush.prune_interval_seconds, 3600);
        assert_eq!(cfg.flush.intervals.full, Some(15));
        assert_eq!(cfg.flush.intervals.normal, Some(30));
        assert_eq!(cfg.flush.intervals.reduced, Some(60));
        assert_eq!(cfg.flush.intervals.minimal, None);
        assert_eq!(cfg.logging.level, "info");
        assert_eq!(cfg.logging.format, "pretty");
    }

    #[test]
    fn default_config_passes_validation() {
        let errors = Config::default().validate();
        assert!(errors.is_empty(), "unexpected validation errors: {errors:?}");
    }

    #[test]
    fn default_intervals_match_domain_defaults() {
        assert_eq!(
            IntervalsConfig::default().to_intervals(),
            FlushIntervals::default()
        );
    }

    #[test]
    fn retention_conversion() {
        let policy = ConfigBuilder::new()
            .max_queue_size(50)
            .max_age_seconds(120)
            .max_retries(2)
            .build()
            .queue
            .retention();
        assert_eq!(policy.max_queue_size, 50);
        assert_eq!(policy.max_age, Duration::from_secs(120));
        assert_eq!(policy.max_retries, 2);
    }

    // -- Loading --

    #[test]
    fn load_from_yaml_file() {
        let yaml = r#"
queue:
  database: /tmp/teleq-test/events.db
  max_queue_size: 500
  max_age_seconds: 86400
  max_retries: 3
flush:
  batch_size: 25
  upload_timeout_seconds: 4
  background_budget_seconds: 2
  prune_interval_seconds: 600
  intervals:
    full: 5
    normal: 20
    reduced: 90
    minimal: null
logging:
  level: debug
  format: json
"#;
        let mut tmp = tempfile::NamedTempFile::new().expect("create temp file");
        tmp.write_all(yaml.as_bytes()).unwrap();
        tmp.flush().unwrap();

        let cfg = Config::load(tmp.path()).expect("load config");
        assert_eq!(cfg.queue.database, PathBuf::from("/tmp/teleq-test/events.db"));
        assert_eq!(cfg.queue.max_queue_size, 500);
        assert_eq!(cfg.queue.max_age_seconds, 86_400);
        assert_eq!(cfg.queue.max_retries, 3);
        assert_eq!(cfg.flush.batch_size, 25);
        assert_eq!(cfg.flush.upload_timeout(), Duration::from_secs(4));
        assert_eq!(cfg.flush.background_budget(), Duration::from_secs(2));
        assert_eq!(cfg.flush.prune_interval(), Duration::from_secs(600));
        assert_eq!(cfg.flush.intervals.full, Some(5));
        assert_eq!(cfg.flush.intervals.reduced, Some(90));
        assert_eq!(cfg.flush.intervals.minimal, None);
        assert_eq!(cfg.logging.level, "debug");
        assert_eq!(cfg.logging.format, "json");
    }

    #[test]
    fn partial_yaml_fills_defaults() {
        let yaml = "flush:\n  batch_size: 10\n";
        let mut tmp = tempfile::NamedTempFile::new().expect("create temp file");
        tmp.write_all(yaml.as_bytes()).unwrap();
        tmp.flush().unwrap();

        let cfg = Config::load(tmp.path()).expect("load config");
        assert_eq!(cfg.flush.batch_size, 10);
        assert_eq!(cfg.flush.upload_timeout_seconds, 10);
        assert_eq!(cfg.queue.max_retries, 5);
        assert_eq!(cfg.flush.intervals.normal, Some(30));
    }

    #[test]
    fn load_or_default_returns_default_on_missing_file() {
        let cfg = Config::load_or_default(Path::new("/nonexistent/config.yaml"));
        assert_eq!(cfg.flush.batch_size, 100);
    }

    #[test]
    fn load_returns_error_on_invalid_yaml() {
        let mut tmp = tempfile::NamedTempFile::new().expect("create temp file");
        tmp.write_all(b"queue: [not, a, mapping").unwrap();
        tmp.flush().unwrap();

        assert!(Config::load(tmp.path()).is_err());
    }

    // -- Validation --

    #[test]
    fn validate_catches_zero_values() {
        let cfg = ConfigBuilder::new()
            .max_queue_size(0)
            .max_retries(0)
            .batch_size(0)
            .upload_timeout_seconds(0)
            .build();
        let fields: Vec<_> = cfg.validate().into_iter().map(|e| e.field).collect();
        assert!(fields.contains(&"queue.max_queue_size".to_string()));
        assert!(fields.contains(&"queue.max_retries".to_string()));
        assert!(fields.contains(&"flush.batch_size".to_string()));
        assert!(fields.contains(&"flush.upload_timeout_seconds".to_string()));
    }

    #[test]
    fn validate_catches_zero_interval() {
        let cfg = ConfigBuilder::new()
            .interval(TelemetryMode::Reduced, Some(0))
            .build();
        let errors = cfg.validate();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].field, "flush.intervals.reduced");
    }

    #[test]
    fn validate_accepts_disabled_intervals() {
        let cfg = ConfigBuilder::new()
            .interval(TelemetryMode::Normal, None)
            .interval(TelemetryMode::Minimal, None)
            .build();
        assert!(cfg.validate().is_empty());
    }

    #[test]
    fn validate_catches_batch_larger_than_queue() {
        let cfg = ConfigBuilder::new()
            .max_queue_size(10)
            .batch_size(20)
            .build();
        let errors = cfg.validate();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].field, "flush.batch_size");
    }

    #[test]
    fn validate_catches_invalid_log_level() {
        let cfg = ConfigBuilder::new().logging_level("verbose").build();
        let errors = cfg.validate();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].field, "logging.level");
    }

    #[test]
    fn validate_catches_invalid_log_format() {
        let cfg = ConfigBuilder::new().logging_format("xml").build();
        let errors = cfg.validate();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].field, "logging.format");
    }

    #[test]
    fn validate_accepts_all_valid_log_levels() {
        for level in VALID_LOG_LEVELS {
            let cfg = ConfigBuilder::new().logging_level(*level).build();
            assert!(cfg.validate().is_empty(), "level {level} should be valid");
        }
    }

    // -- Builder --

    #[test]
    fn builder_starts_from_defaults() {
        let cfg = ConfigBuilder::new().build();
        assert_eq!(cfg.flush.batch_size, Config::default().flush.batch_size);
    }

    #[test]
    fn builder_build_validated_fails_for_invalid_config() {
        let result = ConfigBuilder::new().batch_size(0).build_validated();
        let errors = result.unwrap_err();
        assert!(errors.iter().any(|e| e.field == "flush.batch_size"));
    }

    #[test]
    fn builder_build_validated_succeeds_for_valid_config() {
        let cfg = ConfigBuilder::new()
            .database(PathBuf::from("/tmp/x.db"))
            .build_validated()
            .expect("valid config");
        assert_eq!(cfg.queue.database, PathBuf::from("/tmp/x.db"));
    }

    // -- Misc --

    #[test]
    fn default_path_ends_with_config_yaml() {
        let path = Config::default_path();
        assert!(path.ends_with("teleq/config.yaml"));
    }

    #[test]
    fn validation_error_display() {
        let err = ValidationError {
            field: "flush.batch_size".into(),
            message: "must be greater than 0".into(),
        };
        assert_eq!(err.to_string(), "flush.batch_size: must be greater than 0");
    }

    #[test]
    fn config_roundtrips_through_yaml() {
        let cfg = ConfigBuilder::new()
            .interval(TelemetryMode::Full, Some(7))
            .build();
        let yaml = serde_yaml::to_string(&cfg).unwrap();
        let back: Config = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(back.flush.intervals, cfg.flush.intervals);
        assert_eq!(back.queue.database, cfg.queue.database);
    }
}
