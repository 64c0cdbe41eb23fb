//! Configuration module for photomirror
//!
//! Provides the flat, fully-enumerated configuration record consumed by
//! [`SharedResources::setup`](crate::resources::SharedResources::setup),
//! with loading, validation, defaults, and a builder for programmatic use.
//! There is no dynamic property access: every recognized option is a field.

use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// LogLevel
// ---------------------------------------------------------------------------

/// Log verbosity forwarded to the logging collaborator
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        };
        write!(f, "{s}")
    }
}

impl FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "trace" => Ok(LogLevel::Trace),
            "debug" => Ok(LogLevel::Debug),
            "info" => Ok(LogLevel::Info),
            "warn" => Ok(LogLevel::Warn),
            "error" => Ok(LogLevel::Error),
            other => Err(format!("invalid log level '{other}'")),
        }
    }
}

// ---------------------------------------------------------------------------
// MetadataRate
// ---------------------------------------------------------------------------

/// Token-bucket parameters for pacing remote metadata listings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetadataRate {
    /// Tokens added per refill interval (also the bucket capacity)
    pub count: u32,
    /// Refill interval in milliseconds
    pub interval_ms: u64,
}

impl Default for MetadataRate {
    fn default() -> Self {
        Self {
            count: 10,
            interval_ms: 1_000,
        }
    }
}

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

/// Top-level configuration for photomirror
///
/// Credentials and the MFA callback port are only forwarded to the
/// authentication collaborator; the engine itself never reads them.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Root for all on-disk layout
    pub data_dir: PathBuf,
    /// Remote account username (forwarded to auth)
    pub username: String,
    /// Remote account password (forwarded to auth)
    pub password: String,
    /// Overrides the resource-file trust token when present
    pub trust_token: Option<String>,
    /// Clears the stored trust token on startup
    pub refresh_token: bool,
    /// MFA callback server port
    pub port: u16,
    /// Per-asset retry ceiling for downloads
    pub max_retries: u32,
    /// Write-phase download parallelism
    pub download_threads: u32,
    /// Cron hint consumed by the external scheduler, unused by the engine
    pub schedule: String,
    pub enable_crash_reporting: bool,
    pub fail_on_mfa: bool,
    pub force: bool,
    /// Forwarded to the remote provider contract; the engine core never
    /// edits remote state itself
    pub remote_delete: bool,
    pub silent: bool,
    pub log_to_cli: bool,
    pub suppress_warnings: bool,
    pub export_metrics: bool,
    pub log_level: LogLevel,
    pub metadata_rate: MetadataRate,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("/opt/photomirror/library"),
            username: String::new(),
            password: String::new(),
            trust_token: None,
            refresh_token: false,
            port: 80,
            max_retries: 10,
            download_threads: 5,
            schedule: "0 2 * * *".to_string(),
            enable_crash_reporting: true,
            fail_on_mfa: false,
            force: false,
            remote_delete: false,
            silent: false,
            log_to_cli: false,
            suppress_warnings: false,
            export_metrics: false,
            log_level: LogLevel::Info,
            metadata_rate: MetadataRate::default(),
        }
    }
}

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
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

/// A single validation error found in the configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Name of the offending field, e.g. `"download_threads"`.
    pub field: String,
    /// Human-readable explanation.
    pub message: String,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

impl Config {
    /// Validate the configuration and return all errors found.
    ///
    /// An empty vector means the configuration is valid.
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        if self.username.is_empty() {
            errors.push(ValidationError {
                field: "username".into(),
                message: "must not be empty".into(),
            });
        }
        if self.max_retries == 0 {
            errors.push(ValidationError {
                field: "max_retries".into(),
                message: "must be greater than 0".into(),
            });
        }
        if self.download_threads == 0 {
            errors.push(ValidationError {
                field: "download_threads".into(),
                message: "must be greater than 0".into(),
            });
        }
        if self.metadata_rate.count == 0 {
            errors.push(ValidationError {
                field: "metadata_rate.count".into(),
                message: "must be greater than 0".into(),
            });
        }
        if self.metadata_rate.interval_ms == 0 {
            errors.push(ValidationError {
                field: "metadata_rate.interval_ms".into(),
                message: "must be greater than 0".into(),
            });
        }
        if self.data_dir.as_os_str().is_empty() {
            errors.push(ValidationError {
                field: "data_dir".into(),
                message: "must not be empty".into(),
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
#[derive(Debug, Clone, Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Create a new builder initialised with [`Config::default`] values.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn data_dir(mut self, dir: PathBuf) -> Self {
        self.config.data_dir = dir;
        self
    }

    pub fn username(mut self, username: impl Into<String>) -> Self {
        self.config.username = username.into();
        self
    }

    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.config.password = password.into();
        self
    }

    pub fn trust_token(mut self, token: impl Into<String>) -> Self {
        self.config.trust_token = Some(token.into());
        self
    }

    pub fn refresh_token(mut self, refresh: bool) -> Self {
        self.config.refresh_token = refresh;
        self
    }

    pub fn port(mut self, port: u16) -> Self {
        self.config.port = port;
        self
    }

    pub fn max_retries(mut self, n: u32) -> Self {
        self.config.max_retries = n;
        self
    }

    pub fn download_threads(mut self, n: u32) -> Self {
        self.config.download_threads = n;
        self
    }

    pub fn schedule(mut self, cron: impl Into<String>) -> Self {
        self.config.schedule = cron.into();
        self
    }

    pub fn remote_delete(mut self, enabled: bool) -> Self {
        self.config.remote_delete = enabled;
        self
    }

    pub fn fail_on_mfa(mut self, enabled: bool) -> Self {
        self.config.fail_on_mfa = enabled;
        self
    }

    pub fn log_level(mut self, level: LogLevel) -> Self {
        self.config.log_level = level;
        self
    }

    pub fn metadata_rate(mut self, count: u32, interval_ms: u64) -> Self {
        self.config.metadata_rate = MetadataRate { count, interval_ms };
        self
    }

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

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
