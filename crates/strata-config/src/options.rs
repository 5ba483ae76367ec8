//! Options of the configuration engine itself.
//!
//! Each option struct has documented defaults, builder-style `with_*`
//! setters and a `from_env()` constructor reading `STRATA_CONFIG_*`
//! variables over the defaults.

use std::env;
use std::time::Duration;

use crate::{ConfigError, ConfigResult};

/// Environment variable enabling or disabling the loader.
pub const ENV_LOADER_ACTIVE: &str = "STRATA_CONFIG_LOADER_ACTIVE";
/// Environment variable overriding the base supplier id.
pub const ENV_BASE_ID: &str = "STRATA_CONFIG_BASE_ID";
/// Environment variable overriding the base file path.
pub const ENV_BASE_PATH: &str = "STRATA_CONFIG_BASE_PATH";
/// Environment variable overriding the base file format.
pub const ENV_BASE_FORMAT: &str = "STRATA_CONFIG_BASE_FORMAT";
/// Environment variable overriding the base supplier priority.
pub const ENV_BASE_PRIORITY: &str = "STRATA_CONFIG_BASE_PRIORITY";
/// Environment variable overriding the supplier list path.
pub const ENV_LIST_PATH: &str = "STRATA_CONFIG_LIST_PATH";
/// Environment variable setting the reload poll interval, in milliseconds.
pub const ENV_POLL_INTERVAL_MS: &str = "STRATA_CONFIG_POLL_INTERVAL_MS";
/// Environment variable overriding the default supplier format.
pub const ENV_DEFAULT_FORMAT: &str = "STRATA_CONFIG_DEFAULT_FORMAT";
/// Environment variable setting the HTTP timeout, in milliseconds.
pub const ENV_HTTP_TIMEOUT_MS: &str = "STRATA_CONFIG_HTTP_TIMEOUT_MS";

/// Options of a [`Config`](crate::Config).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigOptions {
    /// Interval of the background reload. Zero disables polling.
    pub poll_interval: Duration,
}

impl ConfigOptions {
    /// Create options with polling disabled.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the background reload interval.
    #[must_use]
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Read the options from the environment over the defaults.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::EnvParse` if a variable is set to an invalid value.
    pub fn from_env() -> ConfigResult<Self> {
        let mut options = Self::default();
        if let Some(interval) = env_millis(ENV_POLL_INTERVAL_MS)? {
            options.poll_interval = interval;
        }
        Ok(options)
    }
}

/// Options shared by the built-in supplier creators.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SupplierOptions {
    /// Format used when a description declares none.
    pub default_format: String,
    /// Timeout of every HTTP request issued by REST suppliers.
    pub http_timeout: Duration,
}

impl Default for SupplierOptions {
    fn default() -> Self {
        Self {
            default_format: "yaml".to_string(),
            http_timeout: Duration::from_secs(30),
        }
    }
}

impl SupplierOptions {
    /// Create options with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the format used when a description declares none.
    #[must_use]
    pub fn with_default_format(mut self, format: impl Into<String>) -> Self {
        self.default_format = format.into();
        self
    }

    /// Set the HTTP request timeout.
    #[must_use]
    pub fn with_http_timeout(mut self, timeout: Duration) -> Self {
        self.http_timeout = timeout;
        self
    }

    /// Read the options from the environment over the defaults.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::EnvParse` if a variable is set to an invalid value.
    pub fn from_env() -> ConfigResult<Self> {
        let mut options = Self::default();
        if let Some(format) = env_string(ENV_DEFAULT_FORMAT) {
            options.default_format = format;
        }
        if let Some(timeout) = env_millis(ENV_HTTP_TIMEOUT_MS)? {
            options.http_timeout = timeout;
        }
        Ok(options)
    }
}

/// Options of a [`ConfigLoader`](crate::ConfigLoader).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoaderOptions {
    /// Whether [`ConfigLoader::load`](crate::ConfigLoader::load) does anything.
    pub active: bool,
    /// Identifier of the base file supplier.
    pub base_id: String,
    /// Path of the base file.
    pub base_path: String,
    /// Format of the base file.
    pub base_format: String,
    /// Priority of the base file supplier.
    pub base_priority: i32,
    /// Path, in the merged configuration, of the supplier description list.
    pub list_path: String,
}

impl Default for LoaderOptions {
    fn default() -> Self {
        Self {
            active: true,
            base_id: "base".to_string(),
            base_path: "config/config.yaml".to_string(),
            base_format: "yaml".to_string(),
            base_priority: 0,
            list_path: "strata.config.suppliers".to_string(),
        }
    }
}

impl LoaderOptions {
    /// Create options with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Enable or disable the loader.
    #[must_use]
    pub fn with_active(mut self, active: bool) -> Self {
        self.active = active;
        self
    }

    /// Set the base supplier identifier.
    #[must_use]
    pub fn with_base_id(mut self, id: impl Into<String>) -> Self {
        self.base_id = id.into();
        self
    }

    /// Set the base file path and format.
    #[must_use]
    pub fn with_base_file(mut self, path: impl Into<String>, format: impl Into<String>) -> Self {
        self.base_path = path.into();
        self.base_format = format.into();
        self
    }

    /// Set the base supplier priority.
    #[must_use]
    pub fn with_base_priority(mut self, priority: i32) -> Self {
        self.base_priority = priority;
        self
    }

    /// Set the path of the supplier description list.
    #[must_use]
    pub fn with_list_path(mut self, path: impl Into<String>) -> Self {
        self.list_path = path.into();
        self
    }

    /// Read the options from the environment over the defaults.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::EnvParse` if a variable is set to an invalid value.
    pub fn from_env() -> ConfigResult<Self> {
        let mut options = Self::default();

        if let Some(value) = env_string(ENV_LOADER_ACTIVE) {
            options.active = parse_bool(&value)
                .ok_or_else(|| ConfigError::env_parse(ENV_LOADER_ACTIVE, "expected boolean"))?;
        }
        if let Some(id) = env_string(ENV_BASE_ID) {
            options.base_id = id;
        }
        if let Some(path) = env_string(ENV_BASE_PATH) {
            options.base_path = path;
        }
        if let Some(format) = env_string(ENV_BASE_FORMAT) {
            options.base_format = format;
        }
        if let Some(value) = env_string(ENV_BASE_PRIORITY) {
            options.base_priority = value
                .parse()
                .map_err(|_| ConfigError::env_parse(ENV_BASE_PRIORITY, "expected integer"))?;
        }
        if let Some(path) = env_string(ENV_LIST_PATH) {
            options.list_path = path;
        }

        Ok(options)
    }
}

/// Load a `.env` file from the working directory or its parents.
///
/// A missing file is not an error.
pub fn load_dotenv() {
    if let Ok(path) = dotenvy::dotenv() {
        tracing::debug!(path = %path.display(), "loaded .env file");
    }
}

fn env_string(var: &str) -> Option<String> {
    env::var(var).ok()
}

fn env_millis(var: &str) -> ConfigResult<Option<Duration>> {
    env_string(var)
        .map(|value| {
            value
                .parse::<u64>()
                .map(Duration::from_millis)
                .map_err(|_| ConfigError::env_parse(var, "expected milliseconds"))
        })
        .transpose()
}

/// Parse a boolean from a string.
fn parse_bool(s: &str) -> Option<bool> {
    match s.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}
