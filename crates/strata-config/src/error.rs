//! Configuration error types.

use std::path::PathBuf;
use thiserror::Error;

/// Result type for configuration operations.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Errors that can occur while building, merging or reading configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// A required argument was missing.
    #[error("missing required argument: {0}")]
    NilArgument(&'static str),

    /// A path with no addressable segment was used where one is required.
    #[error("empty configuration path")]
    EmptyPath,

    /// Nothing is stored at the requested path.
    #[error("configuration path not found: {path}")]
    PathNotFound {
        /// The dotted path that was looked up.
        path: String,
    },

    /// The stored value cannot be converted to the requested type.
    #[error("invalid conversion at {path}: expected {expected}, found {found}")]
    Conversion {
        /// The dotted path that was looked up.
        path: String,
        /// The requested type.
        expected: &'static str,
        /// The type actually stored.
        found: &'static str,
    },

    /// No parser accepts the declared format.
    #[error("unrecognized configuration format: {format}")]
    InvalidFormat {
        /// The declared format.
        format: String,
    },

    /// A supplier description could not be turned into a supplier.
    #[error("invalid supplier description: {reason}")]
    InvalidSupplier {
        /// Why the description was rejected.
        reason: String,
    },

    /// No supplier is registered under the identifier.
    #[error("configuration supplier not found: {id}")]
    SupplierNotFound {
        /// The supplier identifier.
        id: String,
    },

    /// A supplier is already registered under the identifier.
    #[error("duplicate configuration supplier: {id}")]
    DuplicateSupplier {
        /// The supplier identifier.
        id: String,
    },

    /// Failed to access a configuration file or directory.
    #[error("failed to access {path}")]
    Io {
        /// Path of the file or directory.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// The content could not be decoded in the declared format.
    #[error("failed to parse {format} configuration: {message}")]
    Parse {
        /// The declared format.
        format: &'static str,
        /// Decoder message.
        message: String,
    },

    /// HTTP transport error.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The remote endpoint answered with a non-success status.
    #[error("HTTP request to {uri} returned status {status}")]
    HttpStatus {
        /// Requested URI.
        uri: String,
        /// Response status code.
        status: u16,
    },

    /// A timestamp field is not a valid RFC3339 timestamp.
    #[error("invalid timestamp {value:?}")]
    Timestamp {
        /// The raw timestamp value.
        value: String,
        /// Underlying error.
        #[source]
        source: chrono::ParseError,
    },

    /// A struct could not be populated from a partial.
    #[error("failed to populate {path}: {message}")]
    Populate {
        /// The dotted path that was populated from.
        path: String,
        /// Deserializer message.
        message: String,
    },

    /// Failed to parse an option from an environment variable.
    #[error("failed to parse environment variable {var}: {reason}")]
    EnvParse {
        /// The environment variable name.
        var: String,
        /// Explanation of the parsing error.
        reason: String,
    },

    /// Background polling was requested outside of a tokio runtime.
    #[error("background reload requires a tokio runtime: {0}")]
    Runtime(String),

    /// A blocking load task panicked or was cancelled.
    #[error("configuration load task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl ConfigError {
    /// Create a new path not found error.
    pub fn path_not_found(path: impl Into<String>) -> Self {
        Self::PathNotFound { path: path.into() }
    }

    /// Create a new conversion error.
    pub fn conversion(path: impl Into<String>, expected: &'static str, found: &'static str) -> Self {
        Self::Conversion {
            path: path.into(),
            expected,
            found,
        }
    }

    /// Create a new invalid format error.
    pub fn invalid_format(format: impl Into<String>) -> Self {
        Self::InvalidFormat {
            format: format.into(),
        }
    }

    /// Create a new invalid supplier error.
    pub fn invalid_supplier(reason: impl Into<String>) -> Self {
        Self::InvalidSupplier {
            reason: reason.into(),
        }
    }

    /// Create a new supplier not found error.
    pub fn supplier_not_found(id: impl Into<String>) -> Self {
        Self::SupplierNotFound { id: id.into() }
    }

    /// Create a new duplicate supplier error.
    pub fn duplicate_supplier(id: impl Into<String>) -> Self {
        Self::DuplicateSupplier { id: id.into() }
    }

    /// Create a new I/O error bound to a path.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Create a new parse error.
    pub fn parse(format: &'static str, message: impl ToString) -> Self {
        Self::Parse {
            format,
            message: message.to_string(),
        }
    }

    /// Create a new environment variable parse error.
    pub fn env_parse(var: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::EnvParse {
            var: var.into(),
            reason: reason.into(),
        }
    }

    /// Returns true if the error means the path is absent.
    pub fn is_path_not_found(&self) -> bool {
        matches!(self, Self::PathNotFound { .. })
    }

    /// Returns true if the error is a type conversion failure, including
    /// a struct field that does not fit its stored value.
    pub fn is_conversion(&self) -> bool {
        matches!(self, Self::Conversion { .. } | Self::Populate { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_path_not_found_error() {
        let err = ConfigError::path_not_found("server.port");
        assert!(err.to_string().contains("server.port"));
        assert!(err.is_path_not_found());
        assert!(!err.is_conversion());
    }

    #[test]
    fn test_conversion_error() {
        let err = ConfigError::conversion("server.port", "int", "string");
        let message = err.to_string();
        assert!(message.contains("server.port"));
        assert!(message.contains("expected int"));
        assert!(message.contains("found string"));
        assert!(err.is_conversion());
    }

    #[test]
    fn test_supplier_errors() {
        assert!(ConfigError::duplicate_supplier("base")
            .to_string()
            .contains("base"));
        assert!(ConfigError::supplier_not_found("remote")
            .to_string()
            .contains("remote"));
        assert!(ConfigError::invalid_supplier("missing type")
            .to_string()
            .contains("missing type"));
    }

    #[test]
    fn test_io_error_keeps_source() {
        let source = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err = ConfigError::io("/etc/app/config.yaml", source);
        assert!(err.to_string().contains("/etc/app/config.yaml"));
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn test_env_parse_error() {
        let err = ConfigError::env_parse("STRATA_CONFIG_POLL_INTERVAL_MS", "expected integer");
        assert!(err.to_string().contains("STRATA_CONFIG_POLL_INTERVAL_MS"));
        assert!(err.to_string().contains("expected integer"));
    }
}
