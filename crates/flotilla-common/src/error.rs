//! Unified error types for the Flotilla workspace.
//!
//! Declarative mistakes surface as [`FlotillaError::Config`] or, when they
//! concern the shape of the dependency graph, [`FlotillaError::Dependency`].
//! Both count as configuration errors for callers that only care about
//! that distinction.

use std::path::PathBuf;

use thiserror::Error;

/// Top-level error type shared across the workspace.
#[derive(Debug, Error)]
pub enum FlotillaError {
    /// An I/O operation failed.
    #[error("I/O error at {path}: {source}")]
    Io {
        /// Path where the I/O error occurred.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// The service configuration is invalid.
    #[error("invalid configuration: {message}")]
    Config {
        /// Description of the invalid configuration.
        message: String,
    },

    /// Services reference each other in a way that cannot be ordered.
    #[error("dependency error: {message}")]
    Dependency {
        /// Names the offending services.
        message: String,
    },

    /// A service lookup by name failed.
    #[error("No such service: {name}")]
    NoSuchService {
        /// The name that was requested.
        name: String,
    },

    /// A runtime object was not found.
    #[error("{kind} not found: {id}")]
    NotFound {
        /// Type of the missing resource.
        kind: &'static str,
        /// Identifier of the missing resource.
        id: String,
    },

    /// A call into the container runtime failed.
    #[error("runtime {operation} failed: {message}")]
    Runtime {
        /// Runtime operation that was attempted.
        operation: &'static str,
        /// Message reported by the runtime.
        message: String,
    },

    /// YAML configuration could not be parsed.
    #[error("YAML error: {source}")]
    Yaml {
        /// Underlying YAML error.
        #[from]
        source: serde_yaml::Error,
    },

    /// JSON returned by the runtime could not be parsed.
    #[error("serialization error: {source}")]
    Serialization {
        /// Underlying serialization error.
        #[from]
        source: serde_json::Error,
    },
}

impl FlotillaError {
    /// Builds a [`FlotillaError::Config`] from a message.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Builds a [`FlotillaError::Dependency`] from a message.
    pub fn dependency(message: impl Into<String>) -> Self {
        Self::Dependency {
            message: message.into(),
        }
    }

    /// Returns `true` for declarative mistakes, including dependency errors.
    #[must_use]
    pub const fn is_configuration_error(&self) -> bool {
        matches!(self, Self::Config { .. } | Self::Dependency { .. })
    }

    /// Returns `true` if the runtime reported a missing object of `kind`.
    #[must_use]
    pub fn is_not_found(&self, kind: &str) -> bool {
        matches!(self, Self::NotFound { kind: k, .. } if *k == kind)
    }
}

/// Convenience alias used throughout the workspace.
pub type Result<T> = std::result::Result<T, FlotillaError>;
