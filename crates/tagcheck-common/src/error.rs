//! Unified error types for the tagcheck workspace.
//!
//! Failures that belong to a single tag's test run are not errors at this
//! level: the orchestrator turns them into report entries. What remains here
//! aborts a whole run.

use std::path::PathBuf;

use thiserror::Error;

/// Top-level error type shared across the workspace.
#[derive(Debug, Error)]
pub enum HarnessError {
    /// A required setting is missing or invalid.
    #[error("invalid configuration: {message}")]
    Config {
        /// Description of the invalid configuration.
        message: String,
    },

    /// The container engine cannot be reached.
    #[error("container runtime unavailable: {message}")]
    RuntimeUnavailable {
        /// Reason reported by the engine or the lookup.
        message: String,
    },

    /// The image reference is invalid or cannot be pulled.
    #[error("image not found: {image}")]
    ImageNotFound {
        /// Image reference that was requested.
        image: String,
    },

    /// A command could not be executed inside a container.
    #[error("exec of `{command}` failed: {message}")]
    ExecFailed {
        /// Command line that was attempted.
        command: String,
        /// Description of the failure.
        message: String,
    },

    /// An engine command failed for a reason not covered above.
    #[error("container engine error during {operation}: {message}")]
    Engine {
        /// Engine operation that failed.
        operation: &'static str,
        /// Output or description of the failure.
        message: String,
    },

    /// A required resource was not found.
    #[error("{kind} not found: {id}")]
    NotFound {
        /// Type of the missing resource.
        kind: &'static str,
        /// Identifier of the missing resource.
        id: String,
    },

    /// An I/O operation failed.
    #[error("I/O error at {path}: {source}")]
    Io {
        /// Path where the I/O error occurred.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// Serialization or deserialization failed.
    #[error("serialization error: {source}")]
    Serialization {
        /// Underlying serialization error.
        #[from]
        source: serde_json::Error,
    },

    /// Publishing artifacts to durable storage failed.
    #[error("upload of {key} failed: {message}")]
    Upload {
        /// Storage key being written.
        key: String,
        /// Description of the failure.
        message: String,
    },
}

impl HarnessError {
    /// Shorthand for [`HarnessError::Config`].
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Builds an [`HarnessError::Io`] for the given path.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Convenience alias used throughout the workspace.
pub type Result<T> = std::result::Result<T, HarnessError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_error_message_is_prefixed() {
        let err = HarnessError::config("IMAGE is not set");
        assert_eq!(err.to_string(), "invalid configuration: IMAGE is not set");
    }

    #[test]
    fn io_error_mentions_path() {
        let err = HarnessError::io(
            "/tmp/out",
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        );
        assert!(err.to_string().contains("/tmp/out"));
    }
}
