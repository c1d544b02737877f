//! Error types for the taskdeck-tree crate

use miette::Diagnostic;
use std::path::PathBuf;
use thiserror::Error;

/// Main error type for task tree operations
#[derive(Error, Debug, Diagnostic)]
pub enum Error {
    /// A logic defect inside the engine or its caller.
    ///
    /// These are never produced by bad external data; they mean an invariant
    /// of the tree was broken (for example regrouping an already grouped
    /// container, or placing a record whose scope cannot be resolved).
    #[error("Precondition violated: {message}")]
    #[diagnostic(
        code(taskdeck_tree::precondition),
        help("This is a bug in the caller or in taskdeck-tree itself")
    )]
    Precondition {
        /// Description of the violated precondition
        message: String,
    },

    /// Configuration error
    #[error("Configuration error: {message}")]
    #[diagnostic(code(taskdeck_tree::config::invalid))]
    Configuration {
        /// The error message describing the configuration issue
        message: String,
    },

    /// I/O error with path context
    #[error("I/O error during {operation}: {source}")]
    #[diagnostic(code(taskdeck_tree::io::error))]
    Io {
        /// The underlying I/O error
        #[source]
        source: std::io::Error,
        /// The path where the I/O error occurred, if applicable
        path: Option<Box<std::path::Path>>,
        /// Description of the operation that failed
        operation: String,
    },

    /// Serialization/deserialization error
    #[error("Serialization error: {message}")]
    #[diagnostic(code(taskdeck_tree::serialization))]
    Serialization {
        /// The error message describing the serialization issue
        message: String,
    },

    /// A task provider failed to list tasks
    #[error("Task provider failed: {message}")]
    #[diagnostic(code(taskdeck_tree::provider))]
    Provider {
        /// The error message reported by the provider
        message: String,
    },

    /// The persistence collaborator failed
    #[error("Storage error: {message}")]
    #[diagnostic(code(taskdeck_tree::storage))]
    Storage {
        /// The error message reported by the storage layer
        message: String,
    },

    /// A task id that is not in the current tree
    #[error("Unknown task: {id}")]
    #[diagnostic(
        code(taskdeck_tree::unknown_task),
        help("Task ids are listed by `taskdeck tree --ids`")
    )]
    UnknownTask {
        /// The id that was looked up
        id: String,
    },

    /// Timeout error
    #[error("Operation timed out after {millis} ms")]
    #[diagnostic(code(taskdeck_tree::timeout))]
    Timeout {
        /// The number of milliseconds waited before giving up
        millis: u64,
    },
}

impl Error {
    /// Create a precondition violation
    pub fn precondition(message: impl Into<String>) -> Self {
        Self::Precondition {
            message: message.into(),
        }
    }

    /// Create a configuration error with a message
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create an I/O error with context
    pub fn io(source: std::io::Error, path: Option<PathBuf>, operation: impl Into<String>) -> Self {
        Self::Io {
            source,
            path: path.map(|p| p.into_boxed_path()),
            operation: operation.into(),
        }
    }

    /// Create a serialization error
    pub fn serialization(message: impl Into<String>) -> Self {
        Self::Serialization {
            message: message.into(),
        }
    }

    /// Create a provider error
    pub fn provider(message: impl Into<String>) -> Self {
        Self::Provider {
            message: message.into(),
        }
    }

    /// Create a storage error
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage {
            message: message.into(),
        }
    }

    /// Create an unknown task error
    pub fn unknown_task(id: impl Into<String>) -> Self {
        Self::UnknownTask { id: id.into() }
    }

    /// Whether this error indicates a logic defect rather than bad input
    #[must_use]
    pub const fn is_precondition(&self) -> bool {
        matches!(self, Self::Precondition { .. })
    }
}

/// Result type for task tree operations
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_precondition_display() {
        let err = Error::precondition("container npm is already grouped");
        assert_eq!(
            err.to_string(),
            "Precondition violated: container npm is already grouped"
        );
        assert!(err.is_precondition());
    }

    #[test]
    fn test_io_error_keeps_path() {
        let err = Error::io(
            std::io::Error::new(std::io::ErrorKind::NotFound, "gone"),
            Some(PathBuf::from("/tmp/state.json")),
            "read",
        );
        match err {
            Error::Io { path, operation, .. } => {
                assert_eq!(operation, "read");
                assert_eq!(path.as_deref(), Some(std::path::Path::new("/tmp/state.json")));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_timeout_is_not_precondition() {
        let err = Error::Timeout { millis: 500 };
        assert!(!err.is_precondition());
        assert_eq!(err.to_string(), "Operation timed out after 500 ms");
    }
}
