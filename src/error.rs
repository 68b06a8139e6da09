//! Custom error types for docs-as-code.
//!
//! This module provides structured error types so that each tool surface
//! (schema generation, traceability scanning, consumer runs) can report
//! failures with enough context to act on them.

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for docs-as-code operations
#[derive(Error, Debug)]
pub enum DocsError {
    // =========================================================================
    // Configuration Errors
    // =========================================================================
    /// Failed to load configuration
    #[error("Configuration error: {message}")]
    Config {
        message: String,
        path: Option<PathBuf>,
    },

    /// Invalid configuration value
    #[error("Invalid configuration: {field} - {reason}")]
    InvalidConfig { field: String, reason: String },

    /// Missing required file
    #[error("Missing required file: {path}")]
    MissingFile { path: PathBuf },

    // =========================================================================
    // Metamodel Errors
    // =========================================================================
    /// The metamodel YAML could not be parsed
    #[error("Failed to parse metamodel {path}: {source}")]
    Metamodel {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    /// Needs export could not be interpreted
    #[error("Invalid needs export: {message}")]
    Needs { message: String },

    // =========================================================================
    // Traceability Errors
    // =========================================================================
    /// A testcase in a test report is missing mandatory data
    #[error("Testcase '{testcase}': {reason}")]
    TestCase { testcase: String, reason: String },

    /// Malformed test report XML
    #[error("Failed to parse test report {path}: {message}")]
    TestReport { path: PathBuf, message: String },

    /// Git operation failed
    #[error("Git operation failed: {operation} - {message}")]
    Git { operation: String, message: String },

    /// Build runfiles could not be located
    #[error("Runfiles error: {message}")]
    Runfiles { message: String },

    // =========================================================================
    // Consumer Errors
    // =========================================================================
    /// Setting up a consumer repository failed
    #[error("Consumer '{consumer}' failed: {message}")]
    Consumer { consumer: String, message: String },

    /// Missing required tool
    #[error("Missing required tool: {tool}")]
    MissingTool { tool: String },

    // =========================================================================
    // Wrapped Errors
    // =========================================================================
    /// IO error wrapper
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// JSON error wrapper
    #[error(transparent)]
    Json(#[from] serde_json::Error),

    /// XML error wrapper
    #[error(transparent)]
    Xml(#[from] quick_xml::Error),

    /// Generic error wrapper
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl DocsError {
    // =========================================================================
    // Constructor helpers
    // =========================================================================

    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
            path: None,
        }
    }

    /// Create a configuration error with path
    pub fn config_with_path(message: impl Into<String>, path: PathBuf) -> Self {
        Self::Config {
            message: message.into(),
            path: Some(path),
        }
    }

    /// Create a needs export error
    pub fn needs(message: impl Into<String>) -> Self {
        Self::Needs {
            message: message.into(),
        }
    }

    /// Create a testcase error
    pub fn test_case(testcase: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::TestCase {
            testcase: testcase.into(),
            reason: reason.into(),
        }
    }

    /// Create a test report error
    pub fn test_report(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::TestReport {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Create a git error
    pub fn git(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Git {
            operation: operation.into(),
            message: message.into(),
        }
    }

    /// Create a runfiles error
    pub fn runfiles(message: impl Into<String>) -> Self {
        Self::Runfiles {
            message: message.into(),
        }
    }

    /// Create a consumer error
    pub fn consumer(consumer: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Consumer {
            consumer: consumer.into(),
            message: message.into(),
        }
    }

    // =========================================================================
    // Classification helpers
    // =========================================================================

    /// Check if this error came from user-supplied input (config, metamodel, reports)
    pub fn is_input_error(&self) -> bool {
        matches!(
            self,
            Self::Config { .. }
                | Self::InvalidConfig { .. }
                | Self::Metamodel { .. }
                | Self::Needs { .. }
                | Self::TestCase { .. }
                | Self::TestReport { .. }
        )
    }

    /// Get error code for exit status
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::MissingFile { .. } | Self::MissingTool { .. } => 2,
            Self::Metamodel { .. } | Self::Needs { .. } => 3,
            Self::TestCase { .. } | Self::TestReport { .. } => 4,
            Self::Git { .. } => 5,
            Self::Consumer { .. } => 6,
            Self::Config { .. } | Self::InvalidConfig { .. } => 7,
            _ => 1,
        }
    }
}

/// Type alias for docs-as-code results
pub type Result<T> = std::result::Result<T, DocsError>;

/// Extension trait for attaching docs-as-code context to foreign errors
pub trait IntoDocsError<T> {
    fn into_docs_config(self) -> Result<T>;
    fn into_docs_git(self, operation: &str) -> Result<T>;
}

impl<T, E: Into<anyhow::Error>> IntoDocsError<T> for std::result::Result<T, E> {
    fn into_docs_config(self) -> Result<T> {
        self.map_err(|e| DocsError::config(e.into().to_string()))
    }

    fn into_docs_git(self, operation: &str) -> Result<T> {
        self.map_err(|e| DocsError::git(operation, e.into().to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = DocsError::test_case("TC_01", "missing 'file' attribute");
        assert!(err.to_string().contains("TC_01"));
        assert!(err.to_string().contains("missing 'file' attribute"));
    }

    #[test]
    fn test_is_input_error() {
        assert!(DocsError::config("bad").is_input_error());
        assert!(DocsError::needs("no versions").is_input_error());
        assert!(!DocsError::git("rev-parse", "not a repo").is_input_error());
    }

    #[test]
    fn test_exit_codes() {
        assert_eq!(
            DocsError::MissingTool {
                tool: "bazel".into()
            }
            .exit_code(),
            2
        );
        assert_eq!(DocsError::git("clone", "denied").exit_code(), 5);
        assert_eq!(DocsError::config("test").exit_code(), 7);
        assert_eq!(DocsError::runfiles("gone").exit_code(), 1);
    }

    #[test]
    fn test_config_with_path() {
        let path = PathBuf::from("/test/docs-as-code.toml");
        let err = DocsError::config_with_path("failed to parse", path.clone());
        if let DocsError::Config {
            message,
            path: opt_path,
        } = err
        {
            assert_eq!(message, "failed to parse");
            assert_eq!(opt_path, Some(path));
        } else {
            panic!("Wrong error variant");
        }
    }

    #[test]
    fn test_git_error() {
        let err = DocsError::git("remote", "no remotes configured");
        if let DocsError::Git { operation, message } = err {
            assert_eq!(operation, "remote");
            assert_eq!(message, "no remotes configured");
        } else {
            panic!("Wrong error variant");
        }
    }

    #[test]
    fn test_into_docs_error_trait() {
        let result: std::result::Result<(), std::io::Error> = Err(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            "file not found",
        ));

        let docs_result = result.into_docs_git("rev-parse");
        if let Err(DocsError::Git { operation, message }) = docs_result {
            assert_eq!(operation, "rev-parse");
            assert!(message.contains("file not found"));
        } else {
            panic!("Wrong error variant after conversion");
        }
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "access denied");
        let err: DocsError = io_err.into();
        assert!(matches!(err, DocsError::Io(_)));
        assert!(err.to_string().contains("access denied"));
    }
}
