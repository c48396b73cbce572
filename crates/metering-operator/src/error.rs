//! Error types for the metering operator

use crate::dependency::DependencyViolations;
use thiserror::Error;

/// Errors that can occur while resolving reporting dependencies
#[derive(Error, Debug)]
pub enum OperatorError {
    /// Kubernetes API error
    #[error("Kubernetes API error: {0}")]
    KubeError(#[from] kube::Error),

    /// Resource not found
    #[error("Resource not found: {kind}/{name} in namespace {namespace}")]
    NotFound {
        kind: String,
        name: String,
        namespace: String,
    },

    /// Dependency chain reached the depth bound
    #[error("detected a cycle at depth {depth} for ReportGenerationQuery {name}")]
    CycleDetected { depth: usize, name: String },

    /// A ReportGenerationQuery was referenced again while on its own descent path
    #[error("cyclic ReportGenerationQuery reference: {}", .path.join(" -> "))]
    CyclicReference { path: Vec<String> },

    /// One or more dependencies are not ready
    #[error("{0}")]
    DependencyValidation(DependencyViolations),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// SQL statement failed
    #[error("Query failed: {0}")]
    QueryFailed(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// YAML serialization error
    #[error("YAML serialization error: {0}")]
    YamlError(#[from] serde_yaml::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for operator operations
pub type Result<T> = std::result::Result<T, OperatorError>;

impl OperatorError {
    /// Build a not-found error for a resource kind
    pub fn not_found(kind: impl Into<String>, namespace: &str, name: &str) -> Self {
        OperatorError::NotFound {
            kind: kind.into(),
            name: name.to_string(),
            namespace: namespace.to_string(),
        }
    }

    /// Check if this error is retryable
    ///
    /// Missing, cyclic and not-ready dependencies only change when another
    /// resource changes, so they are not retried on a timer.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            OperatorError::KubeError(_) | OperatorError::QueryFailed(_) | OperatorError::Io(_)
        )
    }

    /// Get a suggested requeue delay for retryable errors
    pub fn requeue_delay(&self) -> Option<std::time::Duration> {
        if self.is_retryable() {
            Some(std::time::Duration::from_secs(30))
        } else {
            None
        }
    }
}
