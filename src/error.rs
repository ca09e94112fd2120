//! Unified error handling for SchedForge
//!
//! This module provides a centralized error type that consolidates the
//! failure modes of the scheduling pipeline. It implements error
//! categorization for:
//! - Schema errors (malformed DAG descriptions, missing tensor references)
//! - Graph errors (invariant violations that indicate corrupt input)
//! - I/O errors (file system, JSON parsing)
//! - Internal errors (bugs, broken scheduler invariants)

use std::fmt;

/// Unified error type for SchedForge
///
/// All fatal conditions surface as a value of this enum at the public
/// entry points; nothing inside the library aborts the process. The CLI
/// translates errors into a diagnostic plus a nonzero exit code.
#[derive(Debug, thiserror::Error)]
pub enum SchedForgeError {
    // ========== Schema Errors ==========
    /// A tensor name was referenced but never declared
    #[error("cannot find information of value {0}")]
    MissingTensor(String),

    /// A tensor was declared without a byte size
    #[error("no size recorded for tensor {0}")]
    MissingTensorSize(String),

    /// Two graph entities share a name that must be unique
    #[error("duplicate name in graph: {0}")]
    DuplicateName(String),

    // ========== Graph Invariant Violations ==========
    /// A consumed RESULT value has no defining op
    #[error("value {0} has no defining op")]
    UndefinedValue(String),

    /// A RESULT value was produced by more than one op
    #[error("value {0} already has a defining op")]
    Redefinition(String),

    /// The op subgraph is not acyclic
    #[error("graph is not a DAG: cycle involving op {0}")]
    CycleDetected(String),

    /// A parameter value appears as a graph output
    #[error("parameter value {0} cannot be a graph output")]
    ParamAsOutput(String),

    // ========== I/O Errors ==========
    /// File I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parse or serialize error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // ========== Internal Errors ==========
    /// Internal error (indicates a bug, not bad input)
    #[error("internal error: {0}")]
    Internal(String),
}

impl SchedForgeError {
    /// Categorize the error for handling decisions
    pub fn category(&self) -> ErrorCategory {
        match self {
            SchedForgeError::MissingTensor(_)
            | SchedForgeError::MissingTensorSize(_)
            | SchedForgeError::DuplicateName(_) => ErrorCategory::Schema,

            SchedForgeError::UndefinedValue(_)
            | SchedForgeError::Redefinition(_)
            | SchedForgeError::CycleDetected(_)
            | SchedForgeError::ParamAsOutput(_) => ErrorCategory::Graph,

            SchedForgeError::Io(_) | SchedForgeError::Json(_) => ErrorCategory::Io,

            SchedForgeError::Internal(_) => ErrorCategory::Internal,
        }
    }

    /// Check if this error indicates a malformed input file
    pub fn is_schema_error(&self) -> bool {
        matches!(self.category(), ErrorCategory::Schema)
    }

    /// Check if this error indicates a corrupt graph
    pub fn is_graph_error(&self) -> bool {
        matches!(self.category(), ErrorCategory::Graph)
    }

    /// Check if this is an internal error (indicates a bug)
    pub fn is_internal_error(&self) -> bool {
        matches!(self.category(), ErrorCategory::Internal)
    }
}

/// Error category for handling decisions
///
/// - Schema: the DAG description is malformed; fix the input file
/// - Graph: the constructed graph violates a structural invariant
/// - Io: file system or serialization failure
/// - Internal: a scheduler invariant broke; report as a bug
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Malformed DAG description
    Schema,
    /// Graph structural invariant violation
    Graph,
    /// File system or serialization failure
    Io,
    /// Internal error - indicates a bug
    Internal,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorCategory::Schema => write!(f, "Schema"),
            ErrorCategory::Graph => write!(f, "Graph"),
            ErrorCategory::Io => write!(f, "Io"),
            ErrorCategory::Internal => write!(f, "Internal"),
        }
    }
}

/// Helper type alias for Results using SchedForgeError
pub type SchedResult<T> = std::result::Result<T, SchedForgeError>;

/// Build an internal error with context
pub fn internal_err(msg: impl Into<String>) -> SchedForgeError {
    SchedForgeError::Internal(msg.into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_categories() {
        assert_eq!(
            SchedForgeError::MissingTensor("t0".to_string()).category(),
            ErrorCategory::Schema
        );
        assert_eq!(
            SchedForgeError::UndefinedValue("t0".to_string()).category(),
            ErrorCategory::Graph
        );
        assert_eq!(
            SchedForgeError::CycleDetected("op3".to_string()).category(),
            ErrorCategory::Graph
        );
        assert_eq!(
            SchedForgeError::Internal("oops".to_string()).category(),
            ErrorCategory::Internal
        );
    }

    #[test]
    fn test_error_predicates() {
        assert!(SchedForgeError::MissingTensor("t".to_string()).is_schema_error());
        assert!(SchedForgeError::ParamAsOutput("w".to_string()).is_graph_error());
        assert!(internal_err("bug").is_internal_error());
        assert!(!SchedForgeError::MissingTensor("t".to_string()).is_graph_error());
    }

    #[test]
    fn test_error_display() {
        let err = SchedForgeError::MissingTensor("conv1_out".to_string());
        assert_eq!(err.to_string(), "cannot find information of value conv1_out");

        let err = SchedForgeError::CycleDetected("op7".to_string());
        assert_eq!(err.to_string(), "graph is not a DAG: cycle involving op op7");
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "dag.json");
        let err: SchedForgeError = io_err.into();
        assert_eq!(err.category(), ErrorCategory::Io);
    }

    #[test]
    fn test_category_display() {
        assert_eq!(ErrorCategory::Schema.to_string(), "Schema");
        assert_eq!(ErrorCategory::Graph.to_string(), "Graph");
        assert_eq!(ErrorCategory::Io.to_string(), "Io");
        assert_eq!(ErrorCategory::Internal.to_string(), "Internal");
    }
}
