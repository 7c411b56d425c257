//! Error types for IronVec

use thiserror::Error;

/// The main error type for IronVec operations
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    // Contract violations: the plan handed to the executor is malformed
    #[error("Evaluator not initialized: no input chunk is bound")]
    EvaluatorNotInitialized,

    #[error("Invalid column index {index}: input has {column_count} columns")]
    InvalidColumnIndex { index: usize, column_count: usize },

    // Evaluation errors
    #[error("Recursive aggregate: {0}")]
    RecursiveAggregate(String),

    #[error("Data type mismatch: expected {expected}, got {got}")]
    TypeMismatch { expected: String, got: String },

    #[error("Invalid type cast from {from} to {to}")]
    InvalidCast { from: String, to: String },

    #[error("Cannot cast {value} to {to}")]
    CastFailed { value: String, to: String },

    #[error("Invalid arguments: {0}")]
    InvalidArguments(String),

    #[error("Division by zero")]
    DivisionByZero,

    #[error("Overflow in {operation}")]
    Overflow { operation: String },

    #[error("Execution error: {0}")]
    Execution(String),

    #[error("Query cancelled")]
    Cancelled,

    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    // General errors
    #[error("Not implemented: {0}")]
    NotImplemented(String),

    #[error("Not supported: {0}")]
    NotSupported(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Returns false for errors that mean the plan itself is broken.
    ///
    /// A query that hits one of these is aborted as a whole: sibling tasks
    /// of the same fragment are not allowed to run further passes.
    pub fn is_recoverable(&self) -> bool {
        !matches!(
            self,
            Error::EvaluatorNotInitialized | Error::InvalidColumnIndex { .. } | Error::Internal(_)
        )
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Config(e.to_string())
    }
}

/// Result type alias using IronVec's Error
pub type Result<T> = std::result::Result<T, Error>;
