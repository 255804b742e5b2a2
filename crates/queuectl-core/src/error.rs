//! Unified error type for every queuectl layer.

use std::fmt::Debug;
use thiserror::Error;

/// Unified error type for queuectl.
///
/// Variants are grouped into user errors (bad input, missing or
/// wrongly-stated jobs) and infrastructure errors (storage, configuration,
/// process spawning). A non-zero exit code from a job's command is never an
/// error; it is recorded as an [`ExecutionOutcome`](crate::ExecutionOutcome).
#[derive(Error, Debug)]
pub enum QueueError {
    // ============ User Errors ============
    /// Invalid job specification or argument
    #[error("Validation error: {0}")]
    Validation(String),

    /// Job not found
    #[error("Job not found: {0}")]
    NotFound(String),

    /// Job id already taken
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Job is not in the state an operation requires
    #[error("Invalid job state: expected {expected}, got {actual}")]
    InvalidState {
        /// State the operation needs.
        expected: String,
        /// State the job is in.
        actual: String,
    },

    /// Malformed JSON input
    #[error("Serialization error: {0}")]
    Serialization(String),

    // ============ Infrastructure Errors ============
    /// Storage error (connectivity, constraint violation, migration)
    #[error("Database error: {0}")]
    Database(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The job's command could not be started or awaited
    #[error("Execution error: {0}")]
    Execution(String),

    /// I/O error outside the database
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // ============ Internal Errors ============
    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),

    /// Generic error wrapper
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl QueueError {
    /// Process exit code for a one-shot CLI command that failed with this error.
    ///
    /// User errors exit with 2, infrastructure errors with 1.
    #[must_use]
    pub const fn exit_code(&self) -> i32 {
        if self.is_user_error() {
            2
        } else {
            1
        }
    }

    /// Returns a machine-readable error code.
    #[must_use]
    pub const fn error_code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::NotFound(_) => "NOT_FOUND",
            Self::Conflict(_) => "CONFLICT",
            Self::InvalidState { .. } => "INVALID_STATE",
            Self::Serialization(_) => "SERIALIZATION_ERROR",
            Self::Database(_) => "DATABASE_ERROR",
            Self::Configuration(_) => "CONFIGURATION_ERROR",
            Self::Execution(_) => "EXECUTION_ERROR",
            Self::Io(_) => "IO_ERROR",
            Self::Internal(_) | Self::Other(_) => "INTERNAL_ERROR",
        }
    }

    /// Checks if the error was caused by the caller's input.
    #[must_use]
    pub const fn is_user_error(&self) -> bool {
        matches!(
            self,
            Self::Validation(_)
                | Self::NotFound(_)
                | Self::Conflict(_)
                | Self::InvalidState { .. }
                | Self::Serialization(_)
        )
    }

    /// Creates a validation error.
    #[must_use]
    pub fn validation<T: Into<String>>(message: T) -> Self {
        Self::Validation(message.into())
    }

    /// Creates a not found error.
    #[must_use]
    pub fn not_found<T: ToString>(id: T) -> Self {
        Self::NotFound(id.to_string())
    }

    /// Creates a conflict error.
    #[must_use]
    pub fn conflict<T: Into<String>>(message: T) -> Self {
        Self::Conflict(message.into())
    }

    /// Creates a configuration error.
    #[must_use]
    pub fn configuration<T: Into<String>>(message: T) -> Self {
        Self::Configuration(message.into())
    }

    /// Creates an internal error.
    #[must_use]
    pub fn internal<T: Into<String>>(message: T) -> Self {
        Self::Internal(message.into())
    }
}

#[cfg(feature = "sqlx")]
impl From<sqlx::Error> for QueueError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::Database(db_err) => {
                if let Some(code) = db_err.code() {
                    // SQLite primary key / unique, MySQL duplicate entry
                    if code == "1555" || code == "2067" || code == "1062" {
                        return Self::Conflict(db_err.message().to_string());
                    }
                }
                Self::Database(err.to_string())
            }
            _ => Self::Database(err.to_string()),
        }
    }
}

#[cfg(feature = "sqlx")]
impl From<sqlx::migrate::MigrateError> for QueueError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        Self::Database(format!("Migration failed: {}", err))
    }
}

impl From<serde_json::Error> for QueueError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_errors_exit_with_two() {
        assert_eq!(QueueError::validation("missing command").exit_code(), 2);
        assert_eq!(QueueError::not_found("job-1").exit_code(), 2);
        assert_eq!(QueueError::conflict("job-1 exists").exit_code(), 2);
        assert_eq!(
            QueueError::InvalidState {
                expected: "dead".into(),
                actual: "pending".into(),
            }
            .exit_code(),
            2
        );
    }

    #[test]
    fn test_infrastructure_errors_exit_with_one() {
        assert_eq!(QueueError::Database("connection refused".into()).exit_code(), 1);
        assert_eq!(QueueError::configuration("empty url").exit_code(), 1);
        assert_eq!(QueueError::Execution("no shell".into()).exit_code(), 1);
        assert_eq!(QueueError::internal("oops").exit_code(), 1);
    }

    #[test]
    fn test_error_codes() {
        assert_eq!(QueueError::validation("x").error_code(), "VALIDATION_ERROR");
        assert_eq!(QueueError::not_found("x").error_code(), "NOT_FOUND");
        assert_eq!(QueueError::Database("x".into()).error_code(), "DATABASE_ERROR");
        assert_eq!(QueueError::internal("x").error_code(), "INTERNAL_ERROR");
    }

    #[test]
    fn test_json_error_is_a_user_error() {
        let err: QueueError = serde_json::from_str::<serde_json::Value>("{not json")
            .unwrap_err()
            .into();
        assert!(matches!(err, QueueError::Serialization(_)));
        assert!(err.is_user_error());
    }

    #[test]
    fn test_invalid_state_display() {
        let err = QueueError::InvalidState {
            expected: "dead".into(),
            actual: "completed".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("dead") && msg.contains("completed"));
    }
}
