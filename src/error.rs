//! Error types for courtcache.
//!
//! All errors are strongly typed using thiserror so callers can match on
//! the condition that occurred. Recoverable outcomes (rebuild failures,
//! cache misses) are reported as data and never appear here.

use thiserror::Error;

use crate::access::{Action, Resource, Role};
use crate::entity::EntityId;

/// Validation errors raised before any state is touched.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Counter '{field}' cannot be negative (got {value})")]
    NegativeCounter {
        field: &'static str,
        value: i64,
    },

    #[error("Progress update for {entity_id} sets no fields")]
    EmptyUpdate {
        entity_id: EntityId,
    },

    #[error("Window of {requested} years is outside the retained range 1..={retained}")]
    WindowOutOfRange {
        requested: u32,
        retained: u32,
    },

    #[error("Analytics payload for {entity_id} cannot be null")]
    NullPayload {
        entity_id: EntityId,
    },

    #[error("Error message cannot be empty")]
    EmptyErrorMessage,

    #[error("Invalid configuration: {reason}")]
    InvalidConfig {
        reason: String,
    },
}

/// A mutation or read was attempted by a caller the gate does not allow.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("Role '{role}' is not allowed to {action} {resource}")]
pub struct AuthorizationError {
    /// Role of the rejected caller.
    pub role: Role,
    /// Attempted action.
    pub action: Action,
    /// Target resource.
    pub resource: Resource,
}

/// Execution errors that occur while running an operation.
#[derive(Debug, Error)]
pub enum ExecutionError {
    #[error("Storage error: {message}")]
    Storage {
        message: String,
    },

    #[error("Job queue '{queue}' is full (capacity {capacity})")]
    QueueFull {
        queue: String,
        capacity: usize,
    },

    #[error("Job queue '{queue}' is disconnected")]
    Disconnected {
        queue: String,
    },

    #[error("Operation timed out after {duration_ms}ms")]
    Timeout {
        duration_ms: u64,
    },
}

/// Top-level error type for courtcache.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Authorization error: {0}")]
    Authorization(#[from] AuthorizationError),

    #[error("Execution error: {0}")]
    Execution(#[from] ExecutionError),

    #[error("Internal error: {message}")]
    Internal {
        message: String,
    },
}

impl CacheError {
    /// Creates an internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Returns true if this is a validation error.
    #[must_use]
    pub const fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }

    /// Returns true if this is an authorization error.
    #[must_use]
    pub const fn is_authorization(&self) -> bool {
        matches!(self, Self::Authorization(_))
    }

    /// Returns true if this is an execution error.
    #[must_use]
    pub const fn is_execution(&self) -> bool {
        matches!(self, Self::Execution(_))
    }

    /// Returns true if retrying the same call could succeed.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        match self {
            Self::Validation(_) | Self::Authorization(_) | Self::Internal { .. } => false,
            Self::Execution(e) => matches!(
                e,
                ExecutionError::QueueFull { .. } | ExecutionError::Timeout { .. }
            ),
        }
    }
}

impl From<crate::storage::StorageError> for CacheError {
    fn from(err: crate::storage::StorageError) -> Self {
        Self::Execution(ExecutionError::Storage {
            message: err.to_string(),
        })
    }
}

/// Result type alias for courtcache operations.
pub type CacheResult<T> = Result<T, CacheError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_error_negative_counter() {
        let err = ValidationError::NegativeCounter {
            field: "opinions_count",
            value: -3,
        };
        let msg = format!("{err}");
        assert!(msg.contains("opinions_count"));
        assert!(msg.contains("-3"));
    }

    #[test]
    fn test_validation_error_window() {
        let err = ValidationError::WindowOutOfRange {
            requested: 12,
            retained: 10,
        };
        let msg = format!("{err}");
        assert!(msg.contains("12"));
        assert!(msg.contains("1..=10"));
    }

    #[test]
    fn test_authorization_error_display() {
        let err = AuthorizationError {
            role: Role::Public,
            action: Action::Delete,
            resource: Resource::AnalyticsCache,
        };
        let msg = err.to_string();
        assert!(msg.contains("public"));
        assert!(msg.contains("delete"));
        assert!(msg.contains("analytics cache"));
    }

    #[test]
    fn test_cache_error_classification() {
        let err: CacheError = ValidationError::EmptyErrorMessage.into();
        assert!(err.is_validation());
        assert!(!err.is_retryable());

        let err: CacheError = AuthorizationError {
            role: Role::Authenticated,
            action: Action::Rebuild,
            resource: Resource::AggregateCache,
        }
        .into();
        assert!(err.is_authorization());
        assert!(!err.is_retryable());

        let err: CacheError = ExecutionError::QueueFull {
            queue: "maintenance".to_string(),
            capacity: 4,
        }
        .into();
        assert!(err.is_execution());
        assert!(err.is_retryable());
    }

    #[test]
    fn test_cache_error_from_storage() {
        let err: CacheError = crate::storage::StorageError::BackendError("disk gone".to_string()).into();
        assert!(err.is_execution());
        assert!(err.to_string().contains("disk gone"));
    }

    #[test]
    fn test_cache_error_internal() {
        let err = CacheError::internal("unexpected state");
        assert!(!err.is_retryable());
        assert!(err.to_string().contains("unexpected state"));
    }
}
