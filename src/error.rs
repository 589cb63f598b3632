//! Error types for geofence-rules
//!
//! Each layer has its own `thiserror` enum: configuration, rule stores,
//! geometry and access resolution. The binary wraps them in `anyhow`.

use crate::model::RuleId;
use thiserror::Error;

/// Configuration-related errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    Load(String),

    #[error("Invalid configuration: {message}")]
    Invalid { message: String },
}

/// Errors raised by rule stores and the administration services
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RuleError {
    #[error("Invalid rule: {message}")]
    Validation { message: String },

    #[error("Invalid priority {priority}: priorities must not be negative")]
    NegativePriority { priority: i64 },

    #[error("Rule already has id {id}; new rules must not carry one")]
    IdAlreadyAssigned { id: RuleId },

    #[error("Rule id is required for this operation")]
    MissingId,

    #[error("Rule not found: {id}")]
    NotFound { id: RuleId },

    #[error("Conflicting rule: {message}")]
    Conflict { message: String },

    #[error("Found {count} rules with priority {priority}")]
    AmbiguousPriority { priority: i64, count: usize },

    #[error("Shift offset must be positive, got {offset}")]
    InvalidShiftOffset { offset: i64 },

    #[error("Priority {priority} cannot move by {delta} without overflowing")]
    PriorityOverflow { priority: i64, delta: i64 },

    #[error("Invalid filter: {message}")]
    InvalidFilter { message: String },
}

impl RuleError {
    pub fn validation(message: impl Into<String>) -> Self {
        RuleError::Validation {
            message: message.into(),
        }
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        RuleError::Conflict {
            message: message.into(),
        }
    }

    /// Whether the error is caused by the caller's input rather than the store
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            RuleError::Validation { .. }
                | RuleError::NegativePriority { .. }
                | RuleError::IdAlreadyAssigned { .. }
                | RuleError::MissingId
                | RuleError::InvalidShiftOffset { .. }
                | RuleError::PriorityOverflow { .. }
                | RuleError::InvalidFilter { .. }
                | RuleError::AmbiguousPriority { .. }
        )
    }
}

/// Geometry engine errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GeometryError {
    #[error("Unable to parse geometry '{input}': {reason}")]
    Parse { input: String, reason: String },

    #[error("Spatial reference mismatch: {left} vs {right}")]
    SridMismatch { left: u32, right: u32 },

    #[error("No transformation from EPSG:{from} to EPSG:{to}")]
    UnsupportedTransform { from: u32, to: u32 },
}

/// Errors surfaced while resolving an access request
#[derive(Error, Debug)]
pub enum AuthzError {
    #[error("Invalid request: {message}")]
    InvalidRequest { message: String },

    #[error("Rule store error: {0}")]
    Store(#[from] RuleError),

    #[error("Geometry error: {0}")]
    Geometry(#[from] GeometryError),
}

impl AuthzError {
    pub fn invalid_request(message: impl Into<String>) -> Self {
        AuthzError::InvalidRequest {
            message: message.into(),
        }
    }
}

/// Result type alias for rule store and service operations
pub type RuleResult<T> = std::result::Result<T, RuleError>;

/// Result type alias for access resolution
pub type AuthzResult<T> = std::result::Result<T, AuthzError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_classification() {
        assert!(RuleError::MissingId.is_validation());
        assert!(RuleError::NegativePriority { priority: -1 }.is_validation());
        assert!(RuleError::InvalidShiftOffset { offset: 0 }.is_validation());
        assert!(
            RuleError::PriorityOverflow {
                priority: i64::MAX,
                delta: 1
            }
            .is_validation()
        );
        assert!(!RuleError::conflict("dup").is_validation());
        assert!(!RuleError::NotFound { id: RuleId::new(7) }.is_validation());
    }

    #[test]
    fn test_error_messages() {
        let err = RuleError::AmbiguousPriority {
            priority: 10,
            count: 2,
        };
        assert!(err.to_string().contains("priority 10"));

        let err = AuthzError::from(RuleError::conflict("same identifier"));
        assert!(err.to_string().contains("same identifier"));

        let err = AuthzError::from(GeometryError::SridMismatch {
            left: 4326,
            right: 3857,
        });
        assert!(err.to_string().contains("4326"));
    }
}
