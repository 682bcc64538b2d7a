//! Domain error types
//!
//! This module defines error types specific to domain operations,
//! such as rejected event tags, unknown priorities and bad identifiers.

use thiserror::Error;

/// Errors that can occur in domain operations
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// Event type tag is empty, too long or contains invalid characters
    #[error("Invalid event type: {0}")]
    InvalidEventType(String),

    /// Priority name or stored rank is not recognised
    #[error("Invalid priority: {0}")]
    InvalidPriority(String),

    /// Connectivity, thermal state or another device reading is not recognised
    #[error("Invalid device reading: {0}")]
    InvalidReading(String),

    /// Generic validation failure
    #[error("Validation failed: {0}")]
    ValidationFailed(String),

    /// ID parsing error
    #[error("Invalid ID format: {0}")]
    InvalidId(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = DomainError::InvalidEventType("Bad Tag".to_string());
        assert_eq!(err.to_string(), "Invalid event type: Bad Tag");

        let err = DomainError::InvalidPriority("urgent".to_string());
        assert_eq!(err.to_string(), "Invalid priority: urgent");

        let err = DomainError::InvalidId("-3".to_string());
        assert_eq!(err.to_string(), "Invalid ID format: -3");
    }

    #[test]
    fn test_error_equality() {
        let err1 = DomainError::InvalidEventType("x y".to_string());
        let err2 = DomainError::InvalidEventType("x y".to_string());
        let err3 = DomainError::InvalidEventType("other".to_string());

        assert_eq!(err1, err2);
        assert_ne!(err1, err3);
    }
}
