//! Domain-specific error types following panic-free policy.

use thiserror::Error;

/// Errors that can occur in domain operations.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DomainError {
    /// Battery percentage outside 0-100
    #[error("Invalid battery percentage: {value} (expected 0-100)")]
    InvalidBattery { value: i64 },

    /// Invalid configuration value
    #[error("Invalid {field}: {value} (expected {expected})")]
    InvalidFieldValue {
        field: String,
        value: String,
        expected: String,
    },
}

/// Result type for domain operations.
pub type DomainResult<T> = Result<T, DomainError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_field_display() {
        let err = DomainError::InvalidFieldValue {
            field: "stop_threshold".to_string(),
            value: "120".to_string(),
            expected: "0-100".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Invalid stop_threshold: 120 (expected 0-100)"
        );
    }

    #[test]
    fn test_invalid_battery_display() {
        let err = DomainError::InvalidBattery { value: 101 };
        assert!(err.to_string().contains("101"));
    }
}
