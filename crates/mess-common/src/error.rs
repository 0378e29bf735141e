//! Validation errors

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Field-level constraint violation, surfaced to the caller with the
/// offending field name.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("validation failed on `{field}`: {message}")]
pub struct ValidationError {
    /// Field that failed validation
    pub field: String,
    /// Human-readable reason
    pub message: String,
}

impl ValidationError {
    /// Build a validation error for a named field
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Result alias for validation checks
pub type ValidationResult<T> = Result<T, ValidationError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_error_display() {
        let err = ValidationError::new("max_users", "must be >= min_users");
        assert_eq!(
            err.to_string(),
            "validation failed on `max_users`: must be >= min_users"
        );
    }
}
