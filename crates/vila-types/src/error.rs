//! Error types for VILA
//!
//! Conflicts and insufficient-balance are expected outcomes of racing
//! actors and are handled locally; validation and not-found errors are
//! surfaced to the initiating caller and must not be retried.

use thiserror::Error;

/// Result type for VILA operations
pub type Result<T> = std::result::Result<T, DispatchError>;

/// VILA error types
#[derive(Debug, Clone, Error)]
pub enum DispatchError {
    // ========================================================================
    // Validation Errors
    // ========================================================================

    /// Malformed request/provider input; rejected before any state mutation
    #[error("Invalid input: {field} - {reason}")]
    Validation { field: String, reason: String },

    // ========================================================================
    // Concurrency Errors
    // ========================================================================

    /// Optimistic-concurrency loss on a conditional transition
    #[error("Request {request_id} is no longer available (status: {status})")]
    Conflict { request_id: String, status: String },

    /// Expiry requested before the authoritative deadline
    #[error("Request {request_id} has not reached its deadline yet")]
    DeadlineNotReached { request_id: String },

    // ========================================================================
    // Balance Errors
    // ========================================================================

    /// Provider has no credits or trust credits left
    #[error("Provider {provider_id} has no credits left")]
    InsufficientBalance { provider_id: String },

    // ========================================================================
    // Lookup Errors
    // ========================================================================

    /// Unknown request id
    #[error("Request {request_id} not found")]
    RequestNotFound { request_id: String },

    /// Unknown provider id
    #[error("Provider {provider_id} not found")]
    ProviderNotFound { provider_id: String },

    // ========================================================================
    // Eligibility Errors
    // ========================================================================

    /// Provider attempted an operation that requires being online
    #[error("Provider {provider_id} is offline")]
    ProviderOffline { provider_id: String },

    /// Provider's role does not serve the request's category
    #[error("Provider {provider_id} does not serve category {category}")]
    CategoryMismatch { provider_id: String, category: String },
}

impl DispatchError {
    /// Create a validation error
    pub fn validation(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Expected, recoverable outcomes of racing actors; the losing actor
    /// shows "offer no longer available" (or "out of credits") and moves on
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::Conflict { .. } | Self::InsufficientBalance { .. } | Self::DeadlineNotReached { .. }
        )
    }

    /// Get an error code for API responses
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Validation { .. } => "VALIDATION_ERROR",
            Self::Conflict { .. } => "CONFLICT",
            Self::DeadlineNotReached { .. } => "DEADLINE_NOT_REACHED",
            Self::InsufficientBalance { .. } => "INSUFFICIENT_BALANCE",
            Self::RequestNotFound { .. } => "REQUEST_NOT_FOUND",
            Self::ProviderNotFound { .. } => "PROVIDER_NOT_FOUND",
            Self::ProviderOffline { .. } => "PROVIDER_OFFLINE",
            Self::CategoryMismatch { .. } => "CATEGORY_MISMATCH",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        let err = DispatchError::InsufficientBalance {
            provider_id: "test".to_string(),
        };
        assert_eq!(err.error_code(), "INSUFFICIENT_BALANCE");
    }

    #[test]
    fn test_recoverable_errors() {
        let conflict = DispatchError::Conflict {
            request_id: "test".to_string(),
            status: "accepted".to_string(),
        };
        assert!(conflict.is_recoverable());

        let not_found = DispatchError::RequestNotFound {
            request_id: "test".to_string(),
        };
        assert!(!not_found.is_recoverable());

        assert!(!DispatchError::validation("origin", "must not be empty").is_recoverable());
    }
}
