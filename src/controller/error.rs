//! Error types for the controller.
//!
//! Defines custom error types with classification for retry behavior.

use std::time::Duration;
use thiserror::Error;

/// Error type for controller operations
#[derive(Error, Debug)]
pub enum Error {
    /// Kubernetes API error
    #[error("Kubernetes API error: {0}")]
    Kube(#[from] kube::Error),

    /// Missing required field in resource
    #[error("Missing required field: {0}")]
    MissingField(String),

    /// Validation error in resource spec
    #[error("Validation error: {0}")]
    Validation(String),

    /// Concurrency-token mismatch that exhausted in-invocation retries
    #[error("Update conflict: {0}")]
    Conflict(String),

    /// Attempt to change a create-once field
    #[error("Immutable field violation: {0}")]
    ImmutableField(String),

    /// Transient error that should be retried
    #[error("Transient error: {0}")]
    Transient(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    /// Check if this error indicates a not-found condition
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::Kube(kube::Error::Api(e)) if e.code == 404)
    }

    /// Check if this error is a lost-update conflict
    pub fn is_conflict(&self) -> bool {
        match self {
            Error::Conflict(_) => true,
            Error::Kube(kube::Error::Api(e)) => e.code == 409,
            _ => false,
        }
    }

    /// Check if this error is an authorization failure needing intervention
    pub fn is_forbidden(&self) -> bool {
        matches!(self, Error::Kube(kube::Error::Api(e)) if e.code == 401 || e.code == 403)
    }

    /// Check if this error should be retried
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Kube(e) => {
                // Retry on network errors, rate limiting, and server errors
                matches!(
                    e,
                    kube::Error::Api(api_err) if api_err.code >= 500 || api_err.code == 429
                ) || matches!(e, kube::Error::Service(_))
            }
            Error::Transient(_) | Error::Conflict(_) => true,
            Error::Validation(_) | Error::MissingField(_) | Error::ImmutableField(_) => false,
            Error::Serialization(_) => false,
        }
    }
}

/// Capped exponential backoff for requeue scheduling.
///
/// The delay doubles with each consecutive failure recorded in the
/// object's status and never exceeds `max`.
#[derive(Clone, Copy, Debug)]
pub struct BackoffConfig {
    /// Delay for the first retry
    pub base: Duration,
    /// Upper bound on the delay
    pub max: Duration,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            base: Duration::from_secs(5),
            max: Duration::from_secs(300),
        }
    }
}

impl BackoffConfig {
    /// Delay for the given consecutive failure count.
    pub fn delay_for(&self, retry_count: i32) -> Duration {
        let exponent = retry_count.clamp(0, 16) as u32;
        let delay = self
            .base
            .saturating_mul(2_u32.saturating_pow(exponent));
        delay.min(self.max)
    }
}

/// Result type alias for controller operations
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    fn api_error(code: u16) -> Error {
        Error::Kube(kube::Error::Api(kube::error::ErrorResponse {
            status: "Failure".to_string(),
            message: "error".to_string(),
            reason: "Error".to_string(),
            code,
        }))
    }

    #[test]
    fn test_not_found_classification() {
        assert!(api_error(404).is_not_found());
        assert!(!api_error(404).is_retryable());
        assert!(!api_error(500).is_not_found());
    }

    #[test]
    fn test_retryable_classification() {
        assert!(api_error(500).is_retryable());
        assert!(api_error(504).is_retryable());
        assert!(api_error(429).is_retryable());
        assert!(Error::Transient("timeout".to_string()).is_retryable());
        assert!(Error::Conflict("lost update".to_string()).is_retryable());
        assert!(!Error::Validation("bad spec".to_string()).is_retryable());
        assert!(!Error::ImmutableField("storage class".to_string()).is_retryable());
    }

    #[test]
    fn test_conflict_classification() {
        assert!(api_error(409).is_conflict());
        assert!(Error::Conflict("lost update".to_string()).is_conflict());
        assert!(!api_error(500).is_conflict());
    }

    #[test]
    fn test_forbidden_classification() {
        assert!(api_error(403).is_forbidden());
        assert!(api_error(401).is_forbidden());
        assert!(!api_error(403).is_retryable());
    }

    #[test]
    fn test_backoff_growth_and_cap() {
        let backoff = BackoffConfig::default();
        assert_eq!(backoff.delay_for(0), Duration::from_secs(5));
        assert_eq!(backoff.delay_for(1), Duration::from_secs(10));
        assert_eq!(backoff.delay_for(2), Duration::from_secs(20));
        // Capped
        assert_eq!(backoff.delay_for(10), Duration::from_secs(300));
        assert_eq!(backoff.delay_for(1000), Duration::from_secs(300));
    }
}
