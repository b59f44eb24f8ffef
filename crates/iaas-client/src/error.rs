//! IaaS client errors

use thiserror::Error;

/// Errors that can occur when interacting with the IaaS API
#[derive(Debug, Error)]
pub enum IaasError {
    /// HTTP request/response error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// IaaS API returned an error
    #[error("IaaS API error: {0}")]
    Api(String),

    /// JSON serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Resource is held by another owner (e.g. EIP bound to a different balancer)
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Invalid request (e.g., missing required fields)
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Asynchronous job reached its failed terminal state
    #[error("Job failed: {0}")]
    JobFailed(String),

    /// Asynchronous job did not reach a terminal state before the deadline
    #[error("Timed out: {0}")]
    Timeout(String),

    /// API rate limit hit
    #[error("Rate limited: {0}")]
    RateLimited(String),
}

impl IaasError {
    /// Whether this error means the target resource does not exist.
    ///
    /// Get/Delete paths translate this into a non-error "does not exist"
    /// result instead of propagating it.
    pub fn is_not_found(&self) -> bool {
        matches!(self, IaasError::NotFound(_))
    }

    /// Whether a later reconciliation pass may succeed without operator action
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            IaasError::Http(_)
                | IaasError::Timeout(_)
                | IaasError::RateLimited(_)
                | IaasError::JobFailed(_)
        )
    }
}
