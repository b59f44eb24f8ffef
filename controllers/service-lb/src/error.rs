//! Controller-specific error types.
//!
//! This module defines the error taxonomy of the convergence engine. Lower
//! layers return typed `IaasError`s; the engine classifies them here, maps
//! not-found onto non-error results in the read/delete paths, and bubbles
//! everything else to the watch loop for requeueing.

use iaas_client::IaasError;
use kube::Error as KubeError;
use thiserror::Error;

/// Errors that can occur in the service-lb controller.
#[derive(Debug, Error)]
pub enum ControllerError {
    /// Kubernetes API error
    #[error("Kubernetes error: {0}")]
    Kube(#[from] KubeError),

    /// Cloud API error
    #[error("IaaS error: {0}")]
    Iaas(#[from] IaasError),

    /// Malformed desired state; fatal for this call, never retried internally
    #[error("Invalid service spec: {0}")]
    Validation(String),

    /// Resource held by another owner (e.g. reused EIP bound elsewhere);
    /// requires operator intervention
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Earlier plan steps were applied before a later one failed; the next
    /// reconciliation resumes from live cloud state
    #[error("Partially applied: {0}")]
    PartialApply(String),

    /// Invalid controller configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl ControllerError {
    /// Whether the underlying cause is a missing cloud resource
    pub fn is_not_found(&self) -> bool {
        matches!(self, ControllerError::Iaas(e) if e.is_not_found())
    }
}
