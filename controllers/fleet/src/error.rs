//! Controller-specific error types.
//!
//! Taxonomy:
//! - `Validation` / `InvalidConfig` are terminal: status goes to Error and
//!   the controller does not retry.
//! - `Breaking` is a business error explicitly classified as non-retryable:
//!   status goes to Error and the error is swallowed.
//! - `Transient` (and raw `Kube` errors) surface to the watch runtime so its
//!   backoff re-invokes the dispatcher.
//! - `Conflict` on status writes is retried a bounded number of times before
//!   becoming `StatusPersist`.

use thiserror::Error;

/// Errors that can occur in the fleet controller.
#[derive(Debug, Error)]
pub enum ControllerError {
    /// Kubernetes API error
    #[error("Kubernetes error: {0}")]
    Kube(#[from] kube::Error),

    /// Structural validation failed (bad name, malformed overrides)
    #[error("Validation failed: {0}")]
    Validation(String),

    /// Invalid controller configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Business reconciler classified the failure as non-retryable
    #[error("Breaking reconciliation error: {0}")]
    Breaking(String),

    /// Retryable business reconciliation failure
    #[error("Reconciliation failed: {0}")]
    Transient(String),

    /// Optimistic-concurrency conflict on a store write
    #[error("Write conflict: {0}")]
    Conflict(String),

    /// Status persistence failed after bounded retries
    #[error("Status persistence failed: {0}")]
    StatusPersist(String),

    /// JSON payload could not be serialized or parsed
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Resource watch failed
    #[error("Resource watch failed: {0}")]
    Watch(String),
}

impl ControllerError {
    /// True for errors that must not trigger a retry: the status update is
    /// the terminal outcome.
    #[must_use]
    pub fn is_breaking(&self) -> bool {
        matches!(
            self,
            Self::Breaking(_) | Self::Validation(_) | Self::InvalidConfig(_)
        )
    }

    /// True for optimistic-concurrency conflicts, which get a bounded retry.
    #[must_use]
    pub fn is_conflict(&self) -> bool {
        match self {
            Self::Conflict(_) => true,
            Self::Kube(kube::Error::Api(ae)) => ae.code == 409,
            _ => false,
        }
    }

    /// Stable error code recorded in the component status.
    #[must_use]
    pub fn status_code(&self) -> u32 {
        match self {
            Self::Validation(_) | Self::InvalidConfig(_) => crds::codes::VALIDATION_ERROR,
            Self::StatusPersist(_) | Self::Conflict(_) => crds::codes::STATUS_PERSIST_ERROR,
            _ => crds::codes::RECONCILE_ERROR,
        }
    }
}

/// True iff a kube error denotes a missing object. Not-found on fetch is
/// treated as deletion, never surfaced.
#[must_use]
pub fn is_not_found(err: &kube::Error) -> bool {
    matches!(err, kube::Error::Api(ae) if ae.code == 404)
}
