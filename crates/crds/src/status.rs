//! Component status types.
//!
//! The observable status of a `LedgerComponent` is computed by the
//! controller's status arbitrator; nothing else writes it. Cluster
//! resources (no node identity) only ever receive aggregated or
//! business-override statuses, never pod-readiness ones.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Stable error codes surfaced in [`ComponentStatus::error_code`].
pub mod codes {
    /// Business reconciliation returned an error
    pub const RECONCILE_ERROR: u32 = 10;
    /// Structural validation failed (bad name, malformed overrides)
    pub const VALIDATION_ERROR: u32 = 11;
    /// A component with the same name already exists in the namespace
    pub const DUPLICATE_NAME: u32 = 12;
    /// Status persistence failed after bounded retries
    pub const STATUS_PERSIST_ERROR: u32 = 13;
}

/// Observable condition of a component.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Default)]
pub enum ComponentConditionType {
    /// Component accepted but not yet acted upon
    #[default]
    Initializing,
    /// Workload instances exist but not all are ready
    Deploying,
    /// All workload instances are ready
    Deployed,
    /// Waiting for its bootstrap artifact (e.g. genesis credential)
    Precreated,
    /// Reconciliation failed; see reason and message
    Error,
    /// Degraded but not failed
    Warning,
}

impl ComponentConditionType {
    /// Terminal statuses for a cluster resource: once reached, only
    /// aggregation or a business override moves the status again.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Deployed | Self::Error | Self::Warning)
    }
}

/// Arbitrated status of a `LedgerComponent`.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "camelCase")]
pub struct ComponentStatus {
    /// Current condition
    #[serde(rename = "type")]
    pub condition: ComponentConditionType,

    /// Machine-readable reason for the condition
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub reason: String,

    /// Human-readable message
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub message: String,

    /// Stable error code when the condition is Error
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_code: Option<u32>,

    /// Stamped on every status persist
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_heartbeat_time: Option<DateTime<Utc>>,

    /// Ledger version the component last converged to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

impl ComponentStatus {
    /// Builds an Error status with a stable code.
    #[must_use]
    pub fn error(reason: &str, message: &str, code: u32) -> Self {
        Self {
            condition: ComponentConditionType::Error,
            reason: reason.to_string(),
            message: message.to_string(),
            error_code: Some(code),
            last_heartbeat_time: None,
            version: None,
        }
    }

    /// True iff the observable triple (type, reason, message) differs.
    /// Heartbeat and version changes alone do not warrant a persist.
    #[must_use]
    pub fn differs_from(&self, other: &Self) -> bool {
        self.condition != other.condition
            || self.reason != other.reason
            || self.message != other.message
    }

    /// True iff only the heartbeat distinguishes the two statuses.
    #[must_use]
    pub fn heartbeat_only_change(&self, other: &Self) -> bool {
        !self.differs_from(other)
            && self.error_code == other.error_code
            && self.version == other.version
            && self.last_heartbeat_time != other.last_heartbeat_time
    }
}
