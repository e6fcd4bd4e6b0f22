//! Shared types used by both custom resources

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Condition type carrying the resource lifecycle
pub const CONDITION_READY: &str = "Ready";

/// Reason: the workload is being materialized
pub const REASON_CREATING: &str = "Creating";
/// Reason: the workload exists and is being observed
pub const REASON_AVAILABLE: &str = "Available";
/// Reason: the workload is being torn down
pub const REASON_DELETING: &str = "Deleting";
/// Reason: the observed workload failed and awaits correction
pub const REASON_FAILED: &str = "Failed";

/// Reference to another namespaced object by name
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub struct ObjectRef {
    /// Object name
    pub name: String,

    /// Object namespace; defaults to the referencing object's namespace
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
}

impl ObjectRef {
    /// Namespace of the referenced object, falling back to `default`
    pub fn namespace_or<'a>(&'a self, default: &'a str) -> &'a str {
        match self.namespace.as_deref() {
            Some(ns) if !ns.is_empty() => ns,
            _ => default,
        }
    }
}

/// Condition status following Kubernetes conventions
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub enum ConditionStatus {
    /// Condition is true
    True,
    /// Condition is false
    False,
    /// Condition status is unknown
    #[default]
    Unknown,
}

impl std::fmt::Display for ConditionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::True => write!(f, "True"),
            Self::False => write!(f, "False"),
            Self::Unknown => write!(f, "Unknown"),
        }
    }
}

/// Kubernetes-style condition for status reporting
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
pub struct Condition {
    /// Type of condition (e.g., Ready)
    #[serde(rename = "type")]
    pub type_: String,

    /// Status of the condition (True, False, Unknown)
    pub status: ConditionStatus,

    /// Machine-readable reason for the condition
    pub reason: String,

    /// Human-readable message
    #[serde(default)]
    pub message: String,

    /// Last time the condition transitioned
    #[serde(rename = "lastTransitionTime")]
    pub last_transition_time: DateTime<Utc>,
}

impl Condition {
    /// Create a new condition with the current timestamp
    pub fn new(
        type_: impl Into<String>,
        status: ConditionStatus,
        reason: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            type_: type_.into(),
            status,
            reason: reason.into(),
            message: message.into(),
            last_transition_time: Utc::now(),
        }
    }

    /// `Ready=False` with reason `Creating`
    pub fn creating() -> Self {
        Self::new(
            CONDITION_READY,
            ConditionStatus::False,
            REASON_CREATING,
            "",
        )
    }

    /// `Ready=True` with reason `Available`
    pub fn available() -> Self {
        Self::new(CONDITION_READY, ConditionStatus::True, REASON_AVAILABLE, "")
    }

    /// `Ready=False` with reason `Deleting`
    pub fn deleting() -> Self {
        Self::new(
            CONDITION_READY,
            ConditionStatus::False,
            REASON_DELETING,
            "",
        )
    }

    /// `Ready=False` with reason `Failed`
    pub fn failed() -> Self {
        Self::new(CONDITION_READY, ConditionStatus::False, REASON_FAILED, "")
    }

    /// Attach a human-readable message
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    /// True if `other` differs only by transition time
    pub fn same_state(&self, other: &Condition) -> bool {
        self.type_ == other.type_
            && self.status == other.status
            && self.reason == other.reason
            && self.message == other.message
    }
}

/// Insert or replace the condition of the same type.
///
/// Returns `true` if anything changed. An unchanged condition keeps its
/// original transition time.
pub fn set_condition(conditions: &mut Vec<Condition>, condition: Condition) -> bool {
    match conditions.iter_mut().find(|c| c.type_ == condition.type_) {
        Some(existing) if existing.same_state(&condition) => false,
        Some(existing) => {
            *existing = condition;
            true
        }
        None => {
            conditions.push(condition);
            true
        }
    }
}
