//! InferenceRun CRD types
//!
//! An `InferenceRun` asks for one inference execution (or a recurring series)
//! against an `InferenceConfig`. The controller materializes it as a batch
//! Job or CronJob and mirrors the Job status back here.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use k8s_openapi::api::batch::v1::JobStatus;
use k8s_openapi::ByteString;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::types::{Condition, ObjectRef};

// =============================================================================
// Schedule
// =============================================================================

/// How a run is executed, derived from `spec.schedule`
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RunSchedule<'a> {
    /// A single Job, created once
    Immediate,
    /// A CronJob firing on the given expression
    Recurring(&'a str),
}

impl RunSchedule<'_> {
    /// True for CronJob-backed runs
    pub fn is_recurring(&self) -> bool {
        matches!(self, Self::Recurring(_))
    }
}

// =============================================================================
// Spec
// =============================================================================

/// A request to execute inference with a referenced configuration
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "ai.krateo.io",
    version = "v1",
    kind = "InferenceRun",
    plural = "inferenceruns",
    shortname = "ir",
    namespaced,
    status = "InferenceRunStatus",
    printcolumn = r#"{"name":"Ready","type":"string","jsonPath":".status.conditions[?(@.type=='Ready')].status"}"#,
    printcolumn = r#"{"name":"Reason","type":"string","jsonPath":".status.conditions[?(@.type=='Ready')].reason"}"#,
    printcolumn = r#"{"name":"Schedule","type":"string","jsonPath":".spec.schedule"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct InferenceRunSpec {
    /// The InferenceConfig to execute
    pub config_ref: ObjectRef,

    /// Active deadline for each Job, in seconds; ignored unless positive
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_seconds: Option<i64>,

    /// Free-form parameters handed to the runner
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parameters: Option<BTreeMap<String, String>>,

    /// Cron expression; when set the run recurs
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schemars(regex(
        pattern = r"(@(annually|yearly|monthly|weekly|daily|midnight|hourly))|((((\d+,)+\d+|(\d+(\/|-)\d+)|\d+|\*) ?){5,7})"
    ))]
    pub schedule: Option<String>,
}

impl InferenceRunSpec {
    /// Immediate or recurring; a blank expression counts as immediate
    pub fn schedule(&self) -> RunSchedule<'_> {
        match self.schedule.as_deref().map(str::trim) {
            Some(expr) if !expr.is_empty() => RunSchedule::Recurring(expr),
            _ => RunSchedule::Immediate,
        }
    }

    /// Positive timeout, if any
    pub fn active_deadline_seconds(&self) -> Option<i64> {
        self.timeout_seconds.filter(|t| *t > 0)
    }
}

// =============================================================================
// Status
// =============================================================================

/// Status of an InferenceRun
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct InferenceRunStatus {
    /// Standard conditions (type `Ready` carries the lifecycle)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,

    /// Serialized contract handed to the runner
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schemars(with = "Option<String>")]
    pub contract: Option<ByteString>,

    /// Last observed status of the backing Job
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job_status: Option<WorkloadSnapshot>,
}

/// Point-in-time copy of a batch Job's status
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct WorkloadSnapshot {
    /// Pods currently running
    #[serde(default)]
    pub active: i32,

    /// Pods that completed successfully
    #[serde(default)]
    pub succeeded: i32,

    /// Pods that failed
    #[serde(default)]
    pub failed: i32,

    /// When the Job started
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_time: Option<DateTime<Utc>>,

    /// When the Job completed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completion_time: Option<DateTime<Utc>>,

    /// Job conditions
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<WorkloadCondition>,
}

/// A single Job condition
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct WorkloadCondition {
    /// Condition type (Complete, Failed, Suspended, ...)
    #[serde(rename = "type")]
    pub type_: String,

    /// "True", "False" or "Unknown"
    pub status: String,

    /// Machine-readable reason
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,

    /// Human-readable message
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl From<&JobStatus> for WorkloadSnapshot {
    fn from(status: &JobStatus) -> Self {
        Self {
            active: status.active.unwrap_or(0),
            succeeded: status.succeeded.unwrap_or(0),
            failed: status.failed.unwrap_or(0),
            start_time: status.start_time.as_ref().map(|t| t.0),
            completion_time: status.completion_time.as_ref().map(|t| t.0),
            conditions: status
                .conditions
                .iter()
                .flatten()
                .map(|c| WorkloadCondition {
                    type_: c.type_.clone(),
                    status: c.status.clone(),
                    reason: c.reason.clone(),
                    message: c.message.clone(),
                })
                .collect(),
        }
    }
}
