//! InferenceConfig CRD types
//!
//! An `InferenceConfig` is the reusable execution template that runs point
//! at: the KServe endpoint to call, the runner image, where input comes from
//! and where output goes, and what to do with finished runs.

use std::collections::BTreeMap;

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Deserializer, Serialize};

use super::types::{Condition, ObjectRef};

/// Storage provider label understood by the stock runner image
pub const KRATEO_STORAGE: &str = "krateo";

/// Storage configuration keyed by provider label.
///
/// Values are provider-specific and passed to the runner untouched.
pub type StorageMap = BTreeMap<String, serde_json::Value>;

// =============================================================================
// AutoDeletePolicy
// =============================================================================

/// What happens to a run once its workload reaches a terminal state
#[derive(Clone, Copy, Debug, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub enum AutoDeletePolicy {
    /// Keep every run
    None,
    /// Delete the run when the workload succeeds or fails
    DeleteOnCompletion,
    /// Delete the run only when the workload succeeds
    DeleteOnSuccess,
}

impl std::fmt::Display for AutoDeletePolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::None => write!(f, "None"),
            Self::DeleteOnCompletion => write!(f, "DeleteOnCompletion"),
            Self::DeleteOnSuccess => write!(f, "DeleteOnSuccess"),
        }
    }
}

impl std::str::FromStr for AutoDeletePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "None" => Ok(Self::None),
            "DeleteOnCompletion" => Ok(Self::DeleteOnCompletion),
            "DeleteOnSuccess" => Ok(Self::DeleteOnSuccess),
            other => Err(format!("unknown auto-delete policy: {}", other)),
        }
    }
}

/// Unrecognized policy strings mean "no policy" rather than a decode failure.
fn lenient_policy<'de, D>(deserializer: D) -> Result<Option<AutoDeletePolicy>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    Ok(raw.and_then(|s| s.parse().ok()))
}

// =============================================================================
// Spec
// =============================================================================

/// KServe inference endpoint the runner calls
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct KServeSpec {
    /// Model name as registered in the inference service
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub model_name: String,

    /// Inference endpoint URL
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub model_url: String,

    /// Inference protocol / model version (e.g. "v2")
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub model_version: String,

    /// Name of the input tensor
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub model_input_name: String,
}

/// Input and output storage for a run
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
pub struct StorageSpec {
    /// Where the runner reads input from
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    #[schemars(schema_with = "storage_map_schema")]
    pub input: StorageMap,

    /// Where the runner writes output to
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    #[schemars(schema_with = "storage_map_schema")]
    pub output: StorageMap,
}

/// Object whose values are free-form, so the API server keeps them intact
fn storage_map_schema(_gen: &mut schemars::gen::SchemaGenerator) -> schemars::schema::Schema {
    use schemars::schema::{InstanceType, ObjectValidation, Schema, SchemaObject};

    let mut value = SchemaObject::default();
    value.extensions.insert(
        "x-kubernetes-preserve-unknown-fields".to_string(),
        serde_json::Value::Bool(true),
    );

    Schema::Object(SchemaObject {
        instance_type: Some(InstanceType::Object.into()),
        object: Some(Box::new(ObjectValidation {
            additional_properties: Some(Box::new(Schema::Object(value))),
            ..Default::default()
        })),
        ..Default::default()
    })
}

/// Execution template for inference runs
#[derive(CustomResource, Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "ai.krateo.io",
    version = "v1",
    kind = "InferenceConfig",
    plural = "inferenceconfigs",
    shortname = "ic",
    namespaced,
    status = "InferenceConfigStatus",
    printcolumn = r#"{"name":"Image","type":"string","jsonPath":".spec.image"}"#,
    printcolumn = r#"{"name":"AutoDelete","type":"string","jsonPath":".spec.autoDeletePolicy"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct InferenceConfigSpec {
    /// Inference endpoint descriptor
    #[serde(default)]
    pub kserve: KServeSpec,

    /// Retention of finished runs; absent means keep
    #[serde(
        default,
        deserialize_with = "lenient_policy",
        skip_serializing_if = "Option::is_none"
    )]
    pub auto_delete_policy: Option<AutoDeletePolicy>,

    /// Input/output storage maps
    #[serde(default)]
    pub storage: StorageSpec,

    /// Runner container image
    pub image: String,

    /// Image pull secret for the runner image
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credentials_ref: Option<ObjectRef>,
}

/// Status of an InferenceConfig
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
pub struct InferenceConfigStatus {
    /// Standard conditions
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,
}
