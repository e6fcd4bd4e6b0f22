//! Execution contract handed to the runner container
//!
//! The runner does not talk to the API server for its instructions; it reads
//! `contract.json` from the ConfigMap mounted at `/tmp`. The same bytes are
//! cached in the run's status.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use kserve_common::crd::{InferenceConfigSpec, InferenceRun, KServeSpec, StorageMap};
use kserve_common::Error;

/// ConfigMap key holding the serialized contract
pub const CONTRACT_KEY: &str = "contract.json";

/// What the runner fetches, which endpoint it calls, and where it stores results
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Contract {
    /// UID of the owning InferenceRun
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub job_id: String,

    /// Derived workload name
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub job_name: String,

    /// Inference endpoint
    #[serde(default)]
    pub kserve: KServeSpec,

    /// Input storage, keyed by provider label
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub input: StorageMap,

    /// Output storage, keyed by provider label
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub output: StorageMap,

    /// Run parameters, passed through untouched
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parameters: Option<BTreeMap<String, String>>,
}

impl Contract {
    /// Assemble the contract for `run` executing `config` as `job_name`.
    pub fn build(run: &InferenceRun, config: &InferenceConfigSpec, job_name: &str) -> Self {
        Self {
            job_id: run.metadata.uid.clone().unwrap_or_default(),
            job_name: job_name.to_string(),
            kserve: config.kserve.clone(),
            input: config.storage.input.clone(),
            output: config.storage.output.clone(),
            parameters: run.spec.parameters.clone(),
        }
    }

    /// UTF-8 JSON encoding.
    ///
    /// Every map is ordered, so equal contracts encode to equal bytes.
    pub fn to_bytes(&self) -> Result<Vec<u8>, Error> {
        serde_json::to_vec(self).map_err(|e| Error::serialization_for_kind("Contract", e.to_string()))
    }

    /// Parse a contract previously produced by [`Contract::to_bytes`].
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, Error> {
        serde_json::from_slice(bytes)
            .map_err(|e| Error::serialization_for_kind("Contract", e.to_string()))
    }
}
