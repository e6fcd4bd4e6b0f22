//! Custom Resource Definitions for the inference-run controller

mod config;
mod run;
mod types;

pub use config::{
    AutoDeletePolicy, InferenceConfig, InferenceConfigSpec, InferenceConfigStatus, KServeSpec,
    StorageMap, StorageSpec, KRATEO_STORAGE,
};
pub use run::{
    InferenceRun, InferenceRunSpec, InferenceRunStatus, RunSchedule, WorkloadCondition,
    WorkloadSnapshot,
};
pub use types::{
    set_condition, Condition, ConditionStatus, ObjectRef, CONDITION_READY,
    REASON_AVAILABLE, REASON_CREATING, REASON_DELETING, REASON_FAILED,
};
