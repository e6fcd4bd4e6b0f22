//! InferenceRun reconciliation for the KServe inference controller
//!
//! This crate turns InferenceRun resources into batch Jobs (or CronJobs for
//! recurring runs) that execute a runner image against a KServe endpoint.
//!
//! - [`naming`]: deterministic, DNS-safe workload names
//! - [`contract`]: the JSON contract handed to the runner
//! - [`status`] and [`policy`]: Job status classification and auto-delete decisions
//! - [`workload`]: building, finding and deleting the owned objects
//! - [`engine`]: the Observe/Create/Update/Delete verbs
//! - [`controller`]: the reconcile loop driving them

pub mod client;
pub mod contract;
pub mod controller;
pub mod engine;
pub mod naming;
pub mod policy;
pub mod status;
pub mod workload;

pub use client::{KubeClient, KubeClientImpl};
pub use controller::{error_policy, reconcile, RUN_FINALIZER};
pub use engine::{Context, ContextBuilder, Observation};

pub use kserve_common::{Error, Result};
