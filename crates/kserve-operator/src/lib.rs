//! KServe inference-run controller process

#![deny(missing_docs)]

/// Command-line and environment configuration
pub mod cli;
/// Controller construction
pub mod controller_runner;
/// Liveness and readiness probes
pub mod health;
/// Startup utilities (CRD generation and install)
pub mod startup;
