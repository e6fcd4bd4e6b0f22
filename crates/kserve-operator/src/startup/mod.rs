//! Startup utilities for the controller process

mod crds;

pub use crds::{crd_yaml, ensure_crds_installed};
