//! Common types for the KServe inference-run controller: CRDs, errors, events,
//! metrics and telemetry

#![deny(missing_docs)]

pub mod crd;
pub mod error;
pub mod events;
pub mod metrics;
pub mod telemetry;

pub use error::Error;

/// Result type alias using our custom Error type
pub type Result<T> = std::result::Result<T, Error>;

/// API group for all controller-owned custom resources
pub const API_GROUP: &str = "ai.krateo.io";

/// API version for all controller-owned custom resources
pub const API_VERSION: &str = "v1";

/// Field manager / event reporter name used for every write
pub const CONTROLLER_NAME: &str = "kserve-controller";
