//! OpenTelemetry metrics for the inference-run controller
//!
//! Instruments are created lazily against the global meter provider. Until
//! [`crate::telemetry::init_telemetry`] installs an OTLP pipeline the global
//! provider is a no-op, so recording is always safe.

use once_cell::sync::Lazy;
use opentelemetry::metrics::{Counter, Histogram, Meter};
use opentelemetry::{global, KeyValue};

use crate::Error;

/// Global meter for controller metrics
static METER: Lazy<Meter> = Lazy::new(|| global::meter("kserve"));

/// Histogram of InferenceRun reconciliation duration
///
/// Labels:
/// - `namespace`: namespace of the run
/// - `result`: success, error
pub static RUN_RECONCILE_DURATION: Lazy<Histogram<f64>> = Lazy::new(|| {
    METER
        .f64_histogram("kserve_run_reconcile_duration_seconds")
        .with_description("Duration of InferenceRun reconciliation in seconds")
        .with_unit("s")
        .build()
});

/// Counter of InferenceRun reconciliation errors
///
/// Labels:
/// - `namespace`: namespace of the run
/// - `error_type`: transient, permanent
pub static RUN_RECONCILE_ERRORS: Lazy<Counter<u64>> = Lazy::new(|| {
    METER
        .u64_counter("kserve_run_reconcile_errors_total")
        .with_description("Total number of InferenceRun reconciliation errors")
        .with_unit("{errors}")
        .build()
});

/// Counter of workloads created for runs
///
/// Labels:
/// - `kind`: Job, CronJob
pub static WORKLOADS_CREATED: Lazy<Counter<u64>> = Lazy::new(|| {
    METER
        .u64_counter("kserve_workloads_created_total")
        .with_description("Total number of Jobs and CronJobs created for InferenceRuns")
        .with_unit("{workloads}")
        .build()
});

/// Counter of runs deleted by their auto-delete policy
///
/// Labels:
/// - `phase`: workload phase that triggered the deletion
pub static RUNS_AUTO_DELETED: Lazy<Counter<u64>> = Lazy::new(|| {
    METER
        .u64_counter("kserve_runs_auto_deleted_total")
        .with_description("Total number of InferenceRuns deleted by AutoDeletePolicy")
        .with_unit("{runs}")
        .build()
});

/// Reconcile error classification for metrics
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorType {
    /// Worth retrying as-is
    Transient,
    /// Needs a change to the run or its config
    Permanent,
}

impl ErrorType {
    /// Returns the string representation for metric labels
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Transient => "transient",
            Self::Permanent => "permanent",
        }
    }
}

impl From<&Error> for ErrorType {
    fn from(e: &Error) -> Self {
        if e.is_retryable() {
            Self::Transient
        } else {
            Self::Permanent
        }
    }
}

/// Record a run reconciliation with timing
pub struct ReconcileTimer {
    namespace: String,
    start: std::time::Instant,
}

impl ReconcileTimer {
    /// Start timing a reconciliation
    pub fn start(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            start: std::time::Instant::now(),
        }
    }

    /// Record successful completion
    pub fn success(self) {
        let duration = self.start.elapsed().as_secs_f64();
        RUN_RECONCILE_DURATION.record(
            duration,
            &[
                KeyValue::new("namespace", self.namespace),
                KeyValue::new("result", "success"),
            ],
        );
    }

    /// Record error completion
    pub fn error(self, error_type: ErrorType) {
        let duration = self.start.elapsed().as_secs_f64();
        RUN_RECONCILE_DURATION.record(
            duration,
            &[
                KeyValue::new("namespace", self.namespace.clone()),
                KeyValue::new("result", "error"),
            ],
        );
        RUN_RECONCILE_ERRORS.add(
            1,
            &[
                KeyValue::new("namespace", self.namespace),
                KeyValue::new("error_type", error_type.as_str()),
            ],
        );
    }
}

/// Count a created Job or CronJob
pub fn record_workload_created(kind: &str) {
    WORKLOADS_CREATED.add(1, &[KeyValue::new("kind", kind.to_string())]);
}

/// Count a run removed by its auto-delete policy
pub fn record_auto_delete(phase: &str) {
    RUNS_AUTO_DELETED.add(1, &[KeyValue::new("phase", phase.to_string())]);
}
