//! Workload status classification

use kserve_common::crd::WorkloadSnapshot;

/// Lifecycle state of a batch workload, derived from its pod counters
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum WorkloadPhase {
    /// No pod has started or finished yet
    Pending,
    /// At least one pod is active
    Running,
    /// A pod completed successfully and none is active
    Succeeded,
    /// A pod failed and none is active or succeeded
    Failed,
    /// Counters outside the cases above
    Unknown,
}

impl WorkloadPhase {
    /// True for Succeeded and Failed
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed)
    }
}

impl std::fmt::Display for WorkloadPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "Pending"),
            Self::Running => write!(f, "Running"),
            Self::Succeeded => write!(f, "Succeeded"),
            Self::Failed => write!(f, "Failed"),
            Self::Unknown => write!(f, "Unknown"),
        }
    }
}

/// Classify a snapshot. First match wins: an active retry reports Running
/// even after an earlier attempt failed.
pub fn classify(snapshot: &WorkloadSnapshot) -> WorkloadPhase {
    let (active, succeeded, failed) = (snapshot.active, snapshot.succeeded, snapshot.failed);
    if active == 0 && succeeded == 0 && failed == 0 {
        WorkloadPhase::Pending
    } else if active > 0 {
        WorkloadPhase::Running
    } else if succeeded > 0 {
        WorkloadPhase::Succeeded
    } else if failed > 0 {
        WorkloadPhase::Failed
    } else {
        WorkloadPhase::Unknown
    }
}

/// Messages of every condition whose status is "False", each followed by
/// "; ", or "unknown error" when there are none.
pub fn failure_message(snapshot: &WorkloadSnapshot) -> String {
    let message: String = snapshot
        .conditions
        .iter()
        .filter(|c| c.status == "False")
        .map(|c| format!("{}; ", c.message.as_deref().unwrap_or_default()))
        .collect();
    if message.is_empty() {
        "unknown error".to_string()
    } else {
        message
    }
}
