//! Auto-delete policy decisions

use kserve_common::crd::AutoDeletePolicy;

use crate::status::WorkloadPhase;

/// Whether a run whose workload reached `phase` should be deleted.
///
/// No policy never deletes; neither does a non-terminal phase.
pub fn should_delete(policy: Option<AutoDeletePolicy>, phase: WorkloadPhase) -> bool {
    match policy {
        Some(AutoDeletePolicy::DeleteOnCompletion) => phase.is_terminal(),
        Some(AutoDeletePolicy::DeleteOnSuccess) => phase == WorkloadPhase::Succeeded,
        Some(AutoDeletePolicy::None) | None => false,
    }
}

/// Whether the scheduler's own TTL cleanup should back the policy up
pub fn wants_ttl(policy: Option<AutoDeletePolicy>) -> bool {
    matches!(
        policy,
        Some(AutoDeletePolicy::DeleteOnCompletion | AutoDeletePolicy::DeleteOnSuccess)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL_PHASES: [WorkloadPhase; 5] = [
        WorkloadPhase::Pending,
        WorkloadPhase::Running,
        WorkloadPhase::Succeeded,
        WorkloadPhase::Failed,
        WorkloadPhase::Unknown,
    ];

    #[test]
    fn no_policy_never_deletes() {
        for phase in ALL_PHASES {
            assert!(!should_delete(None, phase));
            assert!(!should_delete(Some(AutoDeletePolicy::None), phase));
        }
    }

    #[test]
    fn decision_table() {
        use AutoDeletePolicy::*;
        use WorkloadPhase::*;

        assert!(should_delete(Some(DeleteOnCompletion), Succeeded));
        assert!(should_delete(Some(DeleteOnCompletion), Failed));
        assert!(should_delete(Some(DeleteOnSuccess), Succeeded));
        assert!(!should_delete(Some(DeleteOnSuccess), Failed));
    }

    #[test]
    fn non_terminal_phases_are_kept() {
        for policy in [
            AutoDeletePolicy::DeleteOnCompletion,
            AutoDeletePolicy::DeleteOnSuccess,
        ] {
            for phase in ALL_PHASES.into_iter().filter(|p| !p.is_terminal()) {
                assert!(!should_delete(Some(policy), phase));
            }
        }
    }

    #[test]
    fn ttl_only_for_deleting_policies() {
        assert!(!wants_ttl(None));
        assert!(!wants_ttl(Some(AutoDeletePolicy::None)));
        assert!(wants_ttl(Some(AutoDeletePolicy::DeleteOnCompletion)));
        assert!(wants_ttl(Some(AutoDeletePolicy::DeleteOnSuccess)));
    }
}
