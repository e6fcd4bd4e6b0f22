//! Kubernetes Event recording for the inference-run controller.
//!
//! Wraps `kube::runtime::events::Recorder` behind a trait so lifecycle
//! transitions of an InferenceRun show up in `kubectl describe` while tests
//! run against a no-op publisher.
//!
//! Events are fire-and-forget: failures are logged as warnings and never
//! propagate errors. A failed event must never break reconciliation.

use async_trait::async_trait;
use k8s_openapi::api::core::v1::ObjectReference;
use kube::runtime::events::{EventType, Recorder, Reporter};
use kube::Client;
use tracing::warn;

/// Publishes Kubernetes Events about a resource.
#[async_trait]
pub trait EventPublisher: Send + Sync {
    /// Publish an Event on `resource_ref`.
    ///
    /// * `type_` - Normal or Warning
    /// * `reason` - Machine-readable reason (see [`reasons`])
    /// * `action` - What the controller was doing (see [`actions`])
    /// * `note` - Optional human-readable message
    async fn publish(
        &self,
        resource_ref: &ObjectReference,
        type_: EventType,
        reason: &str,
        action: &str,
        note: Option<String>,
    );
}

/// Production publisher backed by the events API.
pub struct KubeEventPublisher {
    recorder: Recorder,
}

impl KubeEventPublisher {
    /// Create a publisher reporting as `controller_name`.
    ///
    /// `instance` identifies the replica (usually the pod name) on each Event.
    pub fn new(client: Client, controller_name: &str, instance: Option<String>) -> Self {
        Self {
            recorder: Recorder::new(client, reporter(controller_name, instance)),
        }
    }
}

fn reporter(controller_name: &str, instance: Option<String>) -> Reporter {
    Reporter {
        controller: controller_name.to_string(),
        instance: instance.filter(|i| !i.trim().is_empty()),
    }
}

#[async_trait]
impl EventPublisher for KubeEventPublisher {
    async fn publish(
        &self,
        resource_ref: &ObjectReference,
        type_: EventType,
        reason: &str,
        action: &str,
        note: Option<String>,
    ) {
        let event = kube::runtime::events::Event {
            type_,
            reason: reason.to_string(),
            note,
            action: action.to_string(),
            secondary: None,
        };
        if let Err(e) = self.recorder.publish(&event, resource_ref).await {
            warn!(reason, action, error = %e, "Failed to publish Kubernetes event");
        }
    }
}

/// Publisher that drops every event.
pub struct NoopEventPublisher;

#[async_trait]
impl EventPublisher for NoopEventPublisher {
    async fn publish(
        &self,
        _resource_ref: &ObjectReference,
        _type_: EventType,
        _reason: &str,
        _action: &str,
        _note: Option<String>,
    ) {
    }
}

/// Event reasons, shown under REASON in `kubectl get events`.
pub mod reasons {
    /// Job or CronJob created for a run
    pub const WORKLOAD_CREATED: &str = "WorkloadCreated";
    /// The observed Job failed
    pub const WORKLOAD_FAILED: &str = "WorkloadFailed";
    /// The workload was deleted so the next cycle recreates it
    pub const WORKLOAD_RESTARTED: &str = "WorkloadRestarted";
    /// The run was deleted by its auto-delete policy
    pub const AUTO_DELETED: &str = "AutoDeleted";
    /// The workload was removed while the run was being deleted
    pub const WORKLOAD_DELETED: &str = "WorkloadDeleted";
    /// The referenced InferenceConfig could not be read
    pub const CONFIG_UNRESOLVED: &str = "ConfigUnresolved";
}

/// Event actions, shown under ACTION in `kubectl get events`.
pub mod actions {
    /// Observing workload state
    pub const OBSERVE: &str = "Observe";
    /// Materializing the workload
    pub const CREATE: &str = "Create";
    /// Correcting a failed workload
    pub const UPDATE: &str = "Update";
    /// Tearing down the workload
    pub const DELETE: &str = "Delete";
}
