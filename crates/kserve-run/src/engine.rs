//! Reconciliation engine: Observe, Create, Update and Delete for InferenceRuns
//!
//! Each verb starts from a cold read of cluster state, so any of them can be
//! repeated or reordered without double-materializing a workload. Observe
//! reports what the scheduler should do next:
//!
//! | workload                         | exists | up to date | next step     |
//! |----------------------------------|--------|------------|---------------|
//! | config unresolvable / no Job yet | false  | false      | Create        |
//! | Failed                           | true   | false      | Update        |
//! | anything else                    | true   | true       | requeue       |

use std::sync::Arc;
use std::time::Duration;

use k8s_openapi::ByteString;
use kube::runtime::events::EventType;
use kube::{Client, Resource, ResourceExt};
use tracing::{debug, info, instrument, warn};

use kserve_common::crd::{
    set_condition, Condition, InferenceConfigSpec, InferenceRun, InferenceRunStatus,
    WorkloadSnapshot,
};
use kserve_common::events::{actions, reasons, EventPublisher, KubeEventPublisher};
use kserve_common::metrics;
use kserve_common::{Error, CONTROLLER_NAME};

use crate::client::{KubeClient, KubeClientImpl};
use crate::contract::Contract;
use crate::policy::should_delete;
use crate::status::{classify, failure_message, WorkloadPhase};
use crate::workload::{run_namespace, workload_name, WorkloadManager};

/// Poll interval used when none is configured
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(300);

// =============================================================================
// Context
// =============================================================================

/// Shared context for InferenceRun reconciliation
///
/// Built once at startup and shared by every reconcile call; it owns the
/// Kubernetes handle, so no reconcile step reaches for global configuration.
pub struct Context {
    /// Kubernetes client for API operations (trait object for testability)
    pub kube: Arc<dyn KubeClient>,
    /// Workload lifecycle operations, sharing `kube`
    pub workloads: WorkloadManager,
    /// Kubernetes Event publisher
    pub events: Arc<dyn EventPublisher>,
    /// How often a healthy run is observed again
    pub poll_interval: Duration,
}

impl Context {
    /// Create a builder for constructing a Context
    pub fn builder(client: Client) -> ContextBuilder {
        ContextBuilder::new(client)
    }

    /// Context over mock clients, with events dropped
    #[cfg(test)]
    pub fn for_testing(kube: Arc<dyn KubeClient>) -> Self {
        Self {
            workloads: WorkloadManager::new(kube.clone(), Some("kserve-runner".to_string())),
            kube,
            events: Arc::new(kserve_common::events::NoopEventPublisher),
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

/// Builder for constructing [`Context`] instances
pub struct ContextBuilder {
    client: Client,
    poll_interval: Duration,
    service_account: Option<String>,
    instance: Option<String>,
}

impl ContextBuilder {
    fn new(client: Client) -> Self {
        Self {
            client,
            poll_interval: DEFAULT_POLL_INTERVAL,
            service_account: None,
            instance: None,
        }
    }

    /// Requeue interval for healthy runs; zero keeps the default
    pub fn poll_interval(mut self, interval: Duration) -> Self {
        if !interval.is_zero() {
            self.poll_interval = interval;
        }
        self
    }

    /// Service account the runner pods use
    pub fn service_account(mut self, name: Option<String>) -> Self {
        self.service_account = name.filter(|n| !n.is_empty());
        self
    }

    /// Replica name reported on published Events
    pub fn event_instance(mut self, instance: Option<String>) -> Self {
        self.instance = instance;
        self
    }

    /// Build the Context
    pub fn build(self) -> Context {
        let kube: Arc<dyn KubeClient> = Arc::new(KubeClientImpl::new(self.client.clone()));
        let events: Arc<dyn EventPublisher> = Arc::new(KubeEventPublisher::new(
            self.client,
            CONTROLLER_NAME,
            self.instance,
        ));
        Context {
            workloads: WorkloadManager::new(kube.clone(), self.service_account),
            kube,
            events,
            poll_interval: self.poll_interval,
        }
    }
}

// =============================================================================
// Observation
// =============================================================================

/// Result of [`observe`]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Observation {
    /// The workload has been materialized and reported a status
    pub resource_exists: bool,
    /// The workload needs no correction
    pub resource_up_to_date: bool,
}

impl Observation {
    fn absent() -> Self {
        Self::default()
    }

    fn outdated() -> Self {
        Self {
            resource_exists: true,
            resource_up_to_date: false,
        }
    }

    fn current() -> Self {
        Self {
            resource_exists: true,
            resource_up_to_date: true,
        }
    }
}

// =============================================================================
// Verbs
// =============================================================================

/// Refresh the run's status from its workload and decide what comes next.
///
/// Writes the contract and workload snapshot into status and the contract
/// ConfigMap on every call. A Succeeded workload whose policy says so gets
/// its run deleted here; a Failed one is only reported, as a `Failed` Ready
/// condition carrying the Job's failure message.
#[instrument(skip_all, fields(run = %run.name_any(), namespace = ?run.namespace()))]
pub async fn observe(run: &mut InferenceRun, ctx: &Context) -> Result<Observation, Error> {
    let name = run.name_any();
    let namespace = run_namespace(run)?;

    let config = match resolve_config(run, ctx).await {
        Ok(config) => config,
        Err(e) => {
            warn!(error = %e, "unable to retrieve InferenceConfig referenced in InferenceRun");
            return Ok(Observation::absent());
        }
    };

    let job_name = workload_name(run);
    let contract = Contract::build(run, &config, &job_name).to_bytes()?;
    debug!(workload = %job_name, contract = %String::from_utf8_lossy(&contract), "computed contract");

    let snapshot = fetch_snapshot(run, &job_name, ctx).await;

    let status = run.status.get_or_insert_with(InferenceRunStatus::default);
    status.contract = Some(ByteString(contract.clone()));
    status.job_status = snapshot.clone();
    ctx.kube.patch_run_status(&namespace, &name, status).await?;

    ctx.workloads
        .ensure_artifact(&job_name, &namespace, &contract, run)
        .await?;

    let Some(snapshot) = snapshot else {
        info!(workload = %job_name, "run does not have a workload yet");
        return Ok(Observation::absent());
    };

    let phase = classify(&snapshot);
    info!(workload = %job_name, %phase, "observed workload");

    match phase {
        WorkloadPhase::Failed => {
            let message = failure_message(&snapshot);
            warn!(workload = %job_name, error = %message, "inference job failed");
            let status = run.status.get_or_insert_with(InferenceRunStatus::default);
            if set_condition(&mut status.conditions, Condition::failed().with_message(&message)) {
                ctx.kube.patch_run_status(&namespace, &name, status).await?;
            }
            publish(ctx, run, EventType::Warning, reasons::WORKLOAD_FAILED, actions::OBSERVE, message)
                .await;
            return Ok(Observation::outdated());
        }
        WorkloadPhase::Succeeded if should_delete(config.auto_delete_policy, phase) => {
            info!("deleting InferenceRun for AutoDeletePolicy");
            ctx.kube.delete_run(&namespace, &name).await?;
            metrics::record_auto_delete(&phase.to_string());
            publish(
                ctx,
                run,
                EventType::Normal,
                reasons::AUTO_DELETED,
                actions::OBSERVE,
                format!("workload {} {}", job_name, phase),
            )
            .await;
            return Ok(Observation::current());
        }
        _ => {}
    }

    let status = run.status.get_or_insert_with(InferenceRunStatus::default);
    if set_condition(&mut status.conditions, Condition::available()) {
        ctx.kube.patch_run_status(&namespace, &name, status).await?;
    }
    Ok(Observation::current())
}

/// Materialize the run's workload and record its first status.
///
/// Re-reading the new workload is best effort; only the status write can
/// fail the call after the workload exists.
#[instrument(skip_all, fields(run = %run.name_any(), namespace = ?run.namespace()))]
pub async fn create(run: &mut InferenceRun, ctx: &Context) -> Result<(), Error> {
    let name = run.name_any();
    let namespace = run_namespace(run)?;

    let config = match resolve_config(run, ctx).await {
        Ok(config) => config,
        Err(e) => {
            publish(ctx, run, EventType::Warning, reasons::CONFIG_UNRESOLVED, actions::CREATE, e.to_string())
                .await;
            return Err(e);
        }
    };

    let status = run.status.get_or_insert_with(InferenceRunStatus::default);
    set_condition(&mut status.conditions, Condition::creating());

    let job_name = workload_name(run);
    ctx.workloads.ensure_workload(&job_name, run, &config).await?;

    let kind = if run.spec.schedule().is_recurring() { "CronJob" } else { "Job" };
    info!(workload = %job_name, kind, "created workload");
    metrics::record_workload_created(kind);
    publish(
        ctx,
        run,
        EventType::Normal,
        reasons::WORKLOAD_CREATED,
        actions::CREATE,
        format!("created {} {}", kind, job_name),
    )
    .await;

    let snapshot = fetch_snapshot(run, &job_name, ctx).await;
    let status = run.status.get_or_insert_with(InferenceRunStatus::default);
    status.job_status = snapshot;
    ctx.kube.patch_run_status(&namespace, &name, status).await?;
    Ok(())
}

/// Correct a run whose workload failed.
///
/// With a policy that deletes the run, the run goes; otherwise the workload
/// is deleted so the next cycle recreates it.
#[instrument(skip_all, fields(run = %run.name_any(), namespace = ?run.namespace()))]
pub async fn update(run: &mut InferenceRun, ctx: &Context) -> Result<(), Error> {
    let name = run.name_any();
    let namespace = run_namespace(run)?;
    let config = resolve_config(run, ctx).await?;

    let Some(snapshot) = run.status.as_ref().and_then(|s| s.job_status.as_ref()) else {
        debug!("no workload status recorded, nothing to correct");
        return Ok(());
    };
    let phase = classify(snapshot);

    if should_delete(config.auto_delete_policy, phase) {
        info!(%phase, "deleting InferenceRun for AutoDeletePolicy");
        ctx.kube.delete_run(&namespace, &name).await?;
        metrics::record_auto_delete(&phase.to_string());
        publish(
            ctx,
            run,
            EventType::Normal,
            reasons::AUTO_DELETED,
            actions::UPDATE,
            format!("workload {}", phase),
        )
        .await;
    } else {
        let job_name = workload_name(run);
        info!(workload = %job_name, %phase, "deleting workload to restart it");
        ctx.workloads.delete_workload(run, &job_name, true).await?;
        publish(
            ctx,
            run,
            EventType::Normal,
            reasons::WORKLOAD_RESTARTED,
            actions::UPDATE,
            format!("deleted {} after it {}", job_name, phase),
        )
        .await;
    }
    Ok(())
}

/// Tear down the run's workload.
///
/// Pods are removed with the workload only when the recorded status is one
/// the policy would delete; otherwise just the top-level object goes.
/// The recorded status is the one cached on the run, not a fresh read.
#[instrument(skip_all, fields(run = %run.name_any(), namespace = ?run.namespace()))]
pub async fn delete(run: &mut InferenceRun, ctx: &Context) -> Result<(), Error> {
    let name = run.name_any();
    let namespace = run_namespace(run)?;
    let config = resolve_config(run, ctx).await?;

    let status = run.status.get_or_insert_with(InferenceRunStatus::default);
    set_condition(&mut status.conditions, Condition::deleting());
    ctx.kube.patch_run_status(&namespace, &name, status).await?;

    let job_name = workload_name(run);
    let cascade = match run.status.as_ref().and_then(|s| s.job_status.as_ref()) {
        Some(snapshot) => should_delete(config.auto_delete_policy, classify(snapshot)),
        None => {
            warn!(
                workload = %job_name,
                "workload status not available, propagation to pods for job deletion disabled"
            );
            false
        }
    };

    info!(workload = %job_name, cascade, "deleting workload");
    ctx.workloads.delete_workload(run, &job_name, cascade).await?;
    publish(
        ctx,
        run,
        EventType::Normal,
        reasons::WORKLOAD_DELETED,
        actions::DELETE,
        format!("deleted {}", job_name),
    )
    .await;
    Ok(())
}

// =============================================================================
// Helpers
// =============================================================================

/// Fetch the referenced InferenceConfig; never cached across calls.
async fn resolve_config(run: &InferenceRun, ctx: &Context) -> Result<InferenceConfigSpec, Error> {
    let run_name = run.name_any();
    let run_ns = run_namespace(run)?;
    let reference = &run.spec.config_ref;
    let namespace = reference.namespace_or(&run_ns);

    if reference.name.is_empty() {
        return Err(Error::config_resolution(
            run_name,
            namespace,
            "",
            "configRef.name is empty",
        ));
    }

    let config = ctx
        .kube
        .get_config(namespace, &reference.name)
        .await
        .map_err(|e| Error::config_resolution(&run_name, namespace, &reference.name, e.to_string()))?;
    debug!(config = %reference.name, "retrieved InferenceConfig");
    Ok(config.spec)
}

/// Status of the run's current Job; a failed read counts as no Job.
async fn fetch_snapshot(run: &InferenceRun, job_name: &str, ctx: &Context) -> Option<WorkloadSnapshot> {
    match ctx.workloads.get_active_workload(run, job_name).await {
        Ok(job) => job.map(|j| j.status.as_ref().map(WorkloadSnapshot::from).unwrap_or_default()),
        Err(e) => {
            warn!(workload = %job_name, error = %e, "unable to retrieve job");
            None
        }
    }
}

async fn publish(
    ctx: &Context,
    run: &InferenceRun,
    type_: EventType,
    reason: &str,
    action: &str,
    note: String,
) {
    ctx.events
        .publish(&run.object_ref(&()), type_, reason, action, Some(note))
        .await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::MockKubeClient;
    use crate::naming::derive_name;
    use k8s_openapi::api::batch::v1::{CronJob, CronJobStatus, Job, JobStatus};
    use k8s_openapi::api::core::v1::{ConfigMap, ObjectReference};
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
    use kserve_common::crd::{
        AutoDeletePolicy, InferenceConfig, InferenceRunSpec, ObjectRef, StorageMap,
        StorageSpec, CONDITION_READY, REASON_AVAILABLE, REASON_CREATING,
        REASON_DELETING, REASON_FAILED,
    };
    use kube::core::ErrorResponse;
    use std::collections::BTreeMap;
    use std::sync::Mutex;

    const UID: &str = "6f1c2a9e-1d2b-4c3d-8e9f-0a1b2c3d4e5f";

    fn api_error(code: u16) -> Error {
        Error::from(kube::Error::Api(ErrorResponse {
            status: "Failure".to_string(),
            message: "test".to_string(),
            reason: "Test".to_string(),
            code,
        }))
    }

    fn sample_run(schedule: Option<&str>) -> InferenceRun {
        let mut run = InferenceRun::new(
            "iris-nightly",
            InferenceRunSpec {
                config_ref: ObjectRef {
                    name: "iris".to_string(),
                    namespace: None,
                },
                timeout_seconds: Some(600),
                parameters: Some(BTreeMap::from([(
                    "input_table_name".to_string(),
                    "iris_input".to_string(),
                )])),
                schedule: schedule.map(str::to_string),
            },
        );
        run.metadata.namespace = Some("ml".to_string());
        run.metadata.uid = Some(UID.to_string());
        run
    }

    fn sample_config(policy: Option<AutoDeletePolicy>) -> InferenceConfig {
        let mut config = InferenceConfig::new(
            "iris",
            InferenceConfigSpec {
                kserve: Default::default(),
                auto_delete_policy: policy,
                storage: StorageSpec {
                    input: StorageMap::from([(
                        "krateo".to_string(),
                        serde_json::json!({"api": {"path": "/compute/in", "verb": "GET"}}),
                    )]),
                    output: StorageMap::new(),
                },
                image: "ghcr.io/krateoplatformops/kserve-runner:0.1.0".to_string(),
                credentials_ref: None,
            },
        );
        config.metadata.namespace = Some("ml".to_string());
        config
    }

    fn job_status(active: i32, succeeded: i32, failed: i32) -> JobStatus {
        JobStatus {
            active: Some(active),
            succeeded: Some(succeeded),
            failed: Some(failed),
            ..Default::default()
        }
    }

    /// In-memory cluster behind a MockKubeClient.
    ///
    /// Records every write so tests assert on outcomes rather than on call
    /// sequences.
    #[derive(Clone, Default)]
    struct FakeCluster {
        config: Arc<Mutex<Option<InferenceConfig>>>,
        jobs: Arc<Mutex<BTreeMap<String, Job>>>,
        cron_jobs: Arc<Mutex<BTreeMap<String, CronJob>>>,
        config_maps: Arc<Mutex<BTreeMap<String, ConfigMap>>>,
        statuses: Arc<Mutex<Vec<InferenceRunStatus>>>,
        deleted_runs: Arc<Mutex<Vec<String>>>,
        deleted_workloads: Arc<Mutex<Vec<(String, bool)>>>,
    }

    impl FakeCluster {
        fn with_config(config: InferenceConfig) -> Self {
            let cluster = Self::default();
            *cluster.config.lock().unwrap() = Some(config);
            cluster
        }

        fn set_job_status(&self, name: &str, status: JobStatus) {
            let mut jobs = self.jobs.lock().unwrap();
            let job = jobs.entry(name.to_string()).or_insert_with(|| Job {
                metadata: ObjectMeta {
                    name: Some(name.to_string()),
                    ..Default::default()
                },
                ..Default::default()
            });
            job.status = Some(status);
        }

        fn status_writes(&self) -> usize {
            self.statuses.lock().unwrap().len()
        }

        fn last_status(&self) -> Option<InferenceRunStatus> {
            self.statuses.lock().unwrap().last().cloned()
        }

        fn last_ready_reason(&self) -> Option<String> {
            self.last_status().and_then(|s| {
                s.conditions
                    .iter()
                    .find(|c| c.type_ == CONDITION_READY)
                    .map(|c| c.reason.clone())
            })
        }

        fn context(&self) -> Context {
            let mut mock = MockKubeClient::new();

            let c = self.clone();
            mock.expect_get_config().returning(move |_, name| {
                c.config
                    .lock()
                    .unwrap()
                    .clone()
                    .filter(|cfg| cfg.metadata.name.as_deref() == Some(name))
                    .ok_or_else(|| api_error(404))
            });

            let c = self.clone();
            mock.expect_get_job()
                .returning(move |_, name| Ok(c.jobs.lock().unwrap().get(name).cloned()));

            let c = self.clone();
            mock.expect_get_cron_job()
                .returning(move |_, name| Ok(c.cron_jobs.lock().unwrap().get(name).cloned()));

            let c = self.clone();
            mock.expect_create_job().returning(move |_, job| {
                let name = job.metadata.name.clone().unwrap_or_default();
                let mut jobs = c.jobs.lock().unwrap();
                if jobs.contains_key(&name) {
                    return Err(api_error(409));
                }
                jobs.insert(name, job.clone());
                Ok(())
            });

            let c = self.clone();
            mock.expect_create_cron_job().returning(move |_, cron| {
                let name = cron.metadata.name.clone().unwrap_or_default();
                let mut crons = c.cron_jobs.lock().unwrap();
                if crons.contains_key(&name) {
                    return Err(api_error(409));
                }
                crons.insert(name, cron.clone());
                Ok(())
            });

            let c = self.clone();
            mock.expect_delete_job().returning(move |_, name, cascade| {
                c.deleted_workloads
                    .lock()
                    .unwrap()
                    .push((name.to_string(), cascade));
                match c.jobs.lock().unwrap().remove(name) {
                    Some(_) => Ok(()),
                    None => Err(api_error(404)),
                }
            });

            let c = self.clone();
            mock.expect_delete_cron_job().returning(move |_, name, cascade| {
                c.deleted_workloads
                    .lock()
                    .unwrap()
                    .push((name.to_string(), cascade));
                match c.cron_jobs.lock().unwrap().remove(name) {
                    Some(_) => Ok(()),
                    None => Err(api_error(404)),
                }
            });

            let c = self.clone();
            mock.expect_create_config_map().returning(move |_, cm| {
                let name = cm.metadata.name.clone().unwrap_or_default();
                let mut cms = c.config_maps.lock().unwrap();
                if cms.contains_key(&name) {
                    return Err(api_error(409));
                }
                cms.insert(name, cm.clone());
                Ok(())
            });

            let c = self.clone();
            mock.expect_replace_config_map().returning(move |_, cm| {
                let name = cm.metadata.name.clone().unwrap_or_default();
                c.config_maps.lock().unwrap().insert(name, cm.clone());
                Ok(())
            });

            let c = self.clone();
            mock.expect_patch_run_status().returning(move |_, _, status| {
                c.statuses.lock().unwrap().push(status.clone());
                Ok(())
            });

            let c = self.clone();
            mock.expect_delete_run().returning(move |_, name| {
                c.deleted_runs.lock().unwrap().push(name.to_string());
                Ok(())
            });

            Context::for_testing(Arc::new(mock))
        }
    }

    // =========================================================================
    // Lifecycle stories
    // =========================================================================

    /// Immediate run, DeleteOnSuccess: Create makes one Job, a succeeded Job
    /// gets the run deleted on the next Observe.
    #[tokio::test]
    async fn story_immediate_run_is_auto_deleted_after_success() {
        let cluster = FakeCluster::with_config(sample_config(Some(AutoDeletePolicy::DeleteOnSuccess)));
        let ctx = cluster.context();
        let mut run = sample_run(None);
        let expected = derive_name("inf", "iris-nightly", UID);

        let obs = observe(&mut run, &ctx).await.unwrap();
        assert_eq!(obs, Observation::absent());

        create(&mut run, &ctx).await.unwrap();
        assert_eq!(
            cluster.jobs.lock().unwrap().keys().cloned().collect::<Vec<_>>(),
            vec![expected.clone()]
        );
        assert!(cluster.cron_jobs.lock().unwrap().is_empty());
        assert_eq!(cluster.last_ready_reason().as_deref(), Some(REASON_CREATING));

        cluster.set_job_status(&expected, job_status(1, 0, 0));
        let obs = observe(&mut run, &ctx).await.unwrap();
        assert_eq!(obs, Observation::current());
        assert_eq!(cluster.last_ready_reason().as_deref(), Some(REASON_AVAILABLE));
        assert!(cluster.deleted_runs.lock().unwrap().is_empty());

        cluster.set_job_status(&expected, job_status(0, 1, 0));
        let obs = observe(&mut run, &ctx).await.unwrap();
        assert_eq!(obs, Observation::current());
        assert_eq!(*cluster.deleted_runs.lock().unwrap(), vec!["iris-nightly".to_string()]);
    }

    /// No policy, failed Job: Observe asks for an Update, never deletes;
    /// Update restarts the workload and leaves the run alone.
    #[tokio::test]
    async fn story_failed_run_without_policy_is_kept() {
        let cluster = FakeCluster::with_config(sample_config(Some(AutoDeletePolicy::None)));
        let ctx = cluster.context();
        let mut run = sample_run(None);
        let expected = derive_name("inf", "iris-nightly", UID);

        create(&mut run, &ctx).await.unwrap();
        cluster.set_job_status(&expected, job_status(0, 0, 1));

        let obs = observe(&mut run, &ctx).await.unwrap();
        assert_eq!(obs, Observation::outdated());
        assert_eq!(cluster.last_ready_reason().as_deref(), Some(REASON_FAILED));
        assert!(cluster.deleted_runs.lock().unwrap().is_empty());
        assert!(cluster.deleted_workloads.lock().unwrap().is_empty());
        assert!(cluster.jobs.lock().unwrap().contains_key(&expected));

        update(&mut run, &ctx).await.unwrap();
        assert!(cluster.deleted_runs.lock().unwrap().is_empty());
        assert_eq!(
            *cluster.deleted_workloads.lock().unwrap(),
            vec![(expected.clone(), true)]
        );

        // next cycle recreates it
        let obs = observe(&mut run, &ctx).await.unwrap();
        assert_eq!(obs, Observation::absent());
        create(&mut run, &ctx).await.unwrap();
        assert!(cluster.jobs.lock().unwrap().contains_key(&expected));
    }

    /// Recurring run: Create makes a CronJob, Observe follows it to the
    /// active child Job.
    #[tokio::test]
    async fn story_recurring_run_observes_cron_child() {
        let cluster = FakeCluster::with_config(sample_config(None));
        let ctx = cluster.context();
        let mut run = sample_run(Some("*/30 * * * *"));
        let wrapper = workload_name(&run);

        create(&mut run, &ctx).await.unwrap();
        assert!(cluster.jobs.lock().unwrap().is_empty());
        assert!(cluster.cron_jobs.lock().unwrap().contains_key(&wrapper));

        // nothing scheduled yet
        assert_eq!(observe(&mut run, &ctx).await.unwrap(), Observation::absent());

        let child = format!("{}-29012360", wrapper);
        cluster
            .cron_jobs
            .lock()
            .unwrap()
            .get_mut(&wrapper)
            .unwrap()
            .status = Some(CronJobStatus {
            active: Some(vec![ObjectReference {
                name: Some(child.clone()),
                ..Default::default()
            }]),
            ..Default::default()
        });
        cluster.set_job_status(&child, job_status(0, 1, 0));

        let obs = observe(&mut run, &ctx).await.unwrap();
        assert_eq!(obs, Observation::current());
        assert_eq!(
            run.status.as_ref().and_then(|s| s.job_status.as_ref()).map(|s| s.succeeded),
            Some(1)
        );
    }

    // =========================================================================
    // Observe
    // =========================================================================

    #[tokio::test]
    async fn observe_with_unresolvable_config_writes_nothing() {
        let mut mock = MockKubeClient::new();
        mock.expect_get_config().returning(|_, _| Err(api_error(404)));
        mock.expect_patch_run_status().never();
        mock.expect_create_config_map().never();
        mock.expect_get_job().never();
        let ctx = Context::for_testing(Arc::new(mock));

        let obs = observe(&mut sample_run(None), &ctx).await.unwrap();
        assert_eq!(obs, Observation::absent());
    }

    #[tokio::test]
    async fn observe_mirrors_contract_into_status_and_configmap() {
        let cluster = FakeCluster::with_config(sample_config(None));
        let ctx = cluster.context();
        let mut run = sample_run(None);

        observe(&mut run, &ctx).await.unwrap();
        observe(&mut run, &ctx).await.unwrap();

        let status = cluster.last_status().unwrap();
        let contract = status.contract.unwrap().0;
        let parsed = Contract::from_bytes(&contract).unwrap();
        assert_eq!(parsed.job_id, UID);
        assert_eq!(parsed.job_name, workload_name(&run));
        assert!(status.job_status.is_none());

        let cms = cluster.config_maps.lock().unwrap();
        let cm = cms.get(&workload_name(&run)).unwrap();
        assert_eq!(cm.binary_data.as_ref().unwrap()["contract.json"].0, contract);
    }

    #[tokio::test]
    async fn observe_clears_snapshot_when_workload_disappears() {
        let cluster = FakeCluster::with_config(sample_config(None));
        let ctx = cluster.context();
        let mut run = sample_run(None);
        let name = workload_name(&run);

        cluster.set_job_status(&name, job_status(1, 0, 0));
        observe(&mut run, &ctx).await.unwrap();
        assert!(run.status.as_ref().unwrap().job_status.is_some());

        cluster.jobs.lock().unwrap().clear();
        let obs = observe(&mut run, &ctx).await.unwrap();
        assert_eq!(obs, Observation::absent());
        assert!(cluster.last_status().unwrap().job_status.is_none());
    }

    #[tokio::test]
    async fn observe_writes_available_only_on_change() {
        let cluster = FakeCluster::with_config(sample_config(None));
        let ctx = cluster.context();
        let mut run = sample_run(None);
        cluster.set_job_status(&workload_name(&run), job_status(1, 0, 0));

        observe(&mut run, &ctx).await.unwrap();
        assert_eq!(cluster.status_writes(), 2);

        observe(&mut run, &ctx).await.unwrap();
        assert_eq!(cluster.status_writes(), 3);
    }

    #[tokio::test]
    async fn observe_failed_surfaces_job_message_on_ready_condition() {
        let cluster = FakeCluster::with_config(sample_config(None));
        let ctx = cluster.context();
        let mut run = sample_run(None);
        let name = workload_name(&run);
        cluster.set_job_status(
            &name,
            JobStatus {
                failed: Some(1),
                conditions: Some(vec![k8s_openapi::api::batch::v1::JobCondition {
                    type_: "Complete".to_string(),
                    status: "False".to_string(),
                    message: Some("pod exited 1".to_string()),
                    ..Default::default()
                }]),
                ..Default::default()
            },
        );

        let obs = observe(&mut run, &ctx).await.unwrap();
        assert_eq!(obs, Observation::outdated());
        let ready = cluster
            .last_status()
            .and_then(|s| s.conditions.into_iter().find(|c| c.type_ == CONDITION_READY))
            .unwrap();
        assert_eq!(ready.reason, REASON_FAILED);
        assert_eq!(ready.status, kserve_common::crd::ConditionStatus::False);
        assert_eq!(ready.message, "pod exited 1; ");
        assert_eq!(cluster.status_writes(), 2);

        // unchanged failure is not rewritten
        observe(&mut run, &ctx).await.unwrap();
        assert_eq!(cluster.status_writes(), 3);
    }

    #[tokio::test]
    async fn observe_treats_read_errors_as_missing_workload() {
        let mut mock = MockKubeClient::new();
        mock.expect_get_config()
            .returning(|_, _| Ok(sample_config(None)));
        mock.expect_get_job().returning(|_, _| Err(api_error(500)));
        mock.expect_patch_run_status().returning(|_, _, _| Ok(()));
        mock.expect_create_config_map().returning(|_, _| Ok(()));
        let ctx = Context::for_testing(Arc::new(mock));

        let obs = observe(&mut sample_run(None), &ctx).await.unwrap();
        assert_eq!(obs, Observation::absent());
    }

    #[tokio::test]
    async fn observe_succeeded_without_policy_is_available() {
        let cluster = FakeCluster::with_config(sample_config(None));
        let ctx = cluster.context();
        let mut run = sample_run(None);
        cluster.set_job_status(&workload_name(&run), job_status(0, 1, 0));

        let obs = observe(&mut run, &ctx).await.unwrap();
        assert_eq!(obs, Observation::current());
        assert!(cluster.deleted_runs.lock().unwrap().is_empty());
        assert_eq!(cluster.last_ready_reason().as_deref(), Some(REASON_AVAILABLE));
    }

    #[tokio::test]
    async fn observe_propagates_auto_delete_failure() {
        let mut mock = MockKubeClient::new();
        mock.expect_get_config().returning(|_, _| {
            Ok(sample_config(Some(AutoDeletePolicy::DeleteOnCompletion)))
        });
        mock.expect_get_job().returning(|_, _| {
            Ok(Some(Job {
                status: Some(job_status(0, 1, 0)),
                ..Default::default()
            }))
        });
        mock.expect_patch_run_status().returning(|_, _, _| Ok(()));
        mock.expect_create_config_map().returning(|_, _| Ok(()));
        mock.expect_delete_run().returning(|_, _| Err(api_error(500)));
        let ctx = Context::for_testing(Arc::new(mock));

        let err = observe(&mut sample_run(None), &ctx).await.unwrap_err();
        assert_eq!(err.api_code(), Some(500));
    }

    // =========================================================================
    // Create / Update
    // =========================================================================

    #[tokio::test]
    async fn create_twice_is_idempotent() {
        let cluster = FakeCluster::with_config(sample_config(None));
        let ctx = cluster.context();
        let mut run = sample_run(None);

        create(&mut run, &ctx).await.unwrap();
        create(&mut run, &ctx).await.unwrap();
        assert_eq!(cluster.jobs.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn create_survives_failed_refetch() {
        let mut mock = MockKubeClient::new();
        mock.expect_get_config()
            .returning(|_, _| Ok(sample_config(None)));
        mock.expect_create_job().returning(|_, _| Ok(()));
        mock.expect_get_job().returning(|_, _| Err(api_error(503)));
        mock.expect_patch_run_status()
            .withf(|_, _, status| status.job_status.is_none())
            .times(1)
            .returning(|_, _, _| Ok(()));
        let ctx = Context::for_testing(Arc::new(mock));

        create(&mut sample_run(None), &ctx).await.unwrap();
    }

    #[tokio::test]
    async fn create_fails_without_config() {
        let cluster = FakeCluster::default();
        let ctx = cluster.context();

        let err = create(&mut sample_run(None), &ctx).await.unwrap_err();
        assert!(matches!(err, Error::ConfigResolution { .. }));
        assert!(cluster.jobs.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn update_without_status_does_nothing() {
        let cluster = FakeCluster::with_config(sample_config(None));
        let ctx = cluster.context();

        update(&mut sample_run(None), &ctx).await.unwrap();
        assert!(cluster.deleted_workloads.lock().unwrap().is_empty());
        assert!(cluster.deleted_runs.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn update_deletes_failed_run_on_completion_policy() {
        let cluster =
            FakeCluster::with_config(sample_config(Some(AutoDeletePolicy::DeleteOnCompletion)));
        let ctx = cluster.context();
        let mut run = sample_run(None);
        cluster.set_job_status(&workload_name(&run), job_status(0, 0, 2));

        assert_eq!(observe(&mut run, &ctx).await.unwrap(), Observation::outdated());
        update(&mut run, &ctx).await.unwrap();
        assert_eq!(*cluster.deleted_runs.lock().unwrap(), vec!["iris-nightly".to_string()]);
        assert!(cluster.deleted_workloads.lock().unwrap().is_empty());
    }

    // =========================================================================
    // Delete
    // =========================================================================

    #[tokio::test]
    async fn delete_without_status_does_not_cascade() {
        let cluster = FakeCluster::with_config(sample_config(Some(AutoDeletePolicy::DeleteOnSuccess)));
        let ctx = cluster.context();
        let mut run = sample_run(None);

        delete(&mut run, &ctx).await.unwrap();
        assert_eq!(
            *cluster.deleted_workloads.lock().unwrap(),
            vec![(workload_name(&run), false)]
        );
        assert_eq!(cluster.last_ready_reason().as_deref(), Some(REASON_DELETING));
    }

    #[tokio::test]
    async fn delete_cascades_when_policy_covers_cached_status() {
        let cluster = FakeCluster::with_config(sample_config(Some(AutoDeletePolicy::DeleteOnSuccess)));
        let ctx = cluster.context();
        let mut run = sample_run(None);
        run.status = Some(InferenceRunStatus {
            job_status: Some(WorkloadSnapshot {
                succeeded: 1,
                ..Default::default()
            }),
            ..Default::default()
        });

        delete(&mut run, &ctx).await.unwrap();
        assert_eq!(
            *cluster.deleted_workloads.lock().unwrap(),
            vec![(workload_name(&run), true)]
        );
    }

    #[tokio::test]
    async fn delete_keeps_failed_pods_under_success_policy() {
        let cluster = FakeCluster::with_config(sample_config(Some(AutoDeletePolicy::DeleteOnSuccess)));
        let ctx = cluster.context();
        let mut run = sample_run(Some("@daily"));
        run.status = Some(InferenceRunStatus {
            job_status: Some(WorkloadSnapshot {
                failed: 1,
                ..Default::default()
            }),
            ..Default::default()
        });

        delete(&mut run, &ctx).await.unwrap();
        assert_eq!(
            *cluster.deleted_workloads.lock().unwrap(),
            vec![(workload_name(&run), false)]
        );
    }

    #[tokio::test]
    async fn delete_requires_config() {
        let cluster = FakeCluster::default();
        let ctx = cluster.context();

        let err = delete(&mut sample_run(None), &ctx).await.unwrap_err();
        assert!(matches!(err, Error::ConfigResolution { .. }));
        assert!(cluster.deleted_workloads.lock().unwrap().is_empty());
        assert_eq!(cluster.status_writes(), 0);
    }

    #[tokio::test]
    async fn config_ref_namespace_defaults_to_run_namespace() {
        let mut mock = MockKubeClient::new();
        mock.expect_get_config()
            .withf(|ns, name| ns == "ml" && name == "iris")
            .times(1)
            .returning(|_, _| Err(api_error(404)));
        let ctx = Context::for_testing(Arc::new(mock));
        observe(&mut sample_run(None), &ctx).await.unwrap();

        let mut mock = MockKubeClient::new();
        mock.expect_get_config()
            .withf(|ns, _| ns == "shared")
            .times(1)
            .returning(|_, _| Err(api_error(404)));
        let ctx = Context::for_testing(Arc::new(mock));
        let mut run = sample_run(None);
        run.spec.config_ref.namespace = Some("shared".to_string());
        observe(&mut run, &ctx).await.unwrap();
    }
}
