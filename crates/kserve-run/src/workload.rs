//! Workload lifecycle: the contract ConfigMap and the Job or CronJob
//!
//! Immediate runs own a single Job. Recurring runs own a CronJob whose Job
//! template is built exactly like the immediate Job. Both, and the contract
//! ConfigMap, carry a controller owner reference to the run so garbage
//! collection follows the run.

use std::collections::BTreeMap;
use std::sync::Arc;

use k8s_openapi::api::batch::v1::{CronJob, CronJobSpec, Job, JobSpec, JobTemplateSpec};
use k8s_openapi::api::core::v1::{
    ConfigMap, ConfigMapVolumeSource, Container, EnvVar, EnvVarSource, LocalObjectReference,
    ObjectFieldSelector, PodSpec, PodTemplateSpec, Volume, VolumeMount,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, OwnerReference};
use k8s_openapi::ByteString;
use kube::{Resource, ResourceExt};
use tracing::{debug, info};

use kserve_common::crd::{InferenceConfigSpec, InferenceRun, RunSchedule};
use kserve_common::{Error, CONTROLLER_NAME};

use crate::client::KubeClient;
use crate::contract::CONTRACT_KEY;
use crate::naming::{derive_name_with_limit, JOB_NAME_PREFIX, MAX_CRON_NAME_LEN, MAX_NAME_LEN};
use crate::policy::wants_ttl;

/// Label carrying the UID of the run a workload belongs to
pub const RUN_LABEL: &str = "ai.krateo.io/inference-run-uid";

/// Seconds a finished Job lingers before the TTL controller removes it
pub const FINISHED_TTL_SECONDS: i32 = 300;

/// Runner container name
pub const CONTAINER_NAME: &str = "inference";

const CONTRACT_VOLUME: &str = "contract";
const CONTRACT_MOUNT_PATH: &str = "/tmp";

/// Name shared by the run's workload and contract ConfigMap
pub fn workload_name(run: &InferenceRun) -> String {
    let limit = match run.spec.schedule() {
        RunSchedule::Immediate => MAX_NAME_LEN,
        RunSchedule::Recurring(_) => MAX_CRON_NAME_LEN,
    };
    derive_name_with_limit(
        JOB_NAME_PREFIX,
        &run.name_any(),
        run.metadata.uid.as_deref().unwrap_or_default(),
        limit,
    )
}

/// Controller owner reference pointing at `run`
pub fn owner_reference(run: &InferenceRun) -> Result<OwnerReference, Error> {
    run.controller_owner_ref(&())
        .map(|mut owner| {
            owner.block_owner_deletion = Some(true);
            owner
        })
        .ok_or_else(|| Error::validation_for(run.name_any(), "run has no uid"))
}

fn labels(run: &InferenceRun) -> BTreeMap<String, String> {
    BTreeMap::from([
        (
            "app.kubernetes.io/managed-by".to_string(),
            CONTROLLER_NAME.to_string(),
        ),
        (
            RUN_LABEL.to_string(),
            run.metadata.uid.clone().unwrap_or_default(),
        ),
    ])
}

fn object_meta(name: &str, run: &InferenceRun, owner: OwnerReference) -> ObjectMeta {
    ObjectMeta {
        name: Some(name.to_string()),
        namespace: run.namespace(),
        labels: Some(labels(run)),
        owner_references: Some(vec![owner]),
        ..Default::default()
    }
}

/// Job spec shared by immediate Jobs and CronJob templates.
pub fn build_job_spec(
    name: &str,
    run: &InferenceRun,
    config: &InferenceConfigSpec,
    service_account: Option<&str>,
) -> JobSpec {
    let container = Container {
        name: CONTAINER_NAME.to_string(),
        image: Some(config.image.clone()),
        image_pull_policy: Some("Always".to_string()),
        env: Some(vec![EnvVar {
            name: "pod_uid".to_string(),
            value_from: Some(EnvVarSource {
                field_ref: Some(ObjectFieldSelector {
                    field_path: "metadata.uid".to_string(),
                    ..Default::default()
                }),
                ..Default::default()
            }),
            ..Default::default()
        }]),
        volume_mounts: Some(vec![VolumeMount {
            name: CONTRACT_VOLUME.to_string(),
            mount_path: CONTRACT_MOUNT_PATH.to_string(),
            read_only: Some(true),
            ..Default::default()
        }]),
        ..Default::default()
    };

    let volume = Volume {
        name: CONTRACT_VOLUME.to_string(),
        config_map: Some(ConfigMapVolumeSource {
            name: name.to_string(),
            ..Default::default()
        }),
        ..Default::default()
    };

    let image_pull_secrets = config.credentials_ref.as_ref().map(|creds| {
        vec![LocalObjectReference {
            name: creds.name.clone(),
        }]
    });

    JobSpec {
        completions: Some(1),
        active_deadline_seconds: run.spec.active_deadline_seconds(),
        ttl_seconds_after_finished: wants_ttl(config.auto_delete_policy)
            .then_some(FINISHED_TTL_SECONDS),
        template: PodTemplateSpec {
            metadata: Some(ObjectMeta {
                labels: Some(labels(run)),
                ..Default::default()
            }),
            spec: Some(PodSpec {
                containers: vec![container],
                volumes: Some(vec![volume]),
                image_pull_secrets,
                restart_policy: Some("Never".to_string()),
                service_account_name: service_account
                    .filter(|sa| !sa.is_empty())
                    .map(str::to_string),
                ..Default::default()
            }),
        },
        ..Default::default()
    }
}

/// Immediate Job for `run`
pub fn build_job(
    name: &str,
    run: &InferenceRun,
    config: &InferenceConfigSpec,
    owner: OwnerReference,
    service_account: Option<&str>,
) -> Job {
    Job {
        metadata: object_meta(name, run, owner),
        spec: Some(build_job_spec(name, run, config, service_account)),
        ..Default::default()
    }
}

/// CronJob firing `schedule`, wrapping the same Job spec as [`build_job`]
pub fn build_cron_job(
    name: &str,
    schedule: &str,
    run: &InferenceRun,
    config: &InferenceConfigSpec,
    owner: OwnerReference,
    service_account: Option<&str>,
) -> CronJob {
    CronJob {
        metadata: object_meta(name, run, owner),
        spec: Some(CronJobSpec {
            schedule: schedule.to_string(),
            job_template: JobTemplateSpec {
                metadata: Some(ObjectMeta {
                    labels: Some(labels(run)),
                    ..Default::default()
                }),
                spec: Some(build_job_spec(name, run, config, service_account)),
            },
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// Contract ConfigMap holding `contract` under `contract.json`
pub fn build_contract_config_map(
    name: &str,
    run: &InferenceRun,
    contract: &[u8],
    owner: OwnerReference,
) -> ConfigMap {
    ConfigMap {
        metadata: object_meta(name, run, owner),
        binary_data: Some(BTreeMap::from([(
            CONTRACT_KEY.to_string(),
            ByteString(contract.to_vec()),
        )])),
        ..Default::default()
    }
}

/// Most recently scheduled child Job of a CronJob.
///
/// Child names end in the scheduled minute, so the greatest name is the
/// newest.
pub fn active_child_name(cron_job: &CronJob) -> Option<String> {
    cron_job
        .status
        .as_ref()?
        .active
        .as_ref()?
        .iter()
        .filter_map(|r| r.name.clone())
        .max()
}

/// Creates, finds and deletes the objects a run owns
pub struct WorkloadManager {
    kube: Arc<dyn KubeClient>,
    service_account: Option<String>,
}

impl WorkloadManager {
    /// Manager whose workloads run as `service_account`
    pub fn new(kube: Arc<dyn KubeClient>, service_account: Option<String>) -> Self {
        Self {
            kube,
            service_account,
        }
    }

    /// Create the contract ConfigMap, or replace it if it already exists.
    pub async fn ensure_artifact(
        &self,
        name: &str,
        namespace: &str,
        contract: &[u8],
        run: &InferenceRun,
    ) -> Result<(), Error> {
        let config_map = build_contract_config_map(name, run, contract, owner_reference(run)?);

        match self.kube.create_config_map(namespace, &config_map).await {
            Ok(()) => {
                debug!(configmap = %name, namespace = %namespace, "created contract configmap");
                Ok(())
            }
            Err(create) if create.is_conflict() => self
                .kube
                .replace_config_map(namespace, &config_map)
                .await
                .map_err(|update| Error::Artifact {
                    name: name.to_string(),
                    create: create.to_string(),
                    update: update.to_string(),
                }),
            Err(e) => Err(e),
        }
    }

    /// Materialize the run's workload. An existing workload is left as is.
    pub async fn ensure_workload(
        &self,
        name: &str,
        run: &InferenceRun,
        config: &InferenceConfigSpec,
    ) -> Result<(), Error> {
        match run.spec.schedule() {
            RunSchedule::Immediate => self.create_job(name, run, config).await,
            RunSchedule::Recurring(schedule) => {
                self.create_cron_job(name, schedule, run, config).await
            }
        }
    }

    /// Create the Job for an immediate run
    pub async fn create_job(
        &self,
        name: &str,
        run: &InferenceRun,
        config: &InferenceConfigSpec,
    ) -> Result<(), Error> {
        let namespace = run_namespace(run)?;
        let job = build_job(
            name,
            run,
            config,
            owner_reference(run)?,
            self.service_account.as_deref(),
        );
        tolerate_conflict(self.kube.create_job(&namespace, &job).await, "Job", name)
    }

    /// Create the CronJob for a recurring run
    pub async fn create_cron_job(
        &self,
        name: &str,
        schedule: &str,
        run: &InferenceRun,
        config: &InferenceConfigSpec,
    ) -> Result<(), Error> {
        let namespace = run_namespace(run)?;
        let cron_job = build_cron_job(
            name,
            schedule,
            run,
            config,
            owner_reference(run)?,
            self.service_account.as_deref(),
        );
        tolerate_conflict(
            self.kube.create_cron_job(&namespace, &cron_job).await,
            "CronJob",
            name,
        )
    }

    /// Delete the run's Job or CronJob; an already missing workload is fine.
    ///
    /// Without `cascade` only the top-level object is removed and dependents
    /// are left to the garbage collector.
    pub async fn delete_workload(
        &self,
        run: &InferenceRun,
        name: &str,
        cascade: bool,
    ) -> Result<(), Error> {
        let namespace = run_namespace(run)?;
        let result = match run.spec.schedule() {
            RunSchedule::Immediate => self.kube.delete_job(&namespace, name, cascade).await,
            RunSchedule::Recurring(_) => {
                self.kube.delete_cron_job(&namespace, name, cascade).await
            }
        };
        match result {
            Err(e) if e.is_not_found() => {
                debug!(workload = %name, namespace = %namespace, "workload already deleted");
                Ok(())
            }
            other => other,
        }
    }

    /// The Job whose status describes the run, if one exists yet.
    ///
    /// Recurring runs are followed through their CronJob to the newest
    /// active child; no active child means nothing to observe.
    pub async fn get_active_workload(
        &self,
        run: &InferenceRun,
        name: &str,
    ) -> Result<Option<Job>, Error> {
        let namespace = run_namespace(run)?;
        match run.spec.schedule() {
            RunSchedule::Immediate => self.kube.get_job(&namespace, name).await,
            RunSchedule::Recurring(_) => {
                let Some(cron_job) = self.kube.get_cron_job(&namespace, name).await? else {
                    return Ok(None);
                };
                match active_child_name(&cron_job) {
                    Some(child) => self.kube.get_job(&namespace, &child).await,
                    None => {
                        debug!(cronjob = %name, namespace = %namespace, "no active job");
                        Ok(None)
                    }
                }
            }
        }
    }
}

pub(crate) fn run_namespace(run: &InferenceRun) -> Result<String, Error> {
    run.namespace()
        .ok_or_else(|| Error::validation_for(run.name_any(), "run has no namespace"))
}

fn tolerate_conflict(result: Result<(), Error>, kind: &str, name: &str) -> Result<(), Error> {
    match result {
        Err(e) if e.is_conflict() => {
            info!(kind, workload = %name, "workload already exists");
            Ok(())
        }
        other => other,
    }
}
