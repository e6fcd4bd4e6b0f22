//! Kubernetes access for the InferenceRun controller
//!
//! Everything the reconciler reads or writes goes through [`KubeClient`] so
//! the engine can be driven by mocks in tests. The production implementation
//! wraps one shared `kube::Client`.

use async_trait::async_trait;
use k8s_openapi::api::batch::v1::{CronJob, Job};
use k8s_openapi::api::core::v1::ConfigMap;
use kube::api::{
    Api, DeleteParams, DynamicObject, GroupVersionKind, Patch, PatchParams, PostParams,
};
use kube::discovery::ApiResource;
use kube::Client;
use tracing::debug;

#[cfg(test)]
use mockall::automock;

use kserve_common::crd::{InferenceConfig, InferenceRun, InferenceRunStatus};
use kserve_common::{Error, API_GROUP, API_VERSION, CONTROLLER_NAME};

/// Plural resource name InferenceConfigs are resolved through
pub const INFERENCE_CONFIG_PLURAL: &str = "inferenceconfigs";

/// Trait abstracting Kubernetes operations for InferenceRuns
///
/// All methods address objects by namespace and name. Reads of objects that
/// may legitimately be missing return `Ok(None)` on 404.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait KubeClient: Send + Sync {
    /// Resolve an InferenceConfig through the dynamic API
    async fn get_config(&self, namespace: &str, name: &str) -> Result<InferenceConfig, Error>;

    /// Get a batch Job
    async fn get_job(&self, namespace: &str, name: &str) -> Result<Option<Job>, Error>;

    /// Get a CronJob
    async fn get_cron_job(&self, namespace: &str, name: &str) -> Result<Option<CronJob>, Error>;

    /// Create a batch Job
    async fn create_job(&self, namespace: &str, job: &Job) -> Result<(), Error>;

    /// Create a CronJob
    async fn create_cron_job(&self, namespace: &str, cron_job: &CronJob) -> Result<(), Error>;

    /// Delete a batch Job; `cascade` propagates to its pods in the background
    async fn delete_job(&self, namespace: &str, name: &str, cascade: bool) -> Result<(), Error>;

    /// Delete a CronJob; `cascade` propagates to its Jobs in the background
    async fn delete_cron_job(&self, namespace: &str, name: &str, cascade: bool)
        -> Result<(), Error>;

    /// Create a ConfigMap
    async fn create_config_map(&self, namespace: &str, config_map: &ConfigMap)
        -> Result<(), Error>;

    /// Replace an existing ConfigMap at its current resourceVersion
    async fn replace_config_map(
        &self,
        namespace: &str,
        config_map: &ConfigMap,
    ) -> Result<(), Error>;

    /// Overwrite the status of an InferenceRun
    ///
    /// A missing `job_status` is written as `null` so the stored snapshot is
    /// cleared rather than left behind.
    async fn patch_run_status(
        &self,
        namespace: &str,
        name: &str,
        status: &InferenceRunStatus,
    ) -> Result<(), Error>;

    /// Delete an InferenceRun
    async fn delete_run(&self, namespace: &str, name: &str) -> Result<(), Error>;

    /// Add a finalizer to an InferenceRun if it is not present
    async fn add_run_finalizer(
        &self,
        namespace: &str,
        name: &str,
        finalizer: &str,
    ) -> Result<(), Error>;

    /// Remove a finalizer from an InferenceRun
    async fn remove_run_finalizer(
        &self,
        namespace: &str,
        name: &str,
        finalizer: &str,
    ) -> Result<(), Error>;
}

/// Real Kubernetes client implementation
pub struct KubeClientImpl {
    client: Client,
    config_resource: ApiResource,
}

impl KubeClientImpl {
    /// Create a new KubeClientImpl wrapping the given kube Client
    pub fn new(client: Client) -> Self {
        let gvk = GroupVersionKind::gvk(API_GROUP, API_VERSION, "InferenceConfig");
        Self {
            client,
            config_resource: ApiResource::from_gvk_with_plural(&gvk, INFERENCE_CONFIG_PLURAL),
        }
    }

    fn runs(&self, namespace: &str) -> Api<InferenceRun> {
        Api::namespaced(self.client.clone(), namespace)
    }
}

fn delete_params(cascade: bool) -> DeleteParams {
    if cascade {
        DeleteParams::background()
    } else {
        DeleteParams::default()
    }
}

fn status_patch(status: &InferenceRunStatus) -> serde_json::Value {
    serde_json::json!({
        "status": {
            "conditions": status.conditions,
            "contract": status.contract,
            "jobStatus": status.job_status,
        }
    })
}

#[async_trait]
impl KubeClient for KubeClientImpl {
    async fn get_config(&self, namespace: &str, name: &str) -> Result<InferenceConfig, Error> {
        let api: Api<DynamicObject> =
            Api::namespaced_with(self.client.clone(), namespace, &self.config_resource);
        let obj = api.get(name).await?;
        let value = serde_json::to_value(&obj)?;
        serde_json::from_value(value)
            .map_err(|e| Error::serialization_for_kind("InferenceConfig", e.to_string()))
    }

    async fn get_job(&self, namespace: &str, name: &str) -> Result<Option<Job>, Error> {
        let api: Api<Job> = Api::namespaced(self.client.clone(), namespace);
        Ok(api.get_opt(name).await?)
    }

    async fn get_cron_job(&self, namespace: &str, name: &str) -> Result<Option<CronJob>, Error> {
        let api: Api<CronJob> = Api::namespaced(self.client.clone(), namespace);
        Ok(api.get_opt(name).await?)
    }

    async fn create_job(&self, namespace: &str, job: &Job) -> Result<(), Error> {
        let api: Api<Job> = Api::namespaced(self.client.clone(), namespace);
        api.create(&PostParams::default(), job).await?;
        Ok(())
    }

    async fn create_cron_job(&self, namespace: &str, cron_job: &CronJob) -> Result<(), Error> {
        let api: Api<CronJob> = Api::namespaced(self.client.clone(), namespace);
        api.create(&PostParams::default(), cron_job).await?;
        Ok(())
    }

    async fn delete_job(&self, namespace: &str, name: &str, cascade: bool) -> Result<(), Error> {
        let api: Api<Job> = Api::namespaced(self.client.clone(), namespace);
        api.delete(name, &delete_params(cascade)).await?;
        Ok(())
    }

    async fn delete_cron_job(
        &self,
        namespace: &str,
        name: &str,
        cascade: bool,
    ) -> Result<(), Error> {
        let api: Api<CronJob> = Api::namespaced(self.client.clone(), namespace);
        api.delete(name, &delete_params(cascade)).await?;
        Ok(())
    }

    async fn create_config_map(
        &self,
        namespace: &str,
        config_map: &ConfigMap,
    ) -> Result<(), Error> {
        let api: Api<ConfigMap> = Api::namespaced(self.client.clone(), namespace);
        api.create(&PostParams::default(), config_map).await?;
        Ok(())
    }

    async fn replace_config_map(
        &self,
        namespace: &str,
        config_map: &ConfigMap,
    ) -> Result<(), Error> {
        let api: Api<ConfigMap> = Api::namespaced(self.client.clone(), namespace);
        let name = config_map
            .metadata
            .name
            .as_deref()
            .ok_or_else(|| Error::internal_with_context("replace_config_map", "ConfigMap has no name"))?;

        let current = api.get(name).await?;
        let mut replacement = config_map.clone();
        replacement.metadata.resource_version = current.metadata.resource_version;

        api.replace(name, &PostParams::default(), &replacement)
            .await?;
        Ok(())
    }

    async fn patch_run_status(
        &self,
        namespace: &str,
        name: &str,
        status: &InferenceRunStatus,
    ) -> Result<(), Error> {
        self.runs(namespace)
            .patch_status(
                name,
                &PatchParams::apply(CONTROLLER_NAME),
                &Patch::Merge(&status_patch(status)),
            )
            .await?;
        Ok(())
    }

    async fn delete_run(&self, namespace: &str, name: &str) -> Result<(), Error> {
        self.runs(namespace)
            .delete(name, &DeleteParams::default())
            .await?;
        Ok(())
    }

    async fn add_run_finalizer(
        &self,
        namespace: &str,
        name: &str,
        finalizer: &str,
    ) -> Result<(), Error> {
        let api = self.runs(namespace);

        let run = api.get(name).await?;
        let mut finalizers = run.metadata.finalizers.unwrap_or_default();
        if finalizers.iter().any(|f| f == finalizer) {
            return Ok(());
        }
        finalizers.push(finalizer.to_string());

        let patch = serde_json::json!({ "metadata": { "finalizers": finalizers } });
        api.patch(
            name,
            &PatchParams::apply(CONTROLLER_NAME),
            &Patch::Merge(&patch),
        )
        .await?;
        Ok(())
    }

    async fn remove_run_finalizer(
        &self,
        namespace: &str,
        name: &str,
        finalizer: &str,
    ) -> Result<(), Error> {
        let api = self.runs(namespace);

        let Some(run) = api.get_opt(name).await? else {
            debug!(run = %name, namespace = %namespace, "run already gone, nothing to unblock");
            return Ok(());
        };
        let finalizers: Vec<String> = run
            .metadata
            .finalizers
            .unwrap_or_default()
            .into_iter()
            .filter(|f| f != finalizer)
            .collect();

        let patch = serde_json::json!({ "metadata": { "finalizers": finalizers } });
        api.patch(
            name,
            &PatchParams::apply(CONTROLLER_NAME),
            &Patch::Merge(&patch),
        )
        .await?;
        Ok(())
    }
}
