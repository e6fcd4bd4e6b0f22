//! Controller runner - builds the InferenceRun controller future

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use futures::StreamExt;
use k8s_openapi::api::batch::v1::{CronJob, Job};
use kube::runtime::controller::Config as ControllerConfig;
use kube::runtime::watcher::Config as WatcherConfig;
use kube::runtime::Controller;
use kube::{Api, Client};

use kserve_common::crd::InferenceRun;
use kserve_run::{error_policy, reconcile, Context};

use crate::cli::Cli;

/// Watcher timeout (seconds) - must be less than client read_timeout (30s)
/// This forces the API server to close the watch before the client times out,
/// preventing "body read timed out" errors on idle watches.
const WATCH_TIMEOUT_SECS: u32 = 25;

/// Api handle scoped to the watched namespace, or cluster-wide
fn scoped_api<K>(client: Client, namespace: Option<&str>) -> Api<K>
where
    K: kube::Resource<Scope = kube::core::NamespaceResourceScope>,
    <K as kube::Resource>::DynamicType: Default,
{
    match namespace {
        Some(ns) => Api::namespaced(client, ns),
        None => Api::all(client),
    }
}

/// Build the InferenceRun controller future
///
/// Jobs and CronJobs owned by a run trigger its reconcile in addition to the
/// periodic poll.
pub fn build_run_controller(client: Client, cli: &Cli) -> Pin<Box<dyn Future<Output = ()> + Send>> {
    let ctx = Arc::new(
        Context::builder(client.clone())
            .poll_interval(cli.poll_interval())
            .service_account(cli.service_account())
            .event_instance(cli.pod_name.clone())
            .build(),
    );

    let namespace = cli.namespace();
    match namespace {
        Some(ns) => tracing::info!(namespace = %ns, "Watching InferenceRuns in namespace"),
        None => tracing::info!("Watching InferenceRuns in all namespaces"),
    }

    let runs: Api<InferenceRun> = scoped_api(client.clone(), namespace);
    let jobs: Api<Job> = scoped_api(client.clone(), namespace);
    let cron_jobs: Api<CronJob> = scoped_api(client, namespace);

    Box::pin(
        Controller::new(runs, WatcherConfig::default().timeout(WATCH_TIMEOUT_SECS))
            .owns(jobs, WatcherConfig::default().timeout(WATCH_TIMEOUT_SECS))
            .owns(cron_jobs, WatcherConfig::default().timeout(WATCH_TIMEOUT_SECS))
            .with_config(ControllerConfig::default().concurrency(cli.concurrency()))
            .shutdown_on_signal()
            .run(reconcile, error_policy, ctx)
            .for_each(log_reconcile_result("InferenceRun")),
    )
}

/// Creates a closure for logging reconciliation results.
fn log_reconcile_result<T: std::fmt::Debug, E: std::fmt::Debug>(
    controller_name: &'static str,
) -> impl Fn(Result<T, E>) -> std::future::Ready<()> {
    move |result| {
        match result {
            Ok(action) => tracing::debug!(?action, "{} reconciliation completed", controller_name),
            Err(e) => tracing::error!(error = ?e, "{} reconciliation error", controller_name),
        }
        std::future::ready(())
    }
}
