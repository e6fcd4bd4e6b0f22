//! InferenceRun controller: drives the engine verbs from the watch loop

use std::sync::Arc;
use std::time::Duration;

use kube::runtime::controller::Action;
use kube::ResourceExt;
use tracing::{debug, error, info, instrument, warn};

use kserve_common::crd::InferenceRun;
use kserve_common::metrics::{ErrorType, ReconcileTimer};
use kserve_common::Error;

use crate::engine::{self, Context};
use crate::workload::run_namespace;

/// Finalizer holding a run until its workload is torn down
pub const RUN_FINALIZER: &str = "ai.krateo.io/workload-cleanup";

/// Requeue delay after any reconcile error
pub const ERROR_REQUEUE: Duration = Duration::from_secs(30);

/// Reconcile an InferenceRun
///
/// Observe first; a run without a workload is created, a run whose workload
/// failed is updated, and everything else is polled again after the
/// context's interval. Runs being deleted have their workload torn down
/// before the finalizer is released.
#[instrument(skip(run, ctx), fields(run = %run.name_any(), namespace = ?run.namespace()))]
pub async fn reconcile(run: Arc<InferenceRun>, ctx: Arc<Context>) -> Result<Action, Error> {
    let timer = ReconcileTimer::start(run.namespace().unwrap_or_default());
    let result = reconcile_run((*run).clone(), &ctx).await;
    match &result {
        Ok(_) => timer.success(),
        Err(e) => timer.error(ErrorType::from(e)),
    }
    result
}

async fn reconcile_run(mut run: InferenceRun, ctx: &Context) -> Result<Action, Error> {
    debug!("reconciling run");

    if run.metadata.deletion_timestamp.is_some() {
        return handle_deletion(&mut run, ctx).await;
    }

    if !has_finalizer(&run) {
        info!("adding finalizer");
        ctx.kube
            .add_run_finalizer(&run_namespace(&run)?, &run.name_any(), RUN_FINALIZER)
            .await?;
        return Ok(Action::requeue(Duration::from_secs(1)));
    }

    let observation = engine::observe(&mut run, ctx).await?;
    if !observation.resource_exists {
        engine::create(&mut run, ctx).await?;
    } else if !observation.resource_up_to_date {
        engine::update(&mut run, ctx).await?;
    }

    Ok(Action::requeue(ctx.poll_interval))
}

/// Error policy for the controller
///
/// Every failure is retried after [`ERROR_REQUEUE`]; retryability only sets
/// how loudly it is reported.
pub fn error_policy(run: Arc<InferenceRun>, error: &Error, _ctx: Arc<Context>) -> Action {
    if error.is_retryable() {
        warn!(
            ?error,
            run = %run.name_any(),
            "reconciliation failed, retrying"
        );
    } else {
        error!(
            ?error,
            run = %run.name_any(),
            "reconciliation failed"
        );
    }
    Action::requeue(ERROR_REQUEUE)
}

async fn handle_deletion(run: &mut InferenceRun, ctx: &Context) -> Result<Action, Error> {
    if !has_finalizer(run) {
        return Ok(Action::await_change());
    }

    match engine::delete(run, ctx).await {
        Ok(()) => {}
        // Owner references still let the garbage collector reap the workload
        Err(e @ Error::ConfigResolution { .. }) => {
            warn!(error = %e, "releasing run without explicit workload teardown");
        }
        Err(e) => return Err(e),
    }

    info!("removing finalizer");
    ctx.kube
        .remove_run_finalizer(&run_namespace(run)?, &run.name_any(), RUN_FINALIZER)
        .await?;
    Ok(Action::await_change())
}

fn has_finalizer(run: &InferenceRun) -> bool {
    run.finalizers().iter().any(|f| f == RUN_FINALIZER)
}
