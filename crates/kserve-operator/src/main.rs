//! KServe inference-run controller

use clap::Parser;
use kube::Client;

use kserve_common::telemetry::{init_telemetry, shutdown_telemetry, TelemetryConfig};
use kserve_operator::cli::Cli;
use kserve_operator::controller_runner::build_run_controller;
use kserve_operator::health::{start_health_server, Readiness};
use kserve_operator::startup::{crd_yaml, ensure_crds_installed};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if cli.crd {
        println!("{}", crd_yaml()?);
        return Ok(());
    }

    init_telemetry(TelemetryConfig::default())
        .map_err(|e| anyhow::anyhow!("failed to initialize telemetry: {}", e))?;

    let result = run(cli).await;
    shutdown_telemetry();
    result
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        polling_interval_secs = cli.poll_interval().as_secs(),
        max_reconcile_rate = cli.concurrency(),
        "Starting kserve-controller"
    );

    let readiness = Readiness::default();
    tokio::spawn(start_health_server(
        cli.health_probe_bind_address,
        readiness.clone(),
    ));

    let client = Client::try_default()
        .await
        .map_err(|e| anyhow::anyhow!("failed to create Kubernetes client: {}", e))?;

    if cli.install_crds {
        ensure_crds_installed(&client).await?;
    }

    let controller = build_run_controller(client, &cli);
    readiness.mark_ready();
    controller.await;

    tracing::info!("Controller stopped");
    Ok(())
}
