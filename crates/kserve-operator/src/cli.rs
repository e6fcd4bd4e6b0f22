//! Command-line and environment configuration

use std::net::SocketAddr;
use std::time::Duration;

use clap::Parser;

/// Poll interval when `--polling-interval` is zero or unset
pub const DEFAULT_POLLING_INTERVAL_SECS: u64 = 300;

/// KServe inference-run controller
#[derive(Parser, Debug, Clone)]
#[command(name = "kserve-controller", version, about, long_about = None)]
pub struct Cli {
    /// Namespace to watch; empty watches all namespaces
    #[arg(long, env = "WATCH_NAMESPACE", default_value = "")]
    pub watch_namespace: String,

    /// Seconds between observations of a healthy run (0 = default)
    #[arg(long, env = "POLLING_INTERVAL", default_value_t = DEFAULT_POLLING_INTERVAL_SECS)]
    pub polling_interval: u64,

    /// Runs reconciled concurrently
    #[arg(long, env = "MAX_RECONCILE_RATE", default_value_t = 1)]
    pub max_reconcile_rate: u16,

    /// Service account the inference pods run as
    #[arg(long, env = "SA_RUNNER")]
    pub runner_service_account: Option<String>,

    /// Address serving `/healthz` and `/readyz`
    #[arg(long, env = "HEALTH_PROBE_BIND_ADDRESS", default_value = "0.0.0.0:8081")]
    pub health_probe_bind_address: SocketAddr,

    /// Pod name reported as the instance on published Events
    #[arg(long, env = "POD_NAME")]
    pub pod_name: Option<String>,

    /// Install or update the CRDs with server-side apply before starting
    #[arg(long, env = "INSTALL_CRDS")]
    pub install_crds: bool,

    /// Print the CRD manifests and exit
    #[arg(long)]
    pub crd: bool,
}

impl Cli {
    /// Namespace scope of the watch; `None` means cluster-wide
    pub fn namespace(&self) -> Option<&str> {
        Some(self.watch_namespace.trim()).filter(|ns| !ns.is_empty())
    }

    /// Requeue interval for healthy runs
    pub fn poll_interval(&self) -> Duration {
        match self.polling_interval {
            0 => Duration::from_secs(DEFAULT_POLLING_INTERVAL_SECS),
            secs => Duration::from_secs(secs),
        }
    }

    /// Reconcile concurrency, at least one
    pub fn concurrency(&self) -> u16 {
        self.max_reconcile_rate.max(1)
    }

    /// Runner service account, if a non-empty one was given
    pub fn service_account(&self) -> Option<String> {
        self.runner_service_account
            .as_deref()
            .map(str::trim)
            .filter(|sa| !sa.is_empty())
            .map(str::to_string)
    }
}
