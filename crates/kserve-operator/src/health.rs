//! Liveness and readiness endpoints for the kubelet
//!
//! - `GET /healthz` answers as long as the process serves HTTP
//! - `GET /readyz` answers 200 once the controller is running, 503 before

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::get;
use axum::Router;
use tracing::{error, info};

/// Shared flag flipped once the controller has started
#[derive(Clone, Debug, Default)]
pub struct Readiness(Arc<AtomicBool>);

impl Readiness {
    /// Report ready from now on
    pub fn mark_ready(&self) {
        self.0.store(true, Ordering::Release);
    }

    /// Whether [`Readiness::mark_ready`] has been called
    pub fn is_ready(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Build the probe router
pub fn health_routes(readiness: Readiness) -> Router {
    Router::new()
        .route("/healthz", get(|| async { "ok" }))
        .route("/readyz", get(readyz))
        .with_state(readiness)
}

async fn readyz(State(readiness): State<Readiness>) -> (StatusCode, &'static str) {
    if readiness.is_ready() {
        (StatusCode::OK, "ok")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "controller not started")
    }
}

/// Serve the probe endpoints on `addr` until the process exits
pub async fn start_health_server(addr: SocketAddr, readiness: Readiness) {
    let app = health_routes(readiness);
    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(l) => {
            info!(addr = %addr, "Health probe server started");
            l
        }
        Err(e) => {
            error!(error = %e, addr = %addr, "Failed to bind health probe address");
            return;
        }
    };
    if let Err(e) = axum::serve(listener, app).await {
        error!(error = %e, "Health probe server error");
    }
}
