//! Liveness and readiness endpoints
//!
//! - `GET /healthz` answers `ok` while the process is up
//! - `GET /readyz` answers `ok` once this replica runs controllers, 503 before
//!   that (standby replicas waiting for the lease stay unready)

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::get;
use axum::Router;
use tracing::{error, info};

/// Shared readiness flag flipped by `main` around the controllers
#[derive(Clone, Debug, Default)]
pub struct Readiness(Arc<AtomicBool>);

impl Readiness {
    /// Mark the replica as running controllers
    pub fn set_ready(&self, ready: bool) {
        self.0.store(ready, Ordering::SeqCst);
    }

    /// Whether controllers are running
    pub fn is_ready(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

async fn readyz(State(readiness): State<Readiness>) -> (StatusCode, &'static str) {
    if readiness.is_ready() {
        (StatusCode::OK, "ok")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "not ready")
    }
}

/// Build the probe router
pub fn health_routes(readiness: Readiness) -> Router {
    Router::new()
        .route("/healthz", get(|| async { "ok" }))
        .route("/readyz", get(readyz))
        .with_state(readiness)
}

/// Serve the probe endpoints on `addr` until the process exits
pub async fn serve_health(addr: SocketAddr, readiness: Readiness) {
    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(l) => {
            info!(addr = %addr, "health probe server started");
            l
        }
        Err(e) => {
            error!(error = %e, addr = %addr, "failed to bind health probe address");
            return;
        }
    };
    if let Err(e) = axum::serve(listener, health_routes(readiness)).await {
        error!(error = %e, "health probe server error");
    }
}
