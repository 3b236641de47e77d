//! HTTP surfaces: the signing service and the per-instance status server.

pub mod types;

mod handlers;
mod middleware;
mod router;
mod server;
mod state;

pub use router::{build_instance_metrics_router, build_instance_router, build_signer_metrics_router, build_signer_router};
pub use server::{spawn_server, HttpServer, ServerGroup};
pub use state::{InstanceState, SignerState};

use crate::metrics::{InstanceMetrics, SignerMetrics};
use axum::Router;
use fp_itest_core::foundation::ItestError;
use fp_itest_core::infrastructure::devnet::DevnetKeyring;
use fp_itest_core::infrastructure::lifecycle::ServiceHandle;
use fp_itest_core::infrastructure::rpc::FinalityProviderInstance;
use log::warn;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;

async fn bind(addr: SocketAddr) -> Result<TcpListener, ItestError> {
    TcpListener::bind(addr).await.map_err(|err| ItestError::process("http", format!("bind {addr}: {err}")))
}

/// Binds both listeners before serving either, so a failed bind leaves nothing running.
async fn serve_pair(rpc: (&str, SocketAddr, Router), metrics: (&str, SocketAddr, Router)) -> Result<ServerGroup, ItestError> {
    let rpc_listener = bind(rpc.1).await?;
    let metrics_listener = bind(metrics.1).await?;
    let mut rpc_server = spawn_server(rpc.0, rpc_listener, rpc.2)?;
    match spawn_server(metrics.0, metrics_listener, metrics.2) {
        Ok(metrics_server) => Ok(ServerGroup::new(vec![rpc_server, metrics_server])),
        Err(err) => {
            if let Err(stop_err) = rpc_server.stop().await {
                warn!("server cleanup failed name={} error={}", rpc.0, stop_err);
            }
            Err(err)
        }
    }
}

/// Serves the signing API on `rpc_addr` and Prometheus metrics on `metrics_addr`.
pub async fn run_signing_service(
    keyring: Arc<DevnetKeyring>,
    rpc_addr: SocketAddr,
    metrics_addr: SocketAddr,
) -> Result<ServerGroup, ItestError> {
    let metrics = Arc::new(SignerMetrics::new()?);
    let state = Arc::new(SignerState { keyring, metrics: Arc::clone(&metrics) });
    serve_pair(
        ("signer-rpc", rpc_addr, build_signer_router(state)),
        ("signer-metrics", metrics_addr, build_signer_metrics_router(metrics)),
    )
    .await
}

/// Serves `/health` and `/status` for one finality provider on `rpc_addr`, metrics on `metrics_addr`.
pub async fn run_instance_server(
    instance: Arc<dyn FinalityProviderInstance>,
    rpc_addr: SocketAddr,
    metrics_addr: SocketAddr,
) -> Result<ServerGroup, ItestError> {
    let metrics = Arc::new(InstanceMetrics::new()?);
    let state = Arc::new(InstanceState { instance, metrics });
    serve_pair(
        ("fp-rpc", rpc_addr, build_instance_router(Arc::clone(&state))),
        ("fp-metrics", metrics_addr, build_instance_metrics_router(state)),
    )
    .await
}
