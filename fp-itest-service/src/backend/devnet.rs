use super::SigningServiceFactory;
use crate::api::run_signing_service;
use crate::clients::HttpSigningClient;
use async_trait::async_trait;
use fp_itest_core::domain::{ChainAccount, NodeEndpoints};
use fp_itest_core::foundation::ItestError;
use fp_itest_core::infrastructure::devnet::{DevnetKeyring, DevnetNetwork};
use fp_itest_core::infrastructure::lifecycle::{ServiceHandle, ServiceLauncher};
use fp_itest_core::infrastructure::rpc::{ClientFactory, ConsensusController, ConsumerController, SigningClient};
use log::debug;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Devnet node clients plus the HTTP signing client.
pub struct DevnetClientFactory {
    network: Arc<DevnetNetwork>,
}

impl DevnetClientFactory {
    pub fn new(network: Arc<DevnetNetwork>) -> Self {
        Self { network }
    }
}

#[async_trait]
impl ClientFactory for DevnetClientFactory {
    async fn consensus_controller(
        &self,
        endpoints: &NodeEndpoints,
        account: Option<&ChainAccount>,
    ) -> Result<Arc<dyn ConsensusController>, ItestError> {
        Ok(Arc::new(self.network.consensus_client(endpoints, account)?))
    }

    async fn consumer_controller(&self, endpoints: &NodeEndpoints) -> Result<Arc<dyn ConsumerController>, ItestError> {
        Ok(Arc::new(self.network.consumer_client(endpoints)?))
    }

    async fn signing_client(&self, addr: SocketAddr) -> Result<Arc<dyn SigningClient>, ItestError> {
        Ok(Arc::new(HttpSigningClient::connect(addr).await?))
    }
}

/// Runs the signing service inside this process. The keyring outlives every launch, so keys survive
/// a restart of the service.
pub struct InProcessSignerFactory {
    keyring: Arc<DevnetKeyring>,
}

impl InProcessSignerFactory {
    pub fn new() -> Self {
        Self { keyring: Arc::new(DevnetKeyring::new()) }
    }

    pub fn keyring(&self) -> Arc<DevnetKeyring> {
        Arc::clone(&self.keyring)
    }
}

impl Default for InProcessSignerFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl SigningServiceFactory for InProcessSignerFactory {
    fn launcher(&self, home_dir: &Path, rpc_addr: SocketAddr, metrics_addr: SocketAddr) -> Result<Box<dyn ServiceLauncher>, ItestError> {
        Ok(Box::new(SigningServiceLauncher {
            keyring: Arc::clone(&self.keyring),
            home_dir: home_dir.to_path_buf(),
            rpc_addr,
            metrics_addr,
        }))
    }
}

pub struct SigningServiceLauncher {
    keyring: Arc<DevnetKeyring>,
    home_dir: PathBuf,
    rpc_addr: SocketAddr,
    metrics_addr: SocketAddr,
}

#[async_trait]
impl ServiceLauncher for SigningServiceLauncher {
    async fn launch(&self, name: &str) -> Result<Box<dyn ServiceHandle>, ItestError> {
        std::fs::create_dir_all(&self.home_dir)?;
        debug!("launching in-process signing service service={} home={} rpc={}", name, self.home_dir.display(), self.rpc_addr);
        let servers = run_signing_service(Arc::clone(&self.keyring), self.rpc_addr, self.metrics_addr).await?;
        Ok(Box::new(servers))
    }
}
