//! The concrete collaborators a [`crate::TestManager`] drives.
//!
//! [`Collaborators::devnet`] wires everything to in-process test doubles; individual pieces can be
//! swapped (e.g. an external signing-service binary through [`ProcessSignerFactory`]).

mod devnet;
mod process;

pub use devnet::{DevnetClientFactory, InProcessSignerFactory, SigningServiceLauncher};
pub use process::ProcessSignerFactory;

use fp_itest_core::foundation::ItestError;
use fp_itest_core::infrastructure::config::DevnetConfig;
use fp_itest_core::infrastructure::devnet::{DevnetAppFactory, DevnetChainKeyring, DevnetContainerManager, DevnetNetwork};
use fp_itest_core::infrastructure::lifecycle::ServiceLauncher;
use fp_itest_core::infrastructure::rpc::{AppFactory, ChainKeyring, ClientFactory, ContainerManager};
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;

/// Produces the launcher of the signing service for one environment.
pub trait SigningServiceFactory: Send + Sync {
    fn launcher(&self, home_dir: &Path, rpc_addr: SocketAddr, metrics_addr: SocketAddr) -> Result<Box<dyn ServiceLauncher>, ItestError>;
}

#[derive(Clone)]
pub struct Collaborators {
    pub containers: Arc<dyn ContainerManager>,
    pub clients: Arc<dyn ClientFactory>,
    pub chain_keyring: Arc<dyn ChainKeyring>,
    pub apps: Arc<dyn AppFactory>,
    pub signer: Arc<dyn SigningServiceFactory>,
}

impl Collaborators {
    /// Simulated node, in-process HTTP signing service and devnet finality-provider apps.
    pub fn devnet(config: DevnetConfig) -> Self {
        let network = DevnetNetwork::new(config);
        Self {
            containers: Arc::new(DevnetContainerManager::new(Arc::clone(&network))),
            clients: Arc::new(DevnetClientFactory::new(network)),
            chain_keyring: Arc::new(DevnetChainKeyring),
            apps: Arc::new(DevnetAppFactory),
            signer: Arc::new(InProcessSignerFactory::new()),
        }
    }

    pub fn with_signer(mut self, signer: Arc<dyn SigningServiceFactory>) -> Self {
        self.signer = signer;
        self
    }
}
