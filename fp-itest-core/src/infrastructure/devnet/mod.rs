//! In-process implementations of every collaborator interface, so a whole environment can run
//! inside one test process: a simulated consensus node, a signing keyring, chain-account keys and
//! a finality-provider application.
//!
//! These are test doubles with deliberately simple rules, not a consensus implementation.

mod accounts;
mod app;
mod chain;
mod clients;
mod keyring;

pub use accounts::{DevnetChainKeyring, KEYRING_DIR};
pub use app::{DevnetAppFactory, DevnetFpApp, DevnetFpInstance};
pub use chain::{account_address, parse_coin, DevnetChain, DevnetChainConfig, BTC_LIGHT_CLIENT_BASE_HEIGHT, REGISTRATION_FEE};
pub use clients::{DevnetConsensusClient, DevnetConsumerClient};
pub use keyring::DevnetKeyring;

use crate::domain::{ChainAccount, NodeEndpoints};
use crate::foundation::{AccountAddress, ItestError, GENESIS_FUNDER};
use crate::infrastructure::config::DevnetConfig;
use crate::infrastructure::lifecycle::ServiceHandle;
use crate::infrastructure::rpc::{ContainerManager, GenesisParams, NodeContainer};
use async_trait::async_trait;
use log::info;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

/// Node directory layout: genesis and node keys live under `<node_dir>/node0/babylond`.
pub const NODE_HOME_SUBDIR: &str = "node0/babylond";

/// Every devnet node started in this process, addressed by its RPC endpoint.
pub struct DevnetNetwork {
    config: DevnetConfig,
    nodes: Mutex<HashMap<String, Arc<DevnetChain>>>,
    latest: Mutex<Option<Arc<DevnetChain>>>,
}

impl DevnetNetwork {
    pub fn new(config: DevnetConfig) -> Arc<Self> {
        Arc::new(Self { config, nodes: Mutex::new(HashMap::new()), latest: Mutex::new(None) })
    }

    pub fn config(&self) -> &DevnetConfig {
        &self.config
    }

    /// Resolves an endpoint the way a network client would: unknown endpoints refuse connections.
    pub fn chain(&self, endpoints: &NodeEndpoints) -> Result<Arc<DevnetChain>, ItestError> {
        self.nodes
            .lock()
            .get(&endpoints.rpc_addr)
            .cloned()
            .ok_or_else(|| ItestError::NodeRpcError(format!("dial {}: connection refused", endpoints.rpc_addr)))
    }

    /// Client construction fails while the node is still starting.
    pub fn consensus_client(&self, endpoints: &NodeEndpoints, account: Option<&ChainAccount>) -> Result<DevnetConsensusClient, ItestError> {
        let chain = self.chain(endpoints)?;
        chain.ensure_reachable()?;
        Ok(DevnetConsensusClient::new(chain, account.cloned()))
    }

    pub fn consumer_client(&self, endpoints: &NodeEndpoints) -> Result<DevnetConsumerClient, ItestError> {
        let chain = self.chain(endpoints)?;
        chain.ensure_reachable()?;
        Ok(DevnetConsumerClient::new(chain))
    }
}

struct DevnetNodeHandle {
    chain: Arc<DevnetChain>,
}

#[async_trait]
impl ServiceHandle for DevnetNodeHandle {
    async fn stop(&mut self) -> Result<(), ItestError> {
        self.chain.shutdown().await;
        Ok(())
    }
}

/// Stands in for the container runtime: "running a node container" starts a [`DevnetChain`].
pub struct DevnetContainerManager {
    network: Arc<DevnetNetwork>,
}

impl DevnetContainerManager {
    pub fn new(network: Arc<DevnetNetwork>) -> Self {
        Self { network }
    }

    fn latest_chain(&self) -> Result<Arc<DevnetChain>, ItestError> {
        self.network.latest.lock().clone().ok_or_else(|| ItestError::NodeRpcError("no node container running".to_string()))
    }

    fn resolve_account(from: &str) -> Result<AccountAddress, ItestError> {
        if from == GENESIS_FUNDER {
            Ok(DevnetChain::genesis_funder_address())
        } else {
            Err(ItestError::NodeRpcError(format!("unknown sender key {from}")))
        }
    }
}

#[async_trait]
impl ContainerManager for DevnetContainerManager {
    async fn run_node(&self, node_dir: &Path, genesis: &GenesisParams) -> Result<NodeContainer, ItestError> {
        let home = node_dir.join(NODE_HOME_SUBDIR);
        std::fs::create_dir_all(&home)?;
        std::fs::write(home.join("genesis.json"), serde_json::to_vec_pretty(genesis)?)?;

        let name = node_dir.file_name().and_then(|name| name.to_str()).unwrap_or("node");
        let endpoints = NodeEndpoints { rpc_addr: format!("devnet://{name}/rpc"), grpc_addr: format!("devnet://{name}/grpc") };
        let chain = DevnetChain::new(DevnetChainConfig {
            genesis: genesis.clone(),
            block_time: self.network.config.block_time(),
            startup_delay: self.network.config.node_startup_delay(),
        });
        chain.spawn_producer();
        self.network.nodes.lock().insert(endpoints.rpc_addr.clone(), Arc::clone(&chain));
        *self.network.latest.lock() = Some(Arc::clone(&chain));
        info!(
            "devnet node container started rpc={} chain_id={} covenant_quorum={} covenants={}",
            endpoints.rpc_addr,
            genesis.chain_id,
            genesis.covenant_quorum,
            genesis.covenant_pks.len()
        );
        Ok(NodeContainer { endpoints, handle: Box::new(DevnetNodeHandle { chain }) })
    }

    async fn bank_send(&self, to: &AccountAddress, amount: &str, from: &str) -> Result<(), ItestError> {
        let chain = self.latest_chain()?;
        chain.transfer(&Self::resolve_account(from)?, to, parse_coin(amount)?)
    }

    async fn clear_resources(&self) -> Result<(), ItestError> {
        let nodes: Vec<Arc<DevnetChain>> = self.network.nodes.lock().drain().map(|(_, chain)| chain).collect();
        *self.network.latest.lock() = None;
        for chain in &nodes {
            chain.shutdown().await;
        }
        info!("devnet resources cleared nodes={}", nodes.len());
        Ok(())
    }
}
