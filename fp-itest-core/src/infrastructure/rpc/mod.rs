//! Interfaces of the external systems an integration environment drives.
//!
//! The orchestration layer only talks to the consensus node, the signing service, finality-provider
//! applications and the container runtime through these traits.

mod types;

pub use types::*;

use crate::domain::{BlockInfo, ChainAccount, FinalityProviderRecord, KeyRecord, NodeEndpoints, Vote};
use crate::foundation::{AccountAddress, BtcPublicKey, Height, ItestError, KeyName};
use crate::infrastructure::lifecycle::ServiceHandle;
use async_trait::async_trait;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;

/// Privileged client of the consensus node.
#[async_trait]
pub trait ConsensusController: Send + Sync {
    async fn start(&self) -> Result<(), ItestError>;
    /// Height of the BTC light client tip; the cheapest "is the node up" query.
    async fn query_light_client_tip(&self) -> Result<Height, ItestError>;
    async fn query_finality_providers(&self) -> Result<Vec<FinalityProviderRecord>, ItestError>;
    async fn query_votes_at_height(&self, height: Height) -> Result<Vec<BtcPublicKey>, ItestError>;
    async fn register_finality_provider(&self, request: RegisterFinalityProvider) -> Result<FinalityProviderRecord, ItestError>;
    async fn submit_finality_signature(&self, vote: Vote) -> Result<(), ItestError>;
}

/// Read-only view of the chain the finality providers vote on.
#[async_trait]
pub trait ConsumerController: Send + Sync {
    async fn query_is_block_finalized(&self, height: Height) -> Result<bool, ItestError>;
    async fn query_latest_block_height(&self) -> Result<Height, ItestError>;
    async fn query_latest_finalized_block(&self) -> Result<Option<BlockInfo>, ItestError>;
    async fn query_block(&self, height: Height) -> Result<BlockInfo, ItestError>;
}

/// Client of the key-management / signing service.
#[async_trait]
pub trait SigningClient: Send + Sync {
    async fn create_key(&self, name: &KeyName, passphrase: &str, hd_path: &str) -> Result<BtcPublicKey, ItestError>;
    async fn key_record(&self, public_key: &BtcPublicKey, passphrase: &str) -> Result<KeyRecord, ItestError>;
    /// BIP-340 signature over a 32-byte digest, 64 bytes.
    async fn sign(&self, public_key: &BtcPublicKey, digest: &[u8; 32], passphrase: &str) -> Result<Vec<u8>, ItestError>;
}

/// The running voting loop of one registered finality provider.
#[async_trait]
pub trait FinalityProviderInstance: Send + Sync {
    fn btc_pk(&self) -> BtcPublicKey;
    fn last_voted_height(&self) -> Height;
    fn is_running(&self) -> bool;
    async fn start(&self) -> Result<(), ItestError>;
    async fn stop(&self) -> Result<(), ItestError>;
}

/// A finality-provider application: owns its clients, its persistence and at most one instance.
#[async_trait]
pub trait FinalityProviderApp: Send + Sync {
    async fn start(&self) -> Result<(), ItestError>;
    /// Stops the instance (if any) and the app. Stopping twice is harmless.
    async fn stop(&self) -> Result<(), ItestError>;
    async fn create_finality_provider(&self, request: CreateFinalityProvider) -> Result<FinalityProviderRecord, ItestError>;
    async fn start_finality_provider(&self, btc_pk: &BtcPublicKey, passphrase: &str) -> Result<(), ItestError>;
    fn instance(&self) -> Result<Arc<dyn FinalityProviderInstance>, ItestError>;
}

#[async_trait]
pub trait AppFactory: Send + Sync {
    async fn build(&self, context: AppContext) -> Result<Arc<dyn FinalityProviderApp>, ItestError>;
}

/// Container runtime hosting the consensus node.
#[async_trait]
pub trait ContainerManager: Send + Sync {
    async fn run_node(&self, node_dir: &Path, genesis: &GenesisParams) -> Result<NodeContainer, ItestError>;
    async fn bank_send(&self, to: &AccountAddress, amount: &str, from: &str) -> Result<(), ItestError>;
    /// Removes every container and network created by this manager.
    async fn clear_resources(&self) -> Result<(), ItestError>;
}

/// Local keyring for chain accounts (the key an instance pays fees with).
pub trait ChainKeyring: Send + Sync {
    fn create_chain_key(&self, key_dir: &Path, key_name: &KeyName, passphrase: &str, hd_path: &str) -> Result<ChainAccount, ItestError>;
}

/// Builds clients bound to a node or a signing service. Construction may fail while the target is
/// still starting; callers wrap it in a bounded retry.
#[async_trait]
pub trait ClientFactory: Send + Sync {
    async fn consensus_controller(
        &self,
        endpoints: &NodeEndpoints,
        account: Option<&ChainAccount>,
    ) -> Result<Arc<dyn ConsensusController>, ItestError>;
    async fn consumer_controller(&self, endpoints: &NodeEndpoints) -> Result<Arc<dyn ConsumerController>, ItestError>;
    async fn signing_client(&self, addr: SocketAddr) -> Result<Arc<dyn SigningClient>, ItestError>;
}

/// A node started by a [`ContainerManager`].
pub struct NodeContainer {
    pub endpoints: NodeEndpoints,
    pub handle: Box<dyn ServiceHandle>,
}

impl std::fmt::Debug for NodeContainer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeContainer").field("endpoints", &self.endpoints).finish_non_exhaustive()
    }
}
