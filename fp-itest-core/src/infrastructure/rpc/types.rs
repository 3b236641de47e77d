use crate::domain::{CommissionRate, Description};
use crate::foundation::{AccountAddress, BtcPublicKey, ChainId, KeyName};
use crate::infrastructure::rpc::{ConsensusController, ConsumerController, SigningClient};
use crate::infrastructure::storage::FpStateStore;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

#[derive(Clone, Debug, Eq, PartialEq, Deserialize, Serialize)]
pub struct RegisterFinalityProvider {
    pub btc_pk: BtcPublicKey,
    pub address: AccountAddress,
    pub chain_id: ChainId,
    pub description: Description,
    pub commission: CommissionRate,
    /// Signature by `btc_pk` over the proof-of-possession digest of `address`.
    pub pop: Vec<u8>,
}

#[derive(Clone, Debug)]
pub struct CreateFinalityProvider {
    pub key_name: KeyName,
    pub chain_id: ChainId,
    pub passphrase: String,
    pub btc_pk: BtcPublicKey,
    pub description: Description,
    pub commission: CommissionRate,
}

/// Genesis parameters handed to the node container.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct GenesisParams {
    pub chain_id: ChainId,
    pub covenant_quorum: usize,
    pub covenant_pks: Vec<BtcPublicKey>,
}

#[derive(Clone, Debug)]
pub struct FpAppConfig {
    pub key_name: KeyName,
    pub chain_id: ChainId,
    pub home_dir: PathBuf,
    pub account: AccountAddress,
    pub vote_interval: Duration,
}

/// Everything an [`crate::infrastructure::rpc::AppFactory`] needs to build one application.
#[derive(Clone)]
pub struct AppContext {
    pub config: FpAppConfig,
    pub consensus: Arc<dyn ConsensusController>,
    pub consumer: Arc<dyn ConsumerController>,
    pub signer: Arc<dyn SigningClient>,
    pub store: Arc<dyn FpStateStore>,
}
