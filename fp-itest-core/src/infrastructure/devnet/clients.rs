use crate::domain::{BlockInfo, ChainAccount, FinalityProviderRecord, Vote};
use crate::foundation::{BtcPublicKey, Height, ItestError};
use crate::infrastructure::devnet::chain::DevnetChain;
use crate::infrastructure::rpc::{ConsensusController, ConsumerController, RegisterFinalityProvider};
use async_trait::async_trait;
use log::debug;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Consensus-node client signing transactions with `account` (if any).
pub struct DevnetConsensusClient {
    chain: Arc<DevnetChain>,
    account: Option<ChainAccount>,
    started: AtomicBool,
}

impl DevnetConsensusClient {
    pub fn new(chain: Arc<DevnetChain>, account: Option<ChainAccount>) -> Self {
        Self { chain, account, started: AtomicBool::new(false) }
    }

    fn ensure_started(&self) -> Result<(), ItestError> {
        if self.started.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(ItestError::NodeRpcError("consensus controller not started".to_string()))
        }
    }
}

#[async_trait]
impl ConsensusController for DevnetConsensusClient {
    async fn start(&self) -> Result<(), ItestError> {
        self.chain.ensure_reachable()?;
        if !self.started.swap(true, Ordering::SeqCst) {
            debug!("consensus controller started chain_id={} account={:?}", self.chain.chain_id(), self.account.as_ref().map(|a| &a.address));
        }
        Ok(())
    }

    async fn query_light_client_tip(&self) -> Result<Height, ItestError> {
        self.chain.light_client_tip()
    }

    async fn query_finality_providers(&self) -> Result<Vec<FinalityProviderRecord>, ItestError> {
        self.chain.finality_providers()
    }

    async fn query_votes_at_height(&self, height: Height) -> Result<Vec<BtcPublicKey>, ItestError> {
        self.chain.votes_at(height)
    }

    async fn register_finality_provider(&self, request: RegisterFinalityProvider) -> Result<FinalityProviderRecord, ItestError> {
        self.ensure_started()?;
        let account = self.account.as_ref().ok_or_else(|| ItestError::NodeRpcError("controller has no signing account".to_string()))?;
        if account.address != request.address {
            return Err(ItestError::NodeRpcError(format!("signer {} cannot register for {}", account.address, request.address)));
        }
        self.chain.register(request)
    }

    async fn submit_finality_signature(&self, vote: Vote) -> Result<(), ItestError> {
        self.ensure_started()?;
        self.chain.submit_vote(vote)
    }
}

pub struct DevnetConsumerClient {
    chain: Arc<DevnetChain>,
}

impl DevnetConsumerClient {
    pub fn new(chain: Arc<DevnetChain>) -> Self {
        Self { chain }
    }
}

#[async_trait]
impl ConsumerController for DevnetConsumerClient {
    async fn query_is_block_finalized(&self, height: Height) -> Result<bool, ItestError> {
        self.chain.is_finalized(height)
    }

    async fn query_latest_block_height(&self) -> Result<Height, ItestError> {
        self.chain.latest_height()
    }

    async fn query_latest_finalized_block(&self) -> Result<Option<BlockInfo>, ItestError> {
        self.chain.latest_finalized()
    }

    async fn query_block(&self, height: Height) -> Result<BlockInfo, ItestError> {
        self.chain.block(height)
    }
}
