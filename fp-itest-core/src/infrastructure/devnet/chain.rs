use crate::domain::{pop_digest, verify_schnorr, verify_vote, vote_digest, BlockInfo, FinalityProviderRecord, Vote};
use crate::foundation::{
    AccountAddress, BlockHash, BtcPublicKey, ChainId, Height, ItestError, FUNDING_DENOM, GENESIS_FUNDER, GENESIS_FUNDER_BALANCE,
};
use crate::infrastructure::rpc::{GenesisParams, RegisterFinalityProvider};
use log::{debug, info, trace};
use parking_lot::Mutex;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Height reported by the simulated BTC light client.
pub const BTC_LIGHT_CLIENT_BASE_HEIGHT: Height = 100;

/// Fee charged for registering a finality provider.
pub const REGISTRATION_FEE: u64 = 1_000;

/// Deterministic bech32-looking address for devnet accounts.
pub fn account_address(seed: &[u8]) -> AccountAddress {
    let digest = blake3::hash(seed);
    AccountAddress::from(format!("bbn1{}", hex::encode(&digest.as_bytes()[..20])))
}

/// Parses `"<amount><denom>"`, e.g. `1000000ubbn`.
pub fn parse_coin(coin: &str) -> Result<u64, ItestError> {
    let coin = coin.trim();
    let split = coin.find(|c: char| !c.is_ascii_digit()).unwrap_or(coin.len());
    let (amount, denom) = coin.split_at(split);
    if denom != FUNDING_DENOM {
        return Err(ItestError::NodeRpcError(format!("unsupported denom in {coin:?}, expected {FUNDING_DENOM}")));
    }
    amount.parse().map_err(|err| ItestError::NodeRpcError(format!("invalid amount in {coin:?}: {err}")))
}

#[derive(Clone, Debug)]
pub struct DevnetChainConfig {
    pub genesis: GenesisParams,
    pub block_time: Duration,
    /// The node refuses every request for this long after it was created.
    pub startup_delay: Duration,
}

#[derive(Default)]
struct ChainState {
    blocks: Vec<BlockInfo>,
    providers: BTreeMap<BtcPublicKey, FinalityProviderRecord>,
    votes: HashMap<Height, BTreeSet<BtcPublicKey>>,
    balances: HashMap<AccountAddress, u64>,
    /// Lowest height whose finalization has not been decided yet.
    finalization_cursor: Height,
    last_finalized: Option<Height>,
    stopped: bool,
}

impl ChainState {
    fn tip(&self) -> Height {
        self.blocks.len() as Height
    }

    fn block(&self, height: Height) -> Result<&BlockInfo, ItestError> {
        if height == 0 {
            return Err(ItestError::NodeRpcError("block 0 does not exist".to_string()));
        }
        self.blocks.get((height - 1) as usize).ok_or_else(|| ItestError::NodeRpcError(format!("block {height} not found")))
    }

    fn eligible_voters(&self, height: Height) -> usize {
        self.providers.values().filter(|fp| fp.registered_at <= height).count()
    }

    /// Finalizes blocks in order. A block needs votes from more than 2/3 of the providers registered at or
    /// below its height; blocks without any such provider can never finalize and are skipped.
    fn advance_finalization(&mut self) {
        while self.finalization_cursor <= self.tip() {
            let height = self.finalization_cursor;
            let eligible = self.eligible_voters(height);
            if eligible > 0 {
                let votes = self.votes.get(&height).map_or(0, |voters| voters.len());
                if 3 * votes <= 2 * eligible {
                    break;
                }
                self.blocks[(height - 1) as usize].finalized = true;
                self.last_finalized = Some(height);
                debug!("devnet block finalized height={} votes={} eligible={}", height, votes, eligible);
            }
            self.finalization_cursor += 1;
        }
    }
}

/// Simulated consensus node: produces blocks on a timer, keeps a finality-provider set and finalizes
/// blocks from their votes.
pub struct DevnetChain {
    chain_id: ChainId,
    genesis: GenesisParams,
    block_time: Duration,
    reachable_at: Instant,
    state: Mutex<ChainState>,
    shutdown_tx: watch::Sender<bool>,
    producer: Mutex<Option<JoinHandle<()>>>,
}

impl DevnetChain {
    pub fn new(config: DevnetChainConfig) -> Arc<Self> {
        let mut state = ChainState { finalization_cursor: 1, ..Default::default() };
        state.balances.insert(Self::genesis_funder_address(), GENESIS_FUNDER_BALANCE);
        let (shutdown_tx, _) = watch::channel(false);
        Arc::new(Self {
            chain_id: config.genesis.chain_id.clone(),
            genesis: config.genesis,
            block_time: config.block_time,
            reachable_at: Instant::now() + config.startup_delay,
            state: Mutex::new(state),
            shutdown_tx,
            producer: Mutex::new(None),
        })
    }

    pub fn genesis_funder_address() -> AccountAddress {
        account_address(GENESIS_FUNDER.as_bytes())
    }

    pub fn chain_id(&self) -> &ChainId {
        &self.chain_id
    }

    pub fn genesis(&self) -> &GenesisParams {
        &self.genesis
    }

    /// Starts the block producer. The task only holds a weak reference and ends on [`Self::shutdown`].
    pub fn spawn_producer(self: &Arc<Self>) {
        let weak: Weak<Self> = Arc::downgrade(self);
        let mut shutdown_rx = self.shutdown_tx.subscribe();
        let block_time = self.block_time;
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(block_time);
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let Some(chain) = weak.upgrade() else { break };
                        chain.produce_block();
                    }
                    changed = shutdown_rx.changed() => {
                        if changed.is_err() || *shutdown_rx.borrow() {
                            break;
                        }
                    }
                }
            }
            trace!("devnet block producer exited");
        });
        *self.producer.lock() = Some(handle);
    }

    /// Stops block production and makes every later request fail. Idempotent.
    pub async fn shutdown(&self) {
        self.state.lock().stopped = true;
        let _ = self.shutdown_tx.send(true);
        let handle = self.producer.lock().take();
        if let Some(handle) = handle {
            let _ = handle.await;
            info!("devnet node stopped chain_id={}", self.chain_id);
        }
    }

    pub fn ensure_reachable(&self) -> Result<(), ItestError> {
        if self.state.lock().stopped {
            return Err(ItestError::NodeRpcError("node stopped".to_string()));
        }
        if Instant::now() < self.reachable_at {
            return Err(ItestError::NodeRpcError("connection refused".to_string()));
        }
        Ok(())
    }

    pub fn produce_block(&self) -> BlockInfo {
        let mut state = self.state.lock();
        let height = state.tip() + 1;
        let parent = state.blocks.last().map(|block| block.hash).unwrap_or_default();
        let mut hasher = blake3::Hasher::new();
        hasher.update(self.chain_id.as_bytes());
        hasher.update(&height.to_be_bytes());
        hasher.update(parent.as_hash());
        let block = BlockInfo { height, hash: BlockHash::new(*hasher.finalize().as_bytes()), finalized: false };
        state.blocks.push(block.clone());
        trace!("devnet block produced height={} hash={}", height, block.hash);
        state.advance_finalization();
        block
    }

    pub fn light_client_tip(&self) -> Result<Height, ItestError> {
        self.ensure_reachable()?;
        Ok(BTC_LIGHT_CLIENT_BASE_HEIGHT)
    }

    pub fn latest_height(&self) -> Result<Height, ItestError> {
        self.ensure_reachable()?;
        Ok(self.state.lock().tip())
    }

    pub fn block(&self, height: Height) -> Result<BlockInfo, ItestError> {
        self.ensure_reachable()?;
        self.state.lock().block(height).cloned()
    }

    pub fn is_finalized(&self, height: Height) -> Result<bool, ItestError> {
        self.ensure_reachable()?;
        Ok(self.state.lock().block(height)?.finalized)
    }

    pub fn latest_finalized(&self) -> Result<Option<BlockInfo>, ItestError> {
        self.ensure_reachable()?;
        let state = self.state.lock();
        state.last_finalized.map(|height| state.block(height).cloned()).transpose()
    }

    pub fn finality_providers(&self) -> Result<Vec<FinalityProviderRecord>, ItestError> {
        self.ensure_reachable()?;
        Ok(self.state.lock().providers.values().cloned().collect())
    }

    pub fn votes_at(&self, height: Height) -> Result<Vec<BtcPublicKey>, ItestError> {
        self.ensure_reachable()?;
        Ok(self.state.lock().votes.get(&height).map(|voters| voters.iter().copied().collect()).unwrap_or_default())
    }

    pub fn balance(&self, address: &AccountAddress) -> Result<u64, ItestError> {
        self.ensure_reachable()?;
        Ok(self.state.lock().balances.get(address).copied().unwrap_or(0))
    }

    pub fn transfer(&self, from: &AccountAddress, to: &AccountAddress, amount: u64) -> Result<(), ItestError> {
        self.ensure_reachable()?;
        let mut state = self.state.lock();
        let available = state.balances.get(from).copied().unwrap_or(0);
        if available < amount {
            return Err(ItestError::NodeRpcError(format!("insufficient funds: {from} has {available}, needs {amount}")));
        }
        state.balances.insert(from.clone(), available - amount);
        *state.balances.entry(to.clone()).or_default() += amount;
        debug!("devnet transfer from={} to={} amount={}", from, to, amount);
        Ok(())
    }

    /// Registers a provider; it may vote from the next produced block on.
    pub fn register(&self, request: RegisterFinalityProvider) -> Result<FinalityProviderRecord, ItestError> {
        self.ensure_reachable()?;
        if request.chain_id != self.chain_id {
            return Err(ItestError::NodeRpcError(format!("chain id mismatch: {} != {}", request.chain_id, self.chain_id)));
        }
        verify_schnorr(&request.btc_pk, &pop_digest(&request.chain_id, &request.address), &request.pop)
            .map_err(|err| ItestError::NodeRpcError(format!("invalid proof of possession: {err}")))?;

        let mut state = self.state.lock();
        if state.providers.contains_key(&request.btc_pk) {
            return Err(ItestError::NodeRpcError(format!("finality provider {} already registered", request.btc_pk)));
        }
        let balance = state.balances.get(&request.address).copied().unwrap_or(0);
        if balance < REGISTRATION_FEE {
            return Err(ItestError::NodeRpcError(format!("insufficient funds: {} has {balance}", request.address)));
        }
        state.balances.insert(request.address.clone(), balance - REGISTRATION_FEE);

        let record = FinalityProviderRecord {
            btc_pk: request.btc_pk,
            address: request.address,
            chain_id: request.chain_id,
            description: request.description,
            commission: request.commission,
            registered_at: state.tip() + 1,
        };
        state.providers.insert(record.btc_pk, record.clone());
        info!("devnet finality provider registered btc_pk={} registered_at={}", record.btc_pk, record.registered_at);
        Ok(record)
    }

    /// Accepts a vote from a registered provider for an existing block at or after its registration.
    /// Re-submitting the same vote is accepted.
    pub fn submit_vote(&self, vote: Vote) -> Result<(), ItestError> {
        self.ensure_reachable()?;
        let mut state = self.state.lock();
        let registered_at = state
            .providers
            .get(&vote.voter)
            .map(|fp| fp.registered_at)
            .ok_or_else(|| ItestError::NodeRpcError(format!("finality provider {} not registered", vote.voter)))?;
        if vote.height < registered_at {
            return Err(ItestError::NodeRpcError(format!(
                "vote at height {} precedes registration at {}",
                vote.height, registered_at
            )));
        }
        let block_hash = state.block(vote.height)?.hash;
        verify_vote(&vote, &vote_digest(&self.chain_id, vote.height, &block_hash))
            .map_err(|err| ItestError::NodeRpcError(format!("invalid finality signature: {err}")))?;

        state.votes.entry(vote.height).or_default().insert(vote.voter);
        state.advance_finalization();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{CommissionRate, Description};
    use secp256k1::{Keypair, Message, Secp256k1};

    fn chain() -> Arc<DevnetChain> {
        DevnetChain::new(DevnetChainConfig {
            genesis: GenesisParams { chain_id: ChainId::from("chain-test"), covenant_quorum: 2, covenant_pks: Vec::new() },
            block_time: Duration::from_secs(3600),
            startup_delay: Duration::ZERO,
        })
    }

    struct Provider {
        keypair: Keypair,
        address: AccountAddress,
    }

    impl Provider {
        fn new(chain: &DevnetChain) -> Self {
            let keypair = Keypair::new(&Secp256k1::new(), &mut rand::thread_rng());
            let address = account_address(&keypair.x_only_public_key().0.serialize());
            chain.transfer(&DevnetChain::genesis_funder_address(), &address, 1_000_000).expect("fund");
            Self { keypair, address }
        }

        fn pk(&self) -> BtcPublicKey {
            BtcPublicKey::from(self.keypair.x_only_public_key().0)
        }

        fn sign(&self, digest: [u8; 32]) -> Vec<u8> {
            let signature = Secp256k1::new().sign_schnorr_no_aux_rand(&Message::from_digest(digest), &self.keypair);
            let signature: &[u8; 64] = signature.as_ref();
            signature.to_vec()
        }

        fn register(&self, chain: &DevnetChain) -> Result<FinalityProviderRecord, ItestError> {
            chain.register(RegisterFinalityProvider {
                btc_pk: self.pk(),
                address: self.address.clone(),
                chain_id: chain.chain_id().clone(),
                description: Description::test_default(),
                commission: CommissionRate::ZERO,
                pop: self.sign(pop_digest(chain.chain_id(), &self.address)),
            })
        }

        fn vote(&self, chain: &DevnetChain, height: Height) -> Result<(), ItestError> {
            let hash = chain.block(height)?.hash;
            let signature = self.sign(vote_digest(chain.chain_id(), height, &hash));
            chain.submit_vote(Vote { height, voter: self.pk(), signature })
        }
    }

    #[test]
    fn test_parse_coin() {
        assert_eq!(parse_coin("1000000ubbn").expect("coin"), 1_000_000);
        assert!(parse_coin("1000000uatom").is_err());
        assert!(parse_coin("ubbn").is_err());
    }

    #[test]
    fn test_registration_requires_funds_and_valid_pop() {
        let chain = chain();
        let keypair = Keypair::new(&Secp256k1::new(), &mut rand::thread_rng());
        let unfunded = Provider { keypair, address: account_address(b"nobody") };
        let err = unfunded.register(&chain).unwrap_err();
        assert!(err.to_string().contains("insufficient funds"));

        let provider = Provider::new(&chain);
        let mut request = RegisterFinalityProvider {
            btc_pk: provider.pk(),
            address: provider.address.clone(),
            chain_id: chain.chain_id().clone(),
            description: Description::test_default(),
            commission: CommissionRate::ZERO,
            pop: vec![0u8; 64],
        };
        assert!(chain.register(request.clone()).is_err());
        request.pop = provider.sign(pop_digest(chain.chain_id(), &provider.address));
        let record = chain.register(request).expect("register");
        assert_eq!(record.registered_at, 1);
        assert!(provider.register(&chain).unwrap_err().to_string().contains("already registered"));
        assert_eq!(chain.finality_providers().expect("fps").len(), 1);
    }

    #[test]
    fn test_single_provider_finalizes_in_order() {
        let chain = chain();
        let provider = Provider::new(&chain);
        provider.register(&chain).expect("register");
        for _ in 0..3 {
            chain.produce_block();
        }

        provider.vote(&chain, 2).expect("vote 2");
        assert!(!chain.is_finalized(2).expect("query"), "height 1 is still open");
        assert_eq!(chain.latest_finalized().expect("query"), None);

        provider.vote(&chain, 1).expect("vote 1");
        assert!(chain.is_finalized(1).expect("query"));
        assert!(chain.is_finalized(2).expect("query"));
        assert!(!chain.is_finalized(3).expect("query"));
        assert_eq!(chain.latest_finalized().expect("query").map(|b| b.height), Some(2));
        assert_eq!(chain.votes_at(2).expect("votes"), vec![provider.pk()]);
    }

    #[test]
    fn test_blocks_before_any_provider_are_skipped() {
        let chain = chain();
        chain.produce_block();
        chain.produce_block();
        let provider = Provider::new(&chain);
        let record = provider.register(&chain).expect("register");
        assert_eq!(record.registered_at, 3);
        chain.produce_block();

        assert!(provider.vote(&chain, 2).is_err(), "vote before registration");
        provider.vote(&chain, 3).expect("vote");
        assert!(!chain.is_finalized(1).expect("query"));
        assert!(chain.is_finalized(3).expect("query"));
    }

    #[test]
    fn test_two_thirds_threshold() {
        let chain = chain();
        let providers: Vec<Provider> = (0..3).map(|_| Provider::new(&chain)).collect();
        for provider in &providers {
            provider.register(&chain).expect("register");
        }
        chain.produce_block();

        providers[0].vote(&chain, 1).expect("vote");
        providers[1].vote(&chain, 1).expect("vote");
        assert!(!chain.is_finalized(1).expect("query"), "2 of 3 is not more than 2/3");
        providers[1].vote(&chain, 1).expect("duplicate vote is accepted");
        assert_eq!(chain.votes_at(1).expect("votes").len(), 2);
        providers[2].vote(&chain, 1).expect("vote");
        assert!(chain.is_finalized(1).expect("query"));
    }

    #[test]
    fn test_vote_with_wrong_signature_rejected() {
        let chain = chain();
        let provider = Provider::new(&chain);
        provider.register(&chain).expect("register");
        chain.produce_block();
        chain.produce_block();
        let hash = chain.block(1).expect("block").hash;
        let vote = Vote { height: 2, voter: provider.pk(), signature: provider.sign(vote_digest(chain.chain_id(), 1, &hash)) };
        assert!(chain.submit_vote(vote).is_err());
    }

    #[tokio::test]
    async fn test_startup_delay_and_shutdown() {
        let chain = DevnetChain::new(DevnetChainConfig {
            genesis: GenesisParams { chain_id: ChainId::from("chain-test"), covenant_quorum: 2, covenant_pks: Vec::new() },
            block_time: Duration::from_millis(10),
            startup_delay: Duration::from_millis(100),
        });
        assert!(chain.light_client_tip().unwrap_err().to_string().contains("connection refused"));
        chain.spawn_producer();
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(chain.light_client_tip().expect("tip"), BTC_LIGHT_CLIENT_BASE_HEIGHT);
        assert!(chain.latest_height().expect("height") > 0);

        chain.shutdown().await;
        chain.shutdown().await;
        assert!(chain.latest_height().unwrap_err().to_string().contains("node stopped"));
    }
}
