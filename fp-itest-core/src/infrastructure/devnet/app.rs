use crate::domain::{pop_digest, vote_digest, FinalityProviderRecord, Vote};
use crate::foundation::{BtcPublicKey, ChainId, Height, ItestError};
use crate::infrastructure::rpc::{
    AppContext, AppFactory, ConsensusController, ConsumerController, CreateFinalityProvider, FinalityProviderApp,
    FinalityProviderInstance, FpAppConfig, RegisterFinalityProvider, SigningClient,
};
use crate::infrastructure::storage::{FpState, FpStateStore};
use async_trait::async_trait;
use log::{debug, info, warn};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Signs and submits votes for one provider.
struct Voter {
    btc_pk: BtcPublicKey,
    passphrase: String,
    chain_id: ChainId,
    registered_at: Height,
    consensus: Arc<dyn ConsensusController>,
    consumer: Arc<dyn ConsumerController>,
    signer: Arc<dyn SigningClient>,
    store: Arc<dyn FpStateStore>,
    last_voted: AtomicU64,
}

impl Voter {
    /// Votes every height not yet voted up to the current tip, oldest first.
    async fn vote_up_to_tip(&self) -> Result<usize, ItestError> {
        let tip = self.consumer.query_latest_block_height().await?;
        let next = (self.last_voted.load(Ordering::SeqCst) + 1).max(self.registered_at);
        let mut cast = 0;
        for height in next..=tip {
            let block = self.consumer.query_block(height).await?;
            let digest = vote_digest(&self.chain_id, height, &block.hash);
            let signature = self.signer.sign(&self.btc_pk, &digest, &self.passphrase).await?;
            self.consensus.submit_finality_signature(Vote { height, voter: self.btc_pk, signature }).await?;
            self.store.record_vote(height)?;
            self.last_voted.store(height, Ordering::SeqCst);
            cast += 1;
        }
        Ok(cast)
    }
}

async fn run_voting_loop(voter: Arc<Voter>, interval: Duration, mut stop_rx: watch::Receiver<bool>) {
    let mut ticker = tokio::time::interval(interval);
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                match voter.vote_up_to_tip().await {
                    Ok(0) => {}
                    Ok(cast) => debug!("votes submitted btc_pk={} count={} last_voted={}", voter.btc_pk.short(), cast, voter.last_voted.load(Ordering::SeqCst)),
                    Err(err) => debug!("voting round failed btc_pk={} error={}", voter.btc_pk.short(), err),
                }
            }
            changed = stop_rx.changed() => {
                if changed.is_err() || *stop_rx.borrow() {
                    break;
                }
            }
        }
    }
}

struct VotingLoop {
    stop_tx: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

/// Voting loop of one registered provider. `start`/`stop` are idempotent; a restarted instance
/// resumes from its persisted last voted height and catches up on missed blocks.
pub struct DevnetFpInstance {
    voter: Arc<Voter>,
    interval: Duration,
    running: tokio::sync::Mutex<Option<VotingLoop>>,
    is_running: AtomicBool,
}

#[async_trait]
impl FinalityProviderInstance for DevnetFpInstance {
    fn btc_pk(&self) -> BtcPublicKey {
        self.voter.btc_pk
    }

    fn last_voted_height(&self) -> Height {
        self.voter.last_voted.load(Ordering::SeqCst)
    }

    fn is_running(&self) -> bool {
        self.is_running.load(Ordering::SeqCst)
    }

    async fn start(&self) -> Result<(), ItestError> {
        let mut running = self.running.lock().await;
        if running.is_some() {
            return Ok(());
        }
        if let Some(state) = self.voter.store.load()? {
            self.voter.last_voted.fetch_max(state.last_voted_height, Ordering::SeqCst);
        }
        let (stop_tx, stop_rx) = watch::channel(false);
        let handle = tokio::spawn(run_voting_loop(Arc::clone(&self.voter), self.interval, stop_rx));
        *running = Some(VotingLoop { stop_tx, handle });
        self.is_running.store(true, Ordering::SeqCst);
        info!("finality provider instance started btc_pk={} last_voted={}", self.voter.btc_pk, self.last_voted_height());
        Ok(())
    }

    async fn stop(&self) -> Result<(), ItestError> {
        let Some(voting) = self.running.lock().await.take() else {
            return Ok(());
        };
        self.is_running.store(false, Ordering::SeqCst);
        let _ = voting.stop_tx.send(true);
        voting
            .handle
            .await
            .map_err(|err| ItestError::Message(format!("voting loop of {} panicked: {err}", self.voter.btc_pk)))?;
        info!("finality provider instance stopped btc_pk={} last_voted={}", self.voter.btc_pk, self.last_voted_height());
        Ok(())
    }
}

pub struct DevnetFpApp {
    config: FpAppConfig,
    consensus: Arc<dyn ConsensusController>,
    consumer: Arc<dyn ConsumerController>,
    signer: Arc<dyn SigningClient>,
    store: Arc<dyn FpStateStore>,
    started: AtomicBool,
    instance: parking_lot::Mutex<Option<Arc<DevnetFpInstance>>>,
}

impl DevnetFpApp {
    pub fn new(context: AppContext) -> Self {
        Self {
            config: context.config,
            consensus: context.consensus,
            consumer: context.consumer,
            signer: context.signer,
            store: context.store,
            started: AtomicBool::new(false),
            instance: parking_lot::Mutex::new(None),
        }
    }

    fn ensure_started(&self) -> Result<(), ItestError> {
        if self.started.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(ItestError::Message(format!("finality provider app {} not started", self.config.key_name)))
        }
    }
}

#[async_trait]
impl FinalityProviderApp for DevnetFpApp {
    async fn start(&self) -> Result<(), ItestError> {
        if !self.started.swap(true, Ordering::SeqCst) {
            info!("finality provider app started key={} home={}", self.config.key_name, self.config.home_dir.display());
        }
        Ok(())
    }

    async fn stop(&self) -> Result<(), ItestError> {
        let instance = self.instance.lock().clone();
        if let Some(instance) = instance {
            instance.stop().await?;
        }
        if self.started.swap(false, Ordering::SeqCst) {
            info!("finality provider app stopped key={}", self.config.key_name);
        }
        Ok(())
    }

    async fn create_finality_provider(&self, request: CreateFinalityProvider) -> Result<FinalityProviderRecord, ItestError> {
        self.ensure_started()?;
        if request.key_name != self.config.key_name {
            return Err(ItestError::InvalidKey(format!("app is bound to key {}, not {}", self.config.key_name, request.key_name)));
        }
        let pop = self.signer.sign(&request.btc_pk, &pop_digest(&request.chain_id, &self.config.account), &request.passphrase).await?;
        let record = self
            .consensus
            .register_finality_provider(RegisterFinalityProvider {
                btc_pk: request.btc_pk,
                address: self.config.account.clone(),
                chain_id: request.chain_id,
                description: request.description,
                commission: request.commission,
                pop,
            })
            .await?;
        self.store.save(&FpState { btc_pk: record.btc_pk, registered_at: record.registered_at, last_voted_height: 0 })?;
        Ok(record)
    }

    async fn start_finality_provider(&self, btc_pk: &BtcPublicKey, passphrase: &str) -> Result<(), ItestError> {
        self.ensure_started()?;
        let existing = self.instance.lock().clone();
        if let Some(instance) = existing {
            if instance.btc_pk() != *btc_pk {
                return Err(ItestError::Message(format!("app already runs provider {}", instance.btc_pk())));
            }
            return instance.start().await;
        }

        let state = self.store.load()?.ok_or_else(|| ItestError::KeyNotFound(format!("no registered provider {btc_pk}")))?;
        if state.btc_pk != *btc_pk {
            return Err(ItestError::KeyNotFound(format!("provider {btc_pk} is not managed by this app")));
        }
        // Fail early on a wrong passphrase instead of inside the loop.
        self.signer.key_record(btc_pk, passphrase).await?;

        let instance = Arc::new(DevnetFpInstance {
            voter: Arc::new(Voter {
                btc_pk: *btc_pk,
                passphrase: passphrase.to_string(),
                chain_id: self.config.chain_id.clone(),
                registered_at: state.registered_at,
                consensus: Arc::clone(&self.consensus),
                consumer: Arc::clone(&self.consumer),
                signer: Arc::clone(&self.signer),
                store: Arc::clone(&self.store),
                last_voted: AtomicU64::new(state.last_voted_height),
            }),
            interval: self.config.vote_interval,
            running: tokio::sync::Mutex::new(None),
            is_running: AtomicBool::new(false),
        });
        instance.start().await?;
        *self.instance.lock() = Some(instance);
        Ok(())
    }

    fn instance(&self) -> Result<Arc<dyn FinalityProviderInstance>, ItestError> {
        match self.instance.lock().as_ref() {
            Some(instance) => Ok(Arc::clone(instance) as Arc<dyn FinalityProviderInstance>),
            None => {
                warn!("finality provider instance requested before start key={}", self.config.key_name);
                Err(ItestError::Message(format!("no running finality provider for key {}", self.config.key_name)))
            }
        }
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct DevnetAppFactory;

#[async_trait]
impl AppFactory for DevnetAppFactory {
    async fn build(&self, context: AppContext) -> Result<Arc<dyn FinalityProviderApp>, ItestError> {
        std::fs::create_dir_all(&context.config.home_dir)?;
        Ok(Arc::new(DevnetFpApp::new(context)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{CommissionRate, Description};
    use crate::foundation::{KeyName, PASSPHRASE};
    use crate::infrastructure::devnet::{account_address, DevnetChain, DevnetChainConfig, DevnetConsensusClient, DevnetConsumerClient, DevnetKeyring};
    use crate::infrastructure::poll::{await_condition, PollPolicy};
    use crate::infrastructure::rpc::GenesisParams;
    use crate::infrastructure::storage::JsonFileStore;
    use crate::domain::ChainAccount;

    struct Fixture {
        chain: Arc<DevnetChain>,
        app: DevnetFpApp,
        btc_pk: BtcPublicKey,
        key_name: KeyName,
        _home: tempfile::TempDir,
    }

    async fn fixture() -> Fixture {
        let chain = DevnetChain::new(DevnetChainConfig {
            genesis: GenesisParams { chain_id: ChainId::from("chain-test"), covenant_quorum: 2, covenant_pks: Vec::new() },
            block_time: Duration::from_millis(20),
            startup_delay: Duration::ZERO,
        });
        chain.spawn_producer();
        let keyring = Arc::new(DevnetKeyring::new());
        let btc_pk = keyring.create_key(&KeyName::from("eots-key-test"), PASSPHRASE, "").expect("key");

        let key_name = KeyName::from("fp-key-test");
        let account = ChainAccount { key_name: key_name.clone(), address: account_address(b"fp-key-test") };
        chain.transfer(&DevnetChain::genesis_funder_address(), &account.address, 1_000_000).expect("fund");

        let home = tempfile::tempdir().expect("tempdir");
        let consensus = Arc::new(DevnetConsensusClient::new(Arc::clone(&chain), Some(account.clone())));
        consensus.start().await.expect("start controller");
        let app = DevnetFpApp::new(AppContext {
            config: FpAppConfig {
                key_name: key_name.clone(),
                chain_id: ChainId::from("chain-test"),
                home_dir: home.path().to_path_buf(),
                account: account.address.clone(),
                vote_interval: Duration::from_millis(10),
            },
            consensus,
            consumer: Arc::new(DevnetConsumerClient::new(Arc::clone(&chain))),
            signer: keyring,
            store: Arc::new(JsonFileStore::in_home(home.path())),
        });
        Fixture { chain, app, btc_pk, key_name, _home: home }
    }

    fn create_request(fx: &Fixture) -> CreateFinalityProvider {
        CreateFinalityProvider {
            key_name: fx.key_name.clone(),
            chain_id: ChainId::from("chain-test"),
            passphrase: PASSPHRASE.to_string(),
            btc_pk: fx.btc_pk,
            description: Description::test_default(),
            commission: CommissionRate::ZERO,
        }
    }

    fn fast() -> PollPolicy {
        PollPolicy::new(Duration::from_secs(10), Duration::from_millis(10))
    }

    #[tokio::test]
    async fn test_app_requires_start() {
        let fx = fixture().await;
        assert!(fx.app.create_finality_provider(create_request(&fx)).await.is_err());
        assert!(fx.app.instance().is_err());
        fx.chain.shutdown().await;
    }

    #[tokio::test]
    async fn test_registered_provider_votes_and_finalizes() {
        let fx = fixture().await;
        fx.app.start().await.expect("start");
        let record = fx.app.create_finality_provider(create_request(&fx)).await.expect("create");
        assert_eq!(record.description.moniker, "test-moniker");
        fx.app.start_finality_provider(&fx.btc_pk, PASSPHRASE).await.expect("start fp");

        let instance = fx.app.instance().expect("instance");
        assert!(instance.is_running());
        await_condition("first vote", fast(), || {
            let instance = Arc::clone(&instance);
            async move { Ok(instance.last_voted_height() > 0) }
        })
        .await
        .expect("votes");
        let chain = Arc::clone(&fx.chain);
        await_condition("finalized", fast(), || {
            let chain = Arc::clone(&chain);
            async move { Ok(chain.latest_finalized()?.is_some()) }
        })
        .await
        .expect("finalizes");

        fx.app.stop().await.expect("stop");
        fx.app.stop().await.expect("stop twice");
        assert!(!instance.is_running());
        fx.chain.shutdown().await;
    }

    #[tokio::test]
    async fn test_restarted_instance_catches_up() {
        let fx = fixture().await;
        fx.app.start().await.expect("start");
        fx.app.create_finality_provider(create_request(&fx)).await.expect("create");
        fx.app.start_finality_provider(&fx.btc_pk, PASSPHRASE).await.expect("start fp");
        let instance = fx.app.instance().expect("instance");

        instance.stop().await.expect("stop");
        let stopped_at = instance.last_voted_height();
        let chain = Arc::clone(&fx.chain);
        await_condition("tip advanced", fast(), || {
            let chain = Arc::clone(&chain);
            async move { Ok(chain.latest_height()? >= stopped_at + 3) }
        })
        .await
        .expect("tip");
        assert_eq!(instance.last_voted_height(), stopped_at);

        instance.start().await.expect("restart");
        let target = stopped_at + 3;
        await_condition("caught up", fast(), || {
            let instance = Arc::clone(&instance);
            async move { Ok(instance.last_voted_height() >= target) }
        })
        .await
        .expect("caught up");
        assert!(fx.chain.is_finalized(target).expect("finalized"));

        fx.app.stop().await.expect("stop");
        fx.chain.shutdown().await;
    }

    #[tokio::test]
    async fn test_wrong_passphrase_fails_fast() {
        let fx = fixture().await;
        fx.app.start().await.expect("start");
        fx.app.create_finality_provider(create_request(&fx)).await.expect("create");
        let err = fx.app.start_finality_provider(&fx.btc_pk, "wrong").await.unwrap_err();
        assert!(matches!(err, ItestError::InvalidPassphrase(_)));
        fx.chain.shutdown().await;
    }
}
