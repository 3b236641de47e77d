//! Orchestration facade: one integration environment (consensus node, signing service and any
//! number of finality providers) driven through a handful of async calls.

use crate::api::run_instance_server;
use crate::backend::Collaborators;
use fp_itest_core::application::{wait_for_finalized_span, InstanceRegistry, InstanceResources, RegisteredInstance};
use fp_itest_core::domain::{BlockInfo, CommissionRate, CovenantCommittee, Description, FinalityProviderRecord, KeyRecord, NodeEndpoints};
use fp_itest_core::foundation::{
    BtcPublicKey, Height, ItestError, EOTS_HOME_DIR, EOTS_KEY_PREFIX, FP_HOME_PREFIX, FP_KEY_PREFIX, FUNDING_AMOUNT, FUNDING_DENOM,
    GENESIS_FUNDER, HD_PATH, NODE_DIR_PREFIX, PASSPHRASE, TEST_DIR_PREFIX, TEST_MONIKER,
};
use fp_itest_core::infrastructure::allocator::{DirAllocator, KeyNameAllocator, PortAllocator};
use fp_itest_core::infrastructure::config::{resolve_data_dir, ItestConfig};
use fp_itest_core::infrastructure::lifecycle::{FnProbe, ManagedService, ServiceHandle, TcpProbe};
use fp_itest_core::infrastructure::poll::{await_condition, construct_with_retry, poll_until};
use fp_itest_core::infrastructure::rpc::{
    AppContext, ConsensusController, ConsumerController, CreateFinalityProvider, FinalityProviderApp, FpAppConfig, GenesisParams,
    SigningClient,
};
use fp_itest_core::infrastructure::storage::JsonFileStore;
use log::{debug, info, warn};
use std::net::{Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

const NODE_SERVICE: &str = "babylon-node";
const SIGNER_SERVICE: &str = "eots-manager";

fn loopback(port: u16) -> SocketAddr {
    SocketAddr::from((Ipv4Addr::LOCALHOST, port))
}

/// Everything started during bootstrap that has to be undone if a later step fails.
struct BootstrapGuard {
    collaborators: Collaborators,
    base_dir: PathBuf,
    node_handle: Option<Box<dyn ServiceHandle>>,
    node_service: Option<ManagedService>,
    signer_service: Option<ManagedService>,
}

impl BootstrapGuard {
    async fn abort(mut self, cause: &ItestError) {
        warn!("bootstrap failed, releasing partial environment base_dir={} error={}", self.base_dir.display(), cause);
        if let Some(service) = self.signer_service.take() {
            if let Err(err) = service.stop().await {
                warn!("signing service cleanup failed error={}", err);
            }
        }
        if let Some(mut handle) = self.node_handle.take() {
            if let Err(err) = handle.stop().await {
                warn!("node cleanup failed error={}", err);
            }
        }
        if let Some(service) = self.node_service.take() {
            if let Err(err) = service.stop().await {
                warn!("node cleanup failed error={}", err);
            }
        }
        if let Err(err) = self.collaborators.containers.clear_resources().await {
            warn!("container cleanup failed error={}", err);
        }
        if let Err(err) = std::fs::remove_dir_all(&self.base_dir) {
            warn!("test directory cleanup failed path={} error={}", self.base_dir.display(), err);
        }
    }
}

/// Parts of an instance under construction, stopped best-effort if a later step fails.
#[derive(Default)]
struct PendingInstance {
    app: Option<Arc<dyn FinalityProviderApp>>,
    servers: Option<Box<dyn ServiceHandle>>,
}

impl PendingInstance {
    async fn abort(mut self, cause: &ItestError) {
        warn!("finality provider setup failed, stopping partial instance error={}", cause);
        if let Some(mut servers) = self.servers.take() {
            if let Err(err) = servers.stop().await {
                warn!("instance server cleanup failed error={}", err);
            }
        }
        if let Some(app) = self.app.take() {
            if let Err(err) = app.stop().await {
                warn!("finality provider app cleanup failed error={}", err);
            }
        }
    }
}

/// A running integration environment.
///
/// Created by [`TestManager::start`]; torn down by [`TestManager::stop`], which must be called
/// explicitly. Instances added with [`TestManager::add_finality_provider`] are owned by the manager.
pub struct TestManager {
    config: ItestConfig,
    collaborators: Collaborators,
    ports: Arc<PortAllocator>,
    dirs: DirAllocator,
    key_names: KeyNameAllocator,
    base_dir: PathBuf,
    committee: CovenantCommittee,
    node_endpoints: NodeEndpoints,
    node_service: ManagedService,
    signer_service: ManagedService,
    signer_addr: SocketAddr,
    shared_rpc_port: u16,
    consensus: Arc<dyn ConsensusController>,
    consumer: Arc<dyn ConsumerController>,
    signer: Arc<dyn SigningClient>,
    registry: InstanceRegistry,
    stopped: AtomicBool,
}

impl TestManager {
    /// Bootstraps an environment: covenant committee, consensus node, node clients and signing
    /// service. Any failure releases whatever was already started.
    pub async fn start(config: ItestConfig, collaborators: Collaborators) -> Result<Self, ItestError> {
        config.validate().map_err(|errors| ItestError::ConfigError(format!("validation failed: {}", errors.join("; "))))?;

        let committee = CovenantCommittee::generate(config.environment.num_covenants, config.environment.covenant_quorum)?;
        let data_dir = resolve_data_dir(&config);
        std::fs::create_dir_all(&data_dir)?;
        let base_dir = DirAllocator::new(&data_dir).allocate(TEST_DIR_PREFIX)?;
        info!(
            "bootstrapping test environment base_dir={} chain_id={} covenant_quorum={} covenants={}",
            base_dir.display(),
            config.environment.chain_id,
            committee.quorum,
            committee.len()
        );

        let mut guard = BootstrapGuard {
            collaborators: collaborators.clone(),
            base_dir: base_dir.clone(),
            node_handle: None,
            node_service: None,
            signer_service: None,
        };
        let manager = match Self::bootstrap(config, collaborators, committee, base_dir, &mut guard).await {
            Ok(manager) => manager,
            Err(err) => {
                guard.abort(&err).await;
                return Err(err);
            }
        };

        if let Err(err) = manager.wait_for_services_start().await {
            if let Err(stop_err) = manager.stop().await {
                warn!("environment teardown after failed start failed error={}", stop_err);
            }
            return Err(err);
        }
        info!(
            "test environment ready node={} signer={} shared_rpc_port={}",
            manager.node_endpoints.rpc_addr, manager.signer_addr, manager.shared_rpc_port
        );
        Ok(manager)
    }

    async fn bootstrap(
        config: ItestConfig,
        collaborators: Collaborators,
        committee: CovenantCommittee,
        base_dir: PathBuf,
        guard: &mut BootstrapGuard,
    ) -> Result<Self, ItestError> {
        let dirs = DirAllocator::new(&base_dir);
        let ports = PortAllocator::for_range(config.environment.port_range());
        let construction = config.timing.construction_policy();

        // Consensus node.
        let node_dir = dirs.allocate(NODE_DIR_PREFIX)?;
        let genesis = GenesisParams {
            chain_id: config.environment.chain_id(),
            covenant_quorum: committee.quorum,
            covenant_pks: committee.public_keys(),
        };
        let container = collaborators.containers.run_node(&node_dir, &genesis).await?;
        let node_endpoints = container.endpoints.clone();
        guard.node_handle = Some(container.handle);

        let consensus = construct_with_retry("consensus controller", construction, || {
            collaborators.clients.consensus_controller(&node_endpoints, None)
        })
        .await?;
        consensus.start().await?;
        let consumer =
            construct_with_retry("consumer controller", construction, || collaborators.clients.consumer_controller(&node_endpoints)).await?;

        let probe_client = Arc::clone(&consensus);
        let node_service = ManagedService::new(
            NODE_SERVICE,
            Arc::new(FnProbe::new("query light client tip", move || {
                let consensus = Arc::clone(&probe_client);
                async move { consensus.query_light_client_tip().await.map(|_| ()) }
            })),
        );
        if let Some(handle) = guard.node_handle.take() {
            node_service.attach(handle).await?;
        }
        guard.node_service = Some(node_service);

        // Signing service.
        let signer_home = dirs.allocate(&format!("{EOTS_HOME_DIR}-"))?;
        let signer_addr = loopback(ports.allocate()?);
        let signer_metrics_addr = loopback(ports.allocate()?);
        let launcher = collaborators.signer.launcher(&signer_home, signer_addr, signer_metrics_addr)?;
        let signer_service = ManagedService::new(SIGNER_SERVICE, Arc::new(TcpProbe::new(signer_addr)));
        let launched = signer_service.start(launcher.as_ref()).await;
        guard.signer_service = Some(signer_service);
        launched?;
        if let Some(service) = guard.signer_service.as_ref() {
            service.wait_ready(config.timing.service_ready_policy()).await?;
        }
        let signer = construct_with_retry("signing client", construction, || collaborators.clients.signing_client(signer_addr)).await?;
        let shared_rpc_port = ports.allocate()?;

        let (Some(node_service), Some(signer_service)) = (guard.node_service.take(), guard.signer_service.take()) else {
            return Err(ItestError::Message("bootstrap lost track of its services".to_string()));
        };
        Ok(Self {
            config,
            collaborators,
            ports,
            dirs,
            key_names: KeyNameAllocator::new(),
            base_dir,
            committee,
            node_endpoints,
            node_service,
            signer_service,
            signer_addr,
            shared_rpc_port,
            consensus,
            consumer,
            signer,
            registry: InstanceRegistry::new(),
            stopped: AtomicBool::new(false),
        })
    }

    /// Bootstraps an environment and adds `count` finality providers, waiting until the node
    /// reports all of them.
    pub async fn start_manager_with_finality_providers(
        config: ItestConfig,
        collaborators: Collaborators,
        count: usize,
    ) -> Result<(Self, Vec<Arc<RegisteredInstance>>), ItestError> {
        let manager = Self::start(config, collaborators).await?;
        let mut instances = Vec::with_capacity(count);
        for _ in 0..count {
            match manager.add_finality_provider().await {
                Ok(instance) => instances.push(instance),
                Err(err) => {
                    if let Err(stop_err) = manager.stop().await {
                        warn!("environment teardown after failed setup failed error={}", stop_err);
                    }
                    return Err(err);
                }
            }
        }
        if let Err(err) = manager.wait_for_finality_providers(count).await {
            if let Err(stop_err) = manager.stop().await {
                warn!("environment teardown after failed setup failed error={}", stop_err);
            }
            return Err(err);
        }
        Ok((manager, instances))
    }

    pub fn config(&self) -> &ItestConfig {
        &self.config
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    pub fn committee(&self) -> &CovenantCommittee {
        &self.committee
    }

    pub fn node_endpoints(&self) -> &NodeEndpoints {
        &self.node_endpoints
    }

    pub fn node_service(&self) -> &ManagedService {
        &self.node_service
    }

    pub fn signer_service(&self) -> &ManagedService {
        &self.signer_service
    }

    pub fn signer_addr(&self) -> SocketAddr {
        self.signer_addr
    }

    /// RPC port reserved for the shared finality-provider configuration.
    pub fn shared_rpc_port(&self) -> u16 {
        self.shared_rpc_port
    }

    pub fn consensus(&self) -> Arc<dyn ConsensusController> {
        Arc::clone(&self.consensus)
    }

    pub fn consumer(&self) -> Arc<dyn ConsumerController> {
        Arc::clone(&self.consumer)
    }

    pub fn signer(&self) -> Arc<dyn SigningClient> {
        Arc::clone(&self.signer)
    }

    pub fn instances(&self) -> Vec<Arc<RegisteredInstance>> {
        self.registry.all()
    }

    pub fn instance(&self, btc_pk: &BtcPublicKey) -> Option<Arc<RegisteredInstance>> {
        self.registry.get(btc_pk)
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    fn ensure_active(&self) -> Result<(), ItestError> {
        if self.is_stopped() {
            return Err(ItestError::Message("test environment already stopped".to_string()));
        }
        Ok(())
    }

    /// Waits until the node answers light-client queries; the node service becomes `Running`.
    pub async fn wait_for_services_start(&self) -> Result<(), ItestError> {
        self.node_service.wait_ready(self.config.timing.convergence_policy()).await
    }

    /// Creates, funds, registers and starts one more finality provider.
    pub async fn add_finality_provider(&self) -> Result<Arc<RegisteredInstance>, ItestError> {
        self.ensure_active()?;
        let mut pending = PendingInstance::default();
        let instance = match self.build_instance(&mut pending).await {
            Ok(instance) => instance,
            Err(err) => {
                pending.abort(&err).await;
                return Err(err);
            }
        };
        // A concurrent `stop` may have torn the registry down while this instance was being built.
        match self.registry.register(instance) {
            Ok(instance) => Ok(instance),
            Err(rejected) => {
                if let Err(err) = rejected.stop().await {
                    warn!("late finality provider cleanup failed btc_pk={} error={}", rejected.btc_pk(), err);
                }
                Err(ItestError::Message("test environment stopped while adding a finality provider".to_string()))
            }
        }
    }

    async fn build_instance(&self, pending: &mut PendingInstance) -> Result<RegisteredInstance, ItestError> {
        let chain_id = self.config.environment.chain_id();
        let construction = self.config.timing.construction_policy();

        let eots_key = self.key_names.allocate(EOTS_KEY_PREFIX);
        let btc_pk = self.signer.create_key(&eots_key, PASSPHRASE, HD_PATH).await?;
        debug!("signing key created key={} btc_pk={}", eots_key, btc_pk);

        let fp_key = self.key_names.allocate(FP_KEY_PREFIX);
        let home_dir = self.dirs.allocate(FP_HOME_PREFIX)?;
        let account = self.collaborators.chain_keyring.create_chain_key(&home_dir, &fp_key, PASSPHRASE, HD_PATH)?;
        self.collaborators
            .containers
            .bank_send(&account.address, &format!("{FUNDING_AMOUNT}{FUNDING_DENOM}"), GENESIS_FUNDER)
            .await?;
        debug!("finality provider account funded key={} address={}", fp_key, account.address);

        let clients = &self.collaborators.clients;
        let consensus = construct_with_retry("finality provider consensus controller", construction, || {
            clients.consensus_controller(&self.node_endpoints, Some(&account))
        })
        .await?;
        consensus.start().await?;
        let consumer = construct_with_retry("finality provider consumer controller", construction, || {
            clients.consumer_controller(&self.node_endpoints)
        })
        .await?;

        let app = self
            .collaborators
            .apps
            .build(AppContext {
                config: FpAppConfig {
                    key_name: eots_key.clone(),
                    chain_id: chain_id.clone(),
                    home_dir: home_dir.clone(),
                    account: account.address.clone(),
                    vote_interval: self.config.devnet.vote_interval(),
                },
                consensus: Arc::clone(&consensus),
                consumer: Arc::clone(&consumer),
                signer: Arc::clone(&self.signer),
                store: Arc::new(JsonFileStore::in_home(&home_dir)),
            })
            .await?;
        pending.app = Some(Arc::clone(&app));

        app.start().await?;
        let record = app
            .create_finality_provider(CreateFinalityProvider {
                key_name: eots_key.clone(),
                chain_id,
                passphrase: PASSPHRASE.to_string(),
                btc_pk,
                description: Description::new(TEST_MONIKER),
                commission: CommissionRate::ZERO,
            })
            .await?;
        info!("finality provider registered btc_pk={} registered_at={}", record.btc_pk, record.registered_at);

        let rpc_port = self.ports.allocate()?;
        let metrics_port = self.ports.allocate()?;
        app.start_finality_provider(&btc_pk, PASSPHRASE).await?;
        let instance = app.instance()?;
        let servers = run_instance_server(Arc::clone(&instance), loopback(rpc_port), loopback(metrics_port)).await?;
        pending.servers = Some(Box::new(servers));

        let resources = InstanceResources { eots_key, account, home_dir, rpc_port, metrics_port };
        let servers = pending.servers.take().into_iter().collect();
        pending.app = None;
        Ok(RegisteredInstance::new(resources, app, instance, consensus, consumer, servers))
    }

    /// Waits until the node reports exactly `count` finality providers.
    pub async fn wait_for_finality_providers(&self, count: usize) -> Result<Vec<FinalityProviderRecord>, ItestError> {
        let consensus = &self.consensus;
        poll_until(&format!("{count} finality providers registered"), self.config.timing.convergence_policy(), || async move {
            let providers = consensus.query_finality_providers().await?;
            Ok((providers.len() == count).then_some(providers))
        })
        .await
    }

    /// Waits until exactly `votes` votes are recorded at `height` and the block is finalized.
    pub async fn check_block_finalization(&self, height: Height, votes: usize) -> Result<(), ItestError> {
        let policy = self.config.timing.convergence_policy();
        let consensus = &self.consensus;
        await_condition(&format!("{votes} votes at height {height}"), policy, || async move {
            Ok(consensus.query_votes_at_height(height).await?.len() == votes)
        })
        .await?;
        let consumer = &self.consumer;
        await_condition(&format!("block {height} finalized"), policy, || async move { consumer.query_is_block_finalized(height).await })
            .await
    }

    /// Waits for the first vote of `instance` and returns the height it voted on.
    pub async fn wait_for_fp_vote_cast(&self, instance: &RegisteredInstance) -> Result<Height, ItestError> {
        let fp = &instance.instance;
        poll_until(&format!("first vote of {}", fp.btc_pk()), self.config.timing.convergence_policy(), || async move {
            let height = fp.last_voted_height();
            Ok((height > 0).then_some(height))
        })
        .await
    }

    /// Stops `instance`, lets the chain advance `blocks` blocks without it, then restarts it.
    pub async fn stop_and_restart_fp_after_n_blocks(&self, blocks: u64, instance: &RegisteredInstance) -> Result<(), ItestError> {
        let baseline = self.consumer.query_latest_block_height().await?;
        instance.instance.stop().await?;
        info!("finality provider stopped for restart btc_pk={} baseline={} blocks={}", instance.btc_pk(), baseline, blocks);

        let consumer = &self.consumer;
        let target = baseline.saturating_add(blocks);
        await_condition(&format!("chain reaches height {target}"), self.config.timing.convergence_policy(), || async move {
            Ok(consumer.query_latest_block_height().await? >= target)
        })
        .await?;

        instance.instance.start().await?;
        info!("finality provider restarted btc_pk={} last_voted={}", instance.btc_pk(), instance.instance.last_voted_height());
        Ok(())
    }

    /// Waits until at least `count` consecutive blocks are finalized, counted from the first
    /// finalized block observed. `0` is treated as `1`.
    pub async fn wait_for_n_finalized_blocks(&self, count: u64) -> Result<BlockInfo, ItestError> {
        let (_, latest) = wait_for_finalized_span(self.consumer.as_ref(), count, self.config.timing.convergence_policy()).await?;
        Ok(latest)
    }

    /// Key record of a finality provider's signing key.
    pub async fn get_fp_priv_key(&self, btc_pk: &BtcPublicKey) -> Result<KeyRecord, ItestError> {
        self.signer.key_record(btc_pk, PASSPHRASE).await
    }

    /// Tears the environment down: instances, signing service, node, container resources and the
    /// test directory. Every step runs; failures come back as one `TeardownFailed`. A second call
    /// is a no-op.
    pub async fn stop(&self) -> Result<(), ItestError> {
        if self.stopped.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        info!("tearing down test environment base_dir={} instances={}", self.base_dir.display(), self.registry.len());
        let mut failures = Vec::new();
        if let Err(err) = self.registry.stop_all().await {
            failures.push(err);
        }
        if let Err(err) = self.signer_service.stop().await {
            failures.push(err);
        }
        if let Err(err) = self.node_service.stop().await {
            failures.push(err);
        }
        if let Err(err) = self.collaborators.containers.clear_resources().await {
            failures.push(err);
        }
        if let Err(err) = std::fs::remove_dir_all(&self.base_dir) {
            failures.push(ItestError::StorageError { operation: format!("remove {}", self.base_dir.display()), details: err.to_string() });
        }
        let result = ItestError::aggregate(failures);
        match &result {
            Ok(()) => info!("test environment stopped"),
            Err(err) => warn!("test environment teardown incomplete error={}", err),
        }
        result
    }
}
