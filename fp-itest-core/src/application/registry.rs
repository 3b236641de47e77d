use crate::domain::ChainAccount;
use crate::foundation::{BtcPublicKey, ItestError, KeyName};
use crate::infrastructure::lifecycle::ServiceHandle;
use crate::infrastructure::rpc::{ConsensusController, ConsumerController, FinalityProviderApp, FinalityProviderInstance};
use log::{info, warn};
use parking_lot::Mutex;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Ports, directories and keys owned exclusively by one instance.
#[derive(Clone, Debug)]
pub struct InstanceResources {
    pub eots_key: KeyName,
    pub account: ChainAccount,
    pub home_dir: PathBuf,
    pub rpc_port: u16,
    pub metrics_port: u16,
}

/// A live finality provider created during a run, together with everything needed to stop it.
pub struct RegisteredInstance {
    pub resources: InstanceResources,
    pub app: Arc<dyn FinalityProviderApp>,
    pub instance: Arc<dyn FinalityProviderInstance>,
    pub consensus: Arc<dyn ConsensusController>,
    pub consumer: Arc<dyn ConsumerController>,
    servers: tokio::sync::Mutex<Vec<Box<dyn ServiceHandle>>>,
    stopped: AtomicBool,
}

impl RegisteredInstance {
    pub fn new(
        resources: InstanceResources,
        app: Arc<dyn FinalityProviderApp>,
        instance: Arc<dyn FinalityProviderInstance>,
        consensus: Arc<dyn ConsensusController>,
        consumer: Arc<dyn ConsumerController>,
        servers: Vec<Box<dyn ServiceHandle>>,
    ) -> Self {
        Self { resources, app, instance, consensus, consumer, servers: tokio::sync::Mutex::new(servers), stopped: AtomicBool::new(false) }
    }

    pub fn btc_pk(&self) -> BtcPublicKey {
        self.instance.btc_pk()
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    /// Stops the app (and its voting loop) and every auxiliary server. All steps run; failures are aggregated.
    /// Once it has been called, further calls return `Ok(())`.
    pub async fn stop(&self) -> Result<(), ItestError> {
        if self.stopped.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        let mut failures = Vec::new();
        if let Err(err) = self.app.stop().await {
            failures.push(err);
        }
        let servers: Vec<Box<dyn ServiceHandle>> = std::mem::take(&mut *self.servers.lock().await);
        for mut server in servers {
            if let Err(err) = server.stop().await {
                failures.push(err);
            }
        }
        ItestError::aggregate(failures)
    }
}

#[derive(Default)]
struct RegistryState {
    instances: Vec<Arc<RegisteredInstance>>,
    closed: bool,
}

/// Thread-safe set of live instances, in registration order. Closed for good by `stop_all`.
#[derive(Default)]
pub struct InstanceRegistry {
    state: Mutex<RegistryState>,
}

impl InstanceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `instance`, or hands it back untouched if the registry has already been torn down.
    pub fn register(&self, instance: RegisteredInstance) -> Result<Arc<RegisteredInstance>, RegisteredInstance> {
        let mut state = self.state.lock();
        if state.closed {
            warn!("instance registration rejected after teardown btc_pk={}", instance.btc_pk());
            return Err(instance);
        }
        let instance = Arc::new(instance);
        state.instances.push(Arc::clone(&instance));
        info!("instance registered btc_pk={} total={}", instance.btc_pk(), state.instances.len());
        Ok(instance)
    }

    pub fn all(&self) -> Vec<Arc<RegisteredInstance>> {
        self.state.lock().instances.clone()
    }

    pub fn get(&self, btc_pk: &BtcPublicKey) -> Option<Arc<RegisteredInstance>> {
        self.state.lock().instances.iter().find(|instance| instance.btc_pk() == *btc_pk).cloned()
    }

    pub fn len(&self) -> usize {
        self.state.lock().instances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Closes the registry, then attempts every instance even if some fail; failures come back as
    /// one `TeardownFailed`.
    pub async fn stop_all(&self) -> Result<(), ItestError> {
        let instances = {
            let mut state = self.state.lock();
            state.closed = true;
            state.instances.clone()
        };
        let mut failures = Vec::new();
        for instance in instances.into_iter().filter(|instance| !instance.is_stopped()) {
            if let Err(err) = instance.stop().await {
                warn!("instance stop failed btc_pk={} error={}", instance.btc_pk(), err);
                failures.push(err);
            }
        }
        ItestError::aggregate(failures)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{BlockInfo, FinalityProviderRecord, Vote};
    use crate::foundation::{AccountAddress, Height};
    use crate::infrastructure::rpc::{CreateFinalityProvider, RegisterFinalityProvider};
    use async_trait::async_trait;
    use std::sync::atomic::AtomicUsize;

    struct StubInstance {
        pk: BtcPublicKey,
    }

    #[async_trait]
    impl FinalityProviderInstance for StubInstance {
        fn btc_pk(&self) -> BtcPublicKey {
            self.pk
        }
        fn last_voted_height(&self) -> Height {
            0
        }
        fn is_running(&self) -> bool {
            true
        }
        async fn start(&self) -> Result<(), ItestError> {
            Ok(())
        }
        async fn stop(&self) -> Result<(), ItestError> {
            Ok(())
        }
    }

    struct StubApp {
        stops: AtomicUsize,
        fail: bool,
        instance: Arc<StubInstance>,
    }

    #[async_trait]
    impl FinalityProviderApp for StubApp {
        async fn start(&self) -> Result<(), ItestError> {
            Ok(())
        }
        async fn stop(&self) -> Result<(), ItestError> {
            self.stops.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                Err(ItestError::Message(format!("app {} stuck", self.instance.pk.short())))
            } else {
                Ok(())
            }
        }
        async fn create_finality_provider(&self, _request: CreateFinalityProvider) -> Result<FinalityProviderRecord, ItestError> {
            Err(ItestError::Message("unused".to_string()))
        }
        async fn start_finality_provider(&self, _btc_pk: &BtcPublicKey, _passphrase: &str) -> Result<(), ItestError> {
            Ok(())
        }
        fn instance(&self) -> Result<Arc<dyn FinalityProviderInstance>, ItestError> {
            Ok(self.instance.clone())
        }
    }

    struct StubNode;

    #[async_trait]
    impl ConsensusController for StubNode {
        async fn start(&self) -> Result<(), ItestError> {
            Ok(())
        }
        async fn query_light_client_tip(&self) -> Result<Height, ItestError> {
            Ok(1)
        }
        async fn query_finality_providers(&self) -> Result<Vec<FinalityProviderRecord>, ItestError> {
            Ok(Vec::new())
        }
        async fn query_votes_at_height(&self, _height: Height) -> Result<Vec<BtcPublicKey>, ItestError> {
            Ok(Vec::new())
        }
        async fn register_finality_provider(&self, _request: RegisterFinalityProvider) -> Result<FinalityProviderRecord, ItestError> {
            Err(ItestError::Message("unused".to_string()))
        }
        async fn submit_finality_signature(&self, _vote: Vote) -> Result<(), ItestError> {
            Ok(())
        }
    }

    #[async_trait]
    impl ConsumerController for StubNode {
        async fn query_is_block_finalized(&self, _height: Height) -> Result<bool, ItestError> {
            Ok(false)
        }
        async fn query_latest_block_height(&self) -> Result<Height, ItestError> {
            Ok(0)
        }
        async fn query_latest_finalized_block(&self) -> Result<Option<BlockInfo>, ItestError> {
            Ok(None)
        }
        async fn query_block(&self, height: Height) -> Result<BlockInfo, ItestError> {
            Err(ItestError::NodeRpcError(format!("block {height} not found")))
        }
    }

    fn registered(seed: u8, fail: bool) -> (RegisteredInstance, Arc<StubApp>) {
        let pk = BtcPublicKey::new([seed; 32]);
        let app = Arc::new(StubApp { stops: AtomicUsize::new(0), fail, instance: Arc::new(StubInstance { pk }) });
        let resources = InstanceResources {
            eots_key: KeyName::from(format!("eots-key-{seed}")),
            account: ChainAccount { key_name: KeyName::from(format!("fp-key-{seed}")), address: AccountAddress::from(format!("bbn1{seed}")) },
            home_dir: PathBuf::from(format!("/tmp/fp-{seed}")),
            rpc_port: 20_000 + u16::from(seed),
            metrics_port: 30_000 + u16::from(seed),
        };
        let instance = app.instance.clone();
        let node = Arc::new(StubNode);
        (RegisteredInstance::new(resources, app.clone(), instance, node.clone(), node, Vec::new()), app)
    }

    fn admit(registry: &InstanceRegistry, instance: RegisteredInstance) -> Arc<RegisteredInstance> {
        registry.register(instance).unwrap_or_else(|_| panic!("registry closed"))
    }

    #[tokio::test]
    async fn test_register_and_lookup() {
        let registry = InstanceRegistry::new();
        assert!(registry.is_empty());
        let (first, _) = registered(1, false);
        let (second, _) = registered(2, false);
        admit(&registry, first);
        admit(&registry, second);

        assert_eq!(registry.len(), 2);
        assert_eq!(registry.all()[0].btc_pk(), BtcPublicKey::new([1u8; 32]));
        let found = registry.get(&BtcPublicKey::new([2u8; 32])).expect("found");
        assert_eq!(found.resources.rpc_port, 20_002);
        assert!(registry.get(&BtcPublicKey::new([3u8; 32])).is_none());
    }

    #[tokio::test]
    async fn test_stop_all_is_idempotent() {
        let registry = InstanceRegistry::new();
        let (instance, app) = registered(1, false);
        admit(&registry, instance);

        registry.stop_all().await.expect("first stop");
        registry.stop_all().await.expect("second stop");
        assert_eq!(app.stops.load(Ordering::SeqCst), 1);
        assert!(registry.all().iter().all(|instance| instance.is_stopped()));
    }

    #[tokio::test]
    async fn test_stop_all_attempts_every_instance_and_aggregates() {
        let registry = InstanceRegistry::new();
        let mut apps = Vec::new();
        for (seed, fail) in [(1, true), (2, false), (3, true)] {
            let (instance, app) = registered(seed, fail);
            admit(&registry, instance);
            apps.push(app);
        }

        let err = registry.stop_all().await.unwrap_err();
        match err {
            ItestError::TeardownFailed { failures } => {
                assert_eq!(failures.len(), 2);
                assert!(failures[0].contains("01010101"));
                assert!(failures[1].contains("03030303"));
            }
            other => panic!("unexpected error {other:?}"),
        }
        assert!(apps.iter().all(|app| app.stops.load(Ordering::SeqCst) == 1));
        registry.stop_all().await.expect("failed instances are not retried");
    }

    #[tokio::test]
    async fn test_registration_after_teardown_is_rejected() {
        let registry = InstanceRegistry::new();
        registry.stop_all().await.expect("empty teardown");

        let (late, app) = registered(4, false);
        let rejected = match registry.register(late) {
            Ok(_) => panic!("closed registry accepted an instance"),
            Err(rejected) => rejected,
        };
        assert!(registry.is_empty());
        assert!(!rejected.is_stopped());
        rejected.stop().await.expect("caller stops the rejected instance");
        assert_eq!(app.stops.load(Ordering::SeqCst), 1);
    }
}
