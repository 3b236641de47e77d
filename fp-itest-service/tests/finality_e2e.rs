mod harness;

use fp_itest_core::domain::{verify_schnorr, ServiceState};
use fp_itest_core::foundation::{BtcPublicKey, ItestError};
use fp_itest_service::{Collaborators, TestManager};
use fp_itest_core::infrastructure::poll::{await_condition, PollPolicy};
use harness::{fast_config, leftover_test_dirs, start_devnet, stop_and_verify};
use std::collections::HashSet;
use std::time::Duration;
use tempfile::TempDir;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn bootstrap_brings_up_node_and_signer() {
    let data_dir = TempDir::new().expect("temp dir");
    let manager = start_devnet(data_dir.path()).await;

    assert_eq!(manager.node_service().state(), ServiceState::Running);
    assert_eq!(manager.signer_service().state(), ServiceState::Running);
    assert_eq!(manager.committee().len(), 3);
    assert_eq!(manager.committee().quorum, 2);
    assert!(manager.base_dir().starts_with(data_dir.path()));
    assert!(manager.consensus().query_light_client_tip().await.expect("tip") > 0);
    assert!(manager.instances().is_empty());

    stop_and_verify(&manager).await;
    assert_eq!(manager.node_service().state(), ServiceState::Stopped);
    assert_eq!(manager.signer_service().state(), ServiceState::Stopped);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn single_provider_votes_and_finalizes_blocks() {
    let data_dir = TempDir::new().expect("temp dir");
    let manager = start_devnet(data_dir.path()).await;

    let instance = manager.add_finality_provider().await.expect("add finality provider");
    let providers = manager.wait_for_finality_providers(1).await.expect("one provider");
    assert_eq!(providers[0].btc_pk, instance.btc_pk());
    assert_eq!(providers[0].description.moniker, "test-moniker");

    let first_vote = manager.wait_for_fp_vote_cast(&instance).await.expect("first vote");
    manager.check_block_finalization(first_vote, 1).await.expect("first voted block finalized");

    let first_finalized = manager.consumer().query_latest_finalized_block().await.expect("query").expect("a finalized block");
    let latest = manager.wait_for_n_finalized_blocks(3).await.expect("three finalized blocks");
    assert!(latest.finalized);
    assert!(latest.height >= first_finalized.height + 2, "latest={} first_finalized={}", latest.height, first_finalized.height);

    stop_and_verify(&manager).await;
    assert!(!instance.instance.is_running());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn restarted_provider_catches_up() {
    let data_dir = TempDir::new().expect("temp dir");
    let manager = start_devnet(data_dir.path()).await;
    let instance = manager.add_finality_provider().await.expect("add finality provider");
    manager.wait_for_fp_vote_cast(&instance).await.expect("first vote");

    let before = manager.consumer().query_latest_block_height().await.expect("height");
    manager.stop_and_restart_fp_after_n_blocks(3, &instance).await.expect("stop and restart");
    assert!(instance.instance.is_running());

    let resume_target = before + 3;
    let fp = &instance.instance;
    let policy = PollPolicy::new(Duration::from_secs(20), Duration::from_millis(50));
    await_condition(&format!("votes resume at {resume_target}"), policy, || async move { Ok(fp.last_voted_height() >= resume_target) })
        .await
        .expect("provider caught up after restart");
    let finalized = manager.wait_for_n_finalized_blocks(1).await.expect("finalized after restart");
    assert!(finalized.height >= resume_target);

    stop_and_verify(&manager).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn several_providers_register_and_share_finalization() {
    let data_dir = TempDir::new().expect("temp dir");
    let config = fast_config(data_dir.path());
    let collaborators = Collaborators::devnet(config.devnet.clone());
    let (manager, instances) =
        TestManager::start_manager_with_finality_providers(config, collaborators, 3).await.expect("start with providers");

    assert_eq!(instances.len(), 3);
    assert_eq!(manager.instances().len(), 3);
    let keys: HashSet<BtcPublicKey> = instances.iter().map(|instance| instance.btc_pk()).collect();
    assert_eq!(keys.len(), 3);
    let ports: HashSet<u16> = instances.iter().flat_map(|i| [i.resources.rpc_port, i.resources.metrics_port]).collect();
    assert_eq!(ports.len(), 6);

    let mut common_height = 0;
    for instance in &instances {
        common_height = common_height.max(manager.wait_for_fp_vote_cast(instance).await.expect("vote"));
    }
    manager.check_block_finalization(common_height, 3).await.expect("all three voted");
    assert!(manager.instance(&instances[1].btc_pk()).is_some());

    stop_and_verify(&manager).await;
    assert!(instances.iter().all(|instance| instance.is_stopped()));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn zero_providers_leaves_node_with_no_actors() {
    let data_dir = TempDir::new().expect("temp dir");
    let config = fast_config(data_dir.path());
    let collaborators = Collaborators::devnet(config.devnet.clone());
    let (manager, instances) =
        TestManager::start_manager_with_finality_providers(config, collaborators, 0).await.expect("start without providers");

    assert!(instances.is_empty());
    assert!(manager.instances().is_empty());
    let providers = manager.wait_for_finality_providers(0).await.expect("no providers");
    assert!(providers.is_empty());

    stop_and_verify(&manager).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn provider_added_during_teardown_is_not_left_running() {
    let data_dir = TempDir::new().expect("temp dir");
    let manager = start_devnet(data_dir.path()).await;

    // Teardown may race file writes of the half-built instance, so only the outcome for the
    // instance is checked here.
    let (added, _teardown) = tokio::join!(manager.add_finality_provider(), manager.stop());
    assert!(manager.is_stopped());
    if let Ok(instance) = added {
        assert!(instance.is_stopped());
        assert!(!instance.instance.is_running());
    }
    assert!(manager.instances().iter().all(|instance| instance.is_stopped()));
    assert!(manager.add_finality_provider().await.is_err());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn private_key_matches_provider_key() {
    let data_dir = TempDir::new().expect("temp dir");
    let manager = start_devnet(data_dir.path()).await;
    let instance = manager.add_finality_provider().await.expect("add finality provider");

    let record = manager.get_fp_priv_key(&instance.btc_pk()).await.expect("key record");
    assert_eq!(record.public_key, instance.btc_pk());
    assert_eq!(record.name, instance.resources.eots_key);
    let (xonly, _) = record.secret_key.x_only_public_key(secp256k1::SECP256K1);
    assert_eq!(BtcPublicKey::from(xonly), instance.btc_pk());

    let digest = [9u8; 32];
    let signature = manager.signer().sign(&instance.btc_pk(), &digest, "testpass").await.expect("sign");
    verify_schnorr(&instance.btc_pk(), &digest, &signature).expect("valid signature");

    stop_and_verify(&manager).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn stopped_manager_rejects_new_providers() {
    let data_dir = TempDir::new().expect("temp dir");
    let manager = start_devnet(data_dir.path()).await;
    stop_and_verify(&manager).await;
    assert!(manager.is_stopped());
    assert!(manager.add_finality_provider().await.is_err());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn failed_bootstrap_leaves_nothing_behind() {
    let data_dir = TempDir::new().expect("temp dir");
    let mut config = fast_config(data_dir.path());
    config.timing.construction_timeout_secs = 1;
    config.devnet.node_startup_delay_ms = 10_000;
    let collaborators = Collaborators::devnet(config.devnet.clone());

    let err = TestManager::start(config, collaborators).await.err().expect("bootstrap must fail");
    assert!(matches!(err, ItestError::ConstructionFailed { .. }), "unexpected error: {err}");
    assert!(leftover_test_dirs(data_dir.path()).is_empty());
}

#[tokio::test]
async fn invalid_committee_is_rejected_before_anything_starts() {
    let data_dir = TempDir::new().expect("temp dir");
    let mut config = fast_config(data_dir.path());
    config.environment.covenant_quorum = 4;
    let collaborators = Collaborators::devnet(config.devnet.clone());

    let err = TestManager::start(config, collaborators).await.err().expect("bootstrap must fail");
    assert!(matches!(err, ItestError::ConfigError(_)), "unexpected error: {err}");
    assert!(leftover_test_dirs(data_dir.path()).is_empty());
}
