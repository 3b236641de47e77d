pub mod cleanup;
pub mod wait;

#[allow(unused_imports)]
pub use cleanup::*;
#[allow(unused_imports)]
pub use wait::*;

use fp_itest_core::infrastructure::config::ItestConfig;
use fp_itest_service::{Collaborators, TestManager};
use std::path::Path;

/// Devnet settings that let a full scenario finish in seconds.
#[allow(dead_code)]
pub fn fast_config(data_dir: &Path) -> ItestConfig {
    let mut config = ItestConfig::default();
    config.environment.base_dir = Some(data_dir.display().to_string());
    config.timing.eventually_timeout_secs = 60;
    config.timing.poll_interval_ms = 50;
    config.timing.construction_timeout_secs = 5;
    config.timing.service_ready_timeout_secs = 10;
    config.devnet.block_time_ms = 100;
    config.devnet.vote_interval_ms = 50;
    config
}

#[allow(dead_code)]
pub async fn start_devnet(data_dir: &Path) -> TestManager {
    let config = fast_config(data_dir);
    let collaborators = Collaborators::devnet(config.devnet.clone());
    TestManager::start(config, collaborators).await.expect("start test manager")
}
