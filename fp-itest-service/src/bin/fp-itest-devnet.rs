#[path = "fp-itest-devnet/cli.rs"]
mod cli;
#[path = "fp-itest-devnet/summary.rs"]
mod summary;

use crate::cli::Cli;
use crate::summary::RunSummary;
use fp_itest_core::application::RegisteredInstance;
use fp_itest_core::foundation::ItestError;
use fp_itest_core::infrastructure::config::load_itest_config;
use fp_itest_core::infrastructure::logging::init_logger;
use fp_itest_service::{Collaborators, TestManager};
use log::{error, info};
use std::path::PathBuf;
use std::sync::Arc;

async fn exercise(manager: &TestManager, instances: &[Arc<RegisteredInstance>], finalized_blocks: u64) -> Result<RunSummary, ItestError> {
    let mut voted = Vec::with_capacity(instances.len());
    for instance in instances {
        let height = manager.wait_for_fp_vote_cast(instance).await?;
        info!("first vote observed btc_pk={} height={}", instance.btc_pk(), height);
        voted.push((Arc::clone(instance), height));
    }
    let finalized = manager.wait_for_n_finalized_blocks(finalized_blocks).await?;
    let registered = manager.consensus().query_finality_providers().await?.len();
    Ok(RunSummary::collect(manager, &voted, &finalized, registered))
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Cli::parse_args();
    args.apply_to_env();
    let config = load_itest_config()?;

    let filters = args.log_level.clone().unwrap_or_else(|| config.logging.filters.clone());
    let log_dir = args.log_dir.clone().or_else(|| config.logging.log_dir.clone().map(PathBuf::from));
    init_logger(log_dir.as_deref(), &filters)?;
    info!(
        "fp-itest-devnet starting instances={} finalized_blocks={} block_time_ms={}",
        args.instances, args.finalized_blocks, config.devnet.block_time_ms
    );

    let collaborators = Collaborators::devnet(config.devnet.clone());
    let (manager, instances) = TestManager::start_manager_with_finality_providers(config, collaborators, args.instances).await?;

    let outcome = exercise(&manager, &instances, args.finalized_blocks).await;
    let teardown = manager.stop().await;
    let summary = match outcome {
        Ok(summary) => summary,
        Err(err) => {
            error!("devnet run failed error={}", err);
            if let Err(teardown_err) = teardown {
                error!("teardown failed error={}", teardown_err);
            }
            return Err(err.into());
        }
    };
    teardown?;

    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}
