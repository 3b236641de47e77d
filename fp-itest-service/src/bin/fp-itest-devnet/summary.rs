use fp_itest_core::application::RegisteredInstance;
use fp_itest_core::domain::BlockInfo;
use fp_itest_core::foundation::Height;
use fp_itest_service::TestManager;
use serde::Serialize;
use std::sync::Arc;

#[derive(Debug, Serialize)]
pub struct InstanceSummary {
    pub btc_pk: String,
    pub account: String,
    pub rpc_port: u16,
    pub metrics_port: u16,
    pub first_vote_height: Height,
    pub last_voted_height: Height,
}

#[derive(Debug, Serialize)]
pub struct RunSummary {
    pub chain_id: String,
    pub node_rpc: String,
    pub signer_addr: String,
    pub covenant_quorum: usize,
    pub covenants: usize,
    pub finality_providers: usize,
    pub latest_finalized_height: Height,
    pub latest_finalized_hash: String,
    pub instances: Vec<InstanceSummary>,
}

impl RunSummary {
    pub fn collect(manager: &TestManager, instances: &[(Arc<RegisteredInstance>, Height)], finalized: &BlockInfo, registered: usize) -> Self {
        Self {
            chain_id: manager.config().environment.chain_id.clone(),
            node_rpc: manager.node_endpoints().rpc_addr.clone(),
            signer_addr: manager.signer_addr().to_string(),
            covenant_quorum: manager.committee().quorum,
            covenants: manager.committee().len(),
            finality_providers: registered,
            latest_finalized_height: finalized.height,
            latest_finalized_hash: finalized.hash.to_hex(),
            instances: instances
                .iter()
                .map(|(instance, first_vote_height)| InstanceSummary {
                    btc_pk: instance.btc_pk().to_hex(),
                    account: instance.resources.account.address.to_string(),
                    rpc_port: instance.resources.rpc_port,
                    metrics_port: instance.resources.metrics_port,
                    first_vote_height: *first_vote_height,
                    last_voted_height: instance.instance.last_voted_height(),
                })
                .collect(),
        }
    }
}
