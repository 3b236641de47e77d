use crate::metrics::{InstanceMetrics, SignerMetrics};
use fp_itest_core::infrastructure::devnet::DevnetKeyring;
use fp_itest_core::infrastructure::rpc::FinalityProviderInstance;
use std::sync::Arc;

pub struct SignerState {
    pub keyring: Arc<DevnetKeyring>,
    pub metrics: Arc<SignerMetrics>,
}

pub struct InstanceState {
    pub instance: Arc<dyn FinalityProviderInstance>,
    pub metrics: Arc<InstanceMetrics>,
}
