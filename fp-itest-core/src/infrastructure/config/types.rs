use crate::foundation::{
    ChainId, DEFAULT_COVENANT_QUORUM, DEFAULT_NUM_COVENANTS, DEFAULT_PORT_RANGE_END, DEFAULT_PORT_RANGE_START, TEST_CHAIN_ID,
};
use crate::infrastructure::poll::PollPolicy;
use serde::{Deserialize, Serialize};
use std::ops::Range;
use std::time::Duration;

/// Root configuration for an integration environment.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ItestConfig {
    #[serde(default)]
    pub environment: EnvironmentConfig,
    #[serde(default)]
    pub timing: TimingConfig,
    #[serde(default)]
    pub devnet: DevnetConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EnvironmentConfig {
    #[serde(default = "default_chain_id")]
    pub chain_id: String,
    #[serde(default = "default_covenant_quorum")]
    pub covenant_quorum: usize,
    #[serde(default = "default_num_covenants")]
    pub num_covenants: usize,
    /// Parent directory for the per-run test directory. Defaults to the OS temp dir.
    #[serde(default)]
    pub base_dir: Option<String>,
    #[serde(default = "default_port_range_start")]
    pub port_range_start: u16,
    #[serde(default = "default_port_range_end")]
    pub port_range_end: u16,
}

fn default_chain_id() -> String {
    TEST_CHAIN_ID.to_string()
}

const fn default_covenant_quorum() -> usize {
    DEFAULT_COVENANT_QUORUM
}

const fn default_num_covenants() -> usize {
    DEFAULT_NUM_COVENANTS
}

const fn default_port_range_start() -> u16 {
    DEFAULT_PORT_RANGE_START
}

const fn default_port_range_end() -> u16 {
    DEFAULT_PORT_RANGE_END
}

impl Default for EnvironmentConfig {
    fn default() -> Self {
        Self {
            chain_id: default_chain_id(),
            covenant_quorum: default_covenant_quorum(),
            num_covenants: default_num_covenants(),
            base_dir: None,
            port_range_start: default_port_range_start(),
            port_range_end: default_port_range_end(),
        }
    }
}

impl EnvironmentConfig {
    pub fn chain_id(&self) -> ChainId {
        ChainId::from(self.chain_id.as_str())
    }

    pub fn port_range(&self) -> Range<u16> {
        self.port_range_start..self.port_range_end
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TimingConfig {
    #[serde(default = "default_eventually_timeout_secs")]
    pub eventually_timeout_secs: u64,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_construction_timeout_secs")]
    pub construction_timeout_secs: u64,
    #[serde(default = "default_service_ready_timeout_secs")]
    pub service_ready_timeout_secs: u64,
}

const fn default_eventually_timeout_secs() -> u64 {
    PollPolicy::convergence().timeout.as_secs()
}

const fn default_poll_interval_ms() -> u64 {
    PollPolicy::convergence().interval.as_millis() as u64
}

const fn default_construction_timeout_secs() -> u64 {
    PollPolicy::construction().timeout.as_secs()
}

const fn default_service_ready_timeout_secs() -> u64 {
    PollPolicy::service_ready().timeout.as_secs()
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            eventually_timeout_secs: default_eventually_timeout_secs(),
            poll_interval_ms: default_poll_interval_ms(),
            construction_timeout_secs: default_construction_timeout_secs(),
            service_ready_timeout_secs: default_service_ready_timeout_secs(),
        }
    }
}

impl TimingConfig {
    fn interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn convergence_policy(&self) -> PollPolicy {
        PollPolicy::new(Duration::from_secs(self.eventually_timeout_secs), self.interval())
    }

    pub fn construction_policy(&self) -> PollPolicy {
        PollPolicy::new(Duration::from_secs(self.construction_timeout_secs), self.interval())
    }

    pub fn service_ready_policy(&self) -> PollPolicy {
        PollPolicy::new(Duration::from_secs(self.service_ready_timeout_secs), self.interval())
    }
}

/// Knobs of the in-process devnet collaborators.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DevnetConfig {
    /// Interval between produced blocks.
    #[serde(default = "default_block_time_ms")]
    pub block_time_ms: u64,
    /// How long the node refuses connections after it was started.
    #[serde(default)]
    pub node_startup_delay_ms: u64,
    /// Interval of each finality provider's voting loop.
    #[serde(default = "default_vote_interval_ms")]
    pub vote_interval_ms: u64,
}

const fn default_block_time_ms() -> u64 {
    500
}

const fn default_vote_interval_ms() -> u64 {
    200
}

impl Default for DevnetConfig {
    fn default() -> Self {
        Self { block_time_ms: default_block_time_ms(), node_startup_delay_ms: 0, vote_interval_ms: default_vote_interval_ms() }
    }
}

impl DevnetConfig {
    pub fn block_time(&self) -> Duration {
        Duration::from_millis(self.block_time_ms)
    }

    pub fn node_startup_delay(&self) -> Duration {
        Duration::from_millis(self.node_startup_delay_ms)
    }

    pub fn vote_interval(&self) -> Duration {
        Duration::from_millis(self.vote_interval_ms)
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Filter expression understood by `init_logger` (e.g. `info,fp_itest_core=debug`).
    #[serde(default = "default_log_filters")]
    pub filters: String,
    #[serde(default)]
    pub log_dir: Option<String>,
}

fn default_log_filters() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { filters: default_log_filters(), log_dir: None }
    }
}
