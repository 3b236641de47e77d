//! System-wide constants for finality-provider integration environments.

use std::time::Duration;

/// Budget for distributed properties (votes, finalization, actor registration).
pub const EVENTUALLY_WAIT_TIMEOUT: Duration = Duration::from_secs(5 * 60);

/// Spacing between convergence predicate evaluations.
pub const EVENTUALLY_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Budget for client construction races against a freshly spawned node.
pub const CLIENT_CONSTRUCTION_TIMEOUT: Duration = Duration::from_secs(5);

/// Budget for a spawned service to open its listener.
pub const SERVICE_READY_TIMEOUT: Duration = Duration::from_secs(30);

/// Upper bound for reaping a killed child process.
pub const PROCESS_STOP_TIMEOUT: Duration = Duration::from_secs(10);

pub const TEST_MONIKER: &str = "test-moniker";
pub const TEST_CHAIN_ID: &str = "chain-test";
pub const PASSPHRASE: &str = "testpass";
pub const HD_PATH: &str = "";

pub const DEFAULT_COVENANT_QUORUM: usize = 2;
pub const DEFAULT_NUM_COVENANTS: usize = 3;

/// Genesis account that funds every new finality-provider account.
pub const GENESIS_FUNDER: &str = "node0";
pub const FUNDING_AMOUNT: u64 = 1_000_000;
pub const FUNDING_DENOM: &str = "ubbn";
pub const GENESIS_FUNDER_BALANCE: u64 = 1_000_000_000_000;

/// Commission in basis points (10_000 = 100%).
pub const MAX_COMMISSION_BPS: u32 = 10_000;

pub const EOTS_KEY_PREFIX: &str = "eots-key";
pub const FP_KEY_PREFIX: &str = "fp-key";
pub const FP_HOME_PREFIX: &str = "fp-";
pub const TEST_DIR_PREFIX: &str = "fp-e2e-test-";
pub const NODE_DIR_PREFIX: &str = "babylon-test-";
pub const EOTS_HOME_DIR: &str = "eots-home";
pub const FP_HOME_DIR: &str = "fp-home";

/// Bytes of randomness in generated key and directory suffixes.
pub const NAME_SUFFIX_BYTES: usize = 4;

pub const DEFAULT_PORT_RANGE_START: u16 = 20_000;
pub const DEFAULT_PORT_RANGE_END: u16 = 40_000;
pub const MAX_PORT_ALLOCATION_ATTEMPTS: usize = 10_000;

/// Domain separator for finality vote digests.
pub const VOTE_DIGEST_DOMAIN: &[u8] = b"fp-vote";
pub const POP_DIGEST_DOMAIN: &[u8] = b"fp-pop";

/// Persisted finality-provider state file inside the instance home.
pub const FP_STATE_FILE_NAME: &str = "fp-state.json";
