/// Main log file written into the `--log-dir` of a run.
pub const LOG_FILE_NAME: &str = "fp-itest.log";
/// Warn+error only.
pub const ERR_LOG_FILE_NAME: &str = "fp-itest_err.log";

/// Format: `timestamp [LEVEL] message [module] [thread-id]`
pub const LOG_LINE_PATTERN_COLORED: &str = "{d(%Y-%m-%d %H:%M:%S%.3f)} [{h({l:5})}] {m} [{M}] [{I}]{n}";
pub const LOG_LINE_PATTERN: &str = "{d(%Y-%m-%d %H:%M:%S%.3f)} [{l:5}] {m} [{M}] [{I}]{n}";

pub const LOG_FILE_MAX_SIZE: u64 = 20_000_000;
pub const LOG_FILE_MAX_ROLLS: u32 = 3;

/// Crates logging at the requested app level; everything else is off unless opted in.
pub const WHITELISTED_CRATES: &[&str] = &["fp_itest_core", "fp_itest_service", "fp_itest_devnet"];
