mod loader;
mod types;
pub mod validation;

pub use loader::{load_config, load_config_from_file, ENV_PREFIX};
pub use types::*;

use crate::foundation::ItestError;
use std::path::PathBuf;

pub const CONFIG_PATH_ENV: &str = "FP_ITEST_CONFIG_PATH";
pub const DATA_DIR_ENV: &str = "FP_ITEST_DATA_DIR";

/// Config file named by `FP_ITEST_CONFIG_PATH`, if set and non-empty.
pub fn resolve_config_path() -> Option<PathBuf> {
    non_empty_env(CONFIG_PATH_ENV).map(PathBuf::from)
}

fn non_empty_env(name: &str) -> Option<String> {
    std::env::var(name).ok().map(|value| value.trim().to_string()).filter(|value| !value.is_empty())
}

/// Parent directory for per-run test directories: `FP_ITEST_DATA_DIR`, else `environment.base_dir`,
/// else the OS temp dir.
pub fn resolve_data_dir(config: &ItestConfig) -> PathBuf {
    non_empty_env(DATA_DIR_ENV)
        .or_else(|| config.environment.base_dir.clone())
        .map(PathBuf::from)
        .unwrap_or_else(std::env::temp_dir)
}

/// Loads and validates the configuration from `FP_ITEST_CONFIG_PATH` (or defaults + env only).
pub fn load_itest_config() -> Result<ItestConfig, ItestError> {
    let config = load_config(resolve_config_path().as_deref())?;
    config.validate().map_err(|errors| ItestError::ConfigError(format!("validation failed: {:?}", errors)))?;
    Ok(config)
}
