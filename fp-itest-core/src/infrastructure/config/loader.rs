//! Configuration loader using Figment for layered config management.
//!
//! Precedence (lowest to highest):
//! 1. Compiled defaults
//! 2. TOML config file
//! 3. Environment variables (FP_ITEST_* prefix)

use crate::foundation::ItestError;
use crate::infrastructure::config::types::ItestConfig;
use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use log::{debug, info};
use std::path::Path;

/// Environment variable prefix for config overrides.
///
/// Example: `FP_ITEST_ENVIRONMENT__COVENANT_QUORUM` -> `environment.covenant_quorum`
pub const ENV_PREFIX: &str = "FP_ITEST_";

/// Load configuration from an optional TOML file plus environment overrides.
pub fn load_config(path: Option<&Path>) -> Result<ItestConfig, ItestError> {
    match path {
        Some(path) => load_config_from_file(path),
        None => extract(figment_defaults().merge(Env::prefixed(ENV_PREFIX).split("__"))),
    }
}

/// Load configuration from a specific file path; a missing file falls back to defaults.
pub fn load_config_from_file(path: &Path) -> Result<ItestConfig, ItestError> {
    info!("loading configuration path={}", path.display());
    let mut figment = figment_defaults();
    if path.exists() {
        figment = figment.merge(Toml::file(path));
    } else {
        debug!("configuration file missing; using defaults and env only path={}", path.display());
    }
    extract(figment.merge(Env::prefixed(ENV_PREFIX).split("__")))
}

fn figment_defaults() -> Figment {
    Figment::new().merge(Serialized::defaults(ItestConfig::default()))
}

fn extract(figment: Figment) -> Result<ItestConfig, ItestError> {
    let config: ItestConfig = figment.extract().map_err(|e| ItestError::ConfigError(format!("config extraction failed: {e}")))?;
    debug!(
        "configuration loaded chain_id={} covenant_quorum={} num_covenants={} eventually_timeout_secs={}",
        config.environment.chain_id,
        config.environment.covenant_quorum,
        config.environment.num_covenants,
        config.timing.eventually_timeout_secs
    );
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().expect("tempdir");
        let config = load_config_from_file(&dir.path().join("absent.toml")).expect("defaults");
        assert_eq!(config.environment.chain_id, "chain-test");
        assert_eq!(config.environment.covenant_quorum, 2);
        assert_eq!(config.environment.num_covenants, 3);
        assert_eq!(config.timing.eventually_timeout_secs, 300);
        assert_eq!(config.timing.poll_interval_ms, 500);
    }

    #[test]
    fn test_toml_overrides_defaults() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("itest.toml");
        let mut file = std::fs::File::create(&path).expect("create");
        writeln!(file, "[environment]\nchain_id = \"bbn-local\"\nnum_covenants = 5\n\n[devnet]\nblock_time_ms = 50").expect("write");

        let config = load_config_from_file(&path).expect("load");
        assert_eq!(config.environment.chain_id, "bbn-local");
        assert_eq!(config.environment.num_covenants, 5);
        assert_eq!(config.environment.covenant_quorum, 2);
        assert_eq!(config.devnet.block_time_ms, 50);
        assert_eq!(config.devnet.vote_interval_ms, 200);
    }

    #[test]
    fn test_invalid_toml_is_config_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("broken.toml");
        std::fs::write(&path, "[environment\nchain_id = ").expect("write");
        let err = load_config_from_file(&path).unwrap_err();
        assert!(matches!(err, ItestError::ConfigError(_)));
    }
}
