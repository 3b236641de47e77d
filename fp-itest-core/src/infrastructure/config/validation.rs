use crate::infrastructure::config::types::ItestConfig;

const MIN_PORT: u16 = 1024;

impl ItestConfig {
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        let env = &self.environment;
        if env.chain_id.trim().is_empty() {
            errors.push("environment.chain_id must not be empty".to_string());
        }
        if env.num_covenants == 0 {
            errors.push("environment.num_covenants must be > 0".to_string());
        }
        if env.covenant_quorum == 0 || env.covenant_quorum > env.num_covenants {
            errors.push(format!(
                "environment.covenant_quorum must be in 1..={} (got {})",
                env.num_covenants, env.covenant_quorum
            ));
        }
        if env.port_range_start < MIN_PORT {
            errors.push(format!("environment.port_range_start must be >= {MIN_PORT}"));
        }
        if env.port_range_start >= env.port_range_end {
            errors.push("environment.port_range_start must be below port_range_end".to_string());
        }

        let timing = &self.timing;
        if timing.poll_interval_ms == 0 {
            errors.push("timing.poll_interval_ms must be > 0".to_string());
        }
        if timing.eventually_timeout_secs == 0 {
            errors.push("timing.eventually_timeout_secs must be > 0".to_string());
        }
        if timing.construction_timeout_secs == 0 {
            errors.push("timing.construction_timeout_secs must be > 0".to_string());
        }
        if timing.service_ready_timeout_secs == 0 {
            errors.push("timing.service_ready_timeout_secs must be > 0".to_string());
        }

        if self.devnet.block_time_ms == 0 {
            errors.push("devnet.block_time_ms must be > 0".to_string());
        }
        if self.devnet.vote_interval_ms == 0 {
            errors.push("devnet.vote_interval_ms must be > 0".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(ItestConfig::default().validate().is_ok());
    }

    #[test]
    fn test_quorum_above_committee_size_rejected() {
        let mut config = ItestConfig::default();
        config.environment.covenant_quorum = 4;
        config.environment.num_covenants = 3;
        let errors = config.validate().unwrap_err();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("covenant_quorum"));
    }

    #[test]
    fn test_collects_every_error() {
        let mut config = ItestConfig::default();
        config.environment.chain_id = " ".to_string();
        config.environment.port_range_start = 80;
        config.timing.poll_interval_ms = 0;
        config.devnet.block_time_ms = 0;
        let errors = config.validate().unwrap_err();
        assert_eq!(errors.len(), 4, "{errors:?}");
    }
}
