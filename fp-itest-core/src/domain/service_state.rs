use crate::foundation::ItestError;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceState {
    #[default]
    NotStarted,
    Starting,
    Running,
    Stopping,
    Stopped,
    Failed,
}

const VALID_TRANSITIONS: &[(ServiceState, ServiceState)] = &[
    (ServiceState::NotStarted, ServiceState::Starting),
    (ServiceState::Starting, ServiceState::Running),
    (ServiceState::Starting, ServiceState::Failed),
    (ServiceState::Running, ServiceState::Stopping),
    (ServiceState::Failed, ServiceState::Stopping),
    (ServiceState::Stopping, ServiceState::Stopped),
    (ServiceState::Stopping, ServiceState::Failed),
    (ServiceState::Stopped, ServiceState::Starting),
    (ServiceState::Failed, ServiceState::Starting),
];

impl fmt::Display for ServiceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ServiceState::NotStarted => "not_started",
            ServiceState::Starting => "starting",
            ServiceState::Running => "running",
            ServiceState::Stopping => "stopping",
            ServiceState::Stopped => "stopped",
            ServiceState::Failed => "failed",
        };
        f.write_str(name)
    }
}

pub fn validate_transition(service: &str, from: ServiceState, to: ServiceState) -> Result<(), ItestError> {
    if from == to {
        return Ok(());
    }
    if VALID_TRANSITIONS.contains(&(from, to)) {
        Ok(())
    } else {
        Err(ItestError::InvalidStateTransition { service: service.to_string(), from: from.to_string(), to: to.to_string() })
    }
}

/// States in which there is nothing left to stop.
pub fn is_quiescent(state: ServiceState) -> bool {
    matches!(state, ServiceState::NotStarted | ServiceState::Stopped)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_transitions() {
        assert!(validate_transition("node", ServiceState::NotStarted, ServiceState::Starting).is_ok());
        assert!(validate_transition("node", ServiceState::Starting, ServiceState::Running).is_ok());
        assert!(validate_transition("node", ServiceState::Running, ServiceState::Stopping).is_ok());
        assert!(validate_transition("node", ServiceState::Stopping, ServiceState::Stopped).is_ok());
        assert!(validate_transition("node", ServiceState::Stopped, ServiceState::Starting).is_ok());
        assert!(validate_transition("node", ServiceState::Stopped, ServiceState::Stopped).is_ok());
    }

    #[test]
    fn test_running_requires_starting() {
        let err = validate_transition("node", ServiceState::NotStarted, ServiceState::Running).unwrap_err();
        assert!(err.to_string().contains("not_started -> running"));
        assert!(validate_transition("node", ServiceState::Stopped, ServiceState::Running).is_err());
        assert!(validate_transition("node", ServiceState::Failed, ServiceState::Running).is_err());
    }

    #[test]
    fn test_quiescent_states() {
        assert!(is_quiescent(ServiceState::NotStarted));
        assert!(is_quiescent(ServiceState::Stopped));
        assert!(!is_quiescent(ServiceState::Running));
        assert!(!is_quiescent(ServiceState::Failed));
    }
}
