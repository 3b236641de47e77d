use crate::domain::{is_quiescent, validate_transition, ServiceState};
use crate::foundation::ItestError;
use crate::infrastructure::lifecycle::{HealthProbe, ServiceHandle, ServiceLauncher};
use crate::infrastructure::poll::{poll_until, PollPolicy};
use log::{debug, info, warn};
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;

/// One externally running service (process, container or in-process server) and its lifecycle.
///
/// `Running` is only reached through a successful health check; `stop` is safe in every state.
pub struct ManagedService {
    name: String,
    state: Mutex<ServiceState>,
    probe: Arc<dyn HealthProbe>,
    handle: tokio::sync::Mutex<Option<Box<dyn ServiceHandle>>>,
}

impl fmt::Debug for ManagedService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ManagedService").field("name", &self.name).field("state", &self.state()).finish()
    }
}

impl ManagedService {
    pub fn new(name: impl Into<String>, probe: Arc<dyn HealthProbe>) -> Self {
        Self { name: name.into(), state: Mutex::new(ServiceState::NotStarted), probe, handle: tokio::sync::Mutex::new(None) }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> ServiceState {
        *self.state.lock()
    }

    fn transition(&self, to: ServiceState) -> Result<(), ItestError> {
        let mut state = self.state.lock();
        validate_transition(&self.name, *state, to)?;
        if *state != to {
            debug!("service state service={} from={} to={}", self.name, *state, to);
            *state = to;
        }
        Ok(())
    }

    /// Launches the service; it is `Starting` until [`Self::wait_ready`] succeeds.
    pub async fn start(&self, launcher: &dyn ServiceLauncher) -> Result<(), ItestError> {
        self.transition(ServiceState::Starting)?;
        match launcher.launch(&self.name).await {
            Ok(handle) => {
                *self.handle.lock().await = Some(handle);
                info!("service launched service={}", self.name);
                Ok(())
            }
            Err(err) => {
                warn!("service launch failed service={} error={}", self.name, err);
                self.transition(ServiceState::Failed)?;
                Err(err)
            }
        }
    }

    /// Adopts a service that was launched elsewhere (e.g. a container started by a container manager).
    pub async fn attach(&self, handle: Box<dyn ServiceHandle>) -> Result<(), ItestError> {
        self.transition(ServiceState::Starting)?;
        *self.handle.lock().await = Some(handle);
        Ok(())
    }

    /// Polls the health probe until it succeeds (`Running`) or the policy budget is spent (`Failed`).
    pub async fn wait_ready(&self, policy: PollPolicy) -> Result<(), ItestError> {
        match self.state() {
            ServiceState::Running => return Ok(()),
            ServiceState::Starting => {}
            other => {
                return Err(ItestError::InvalidStateTransition {
                    service: self.name.clone(),
                    from: other.to_string(),
                    to: ServiceState::Running.to_string(),
                })
            }
        }

        let description = format!("{} ready ({})", self.name, self.probe.describe());
        let probe = Arc::clone(&self.probe);
        let outcome = poll_until(&description, policy, || {
            let probe = Arc::clone(&probe);
            async move { probe.check().await.map(Some) }
        })
        .await;

        match outcome {
            Ok(()) => {
                self.transition(ServiceState::Running)?;
                info!("service ready service={}", self.name);
                Ok(())
            }
            Err(ItestError::ConvergenceTimeout { waited_ms, last_error, .. }) => {
                self.transition(ServiceState::Failed)?;
                Err(ItestError::ServiceUnavailable { service: self.name.clone(), waited_ms, last_error })
            }
            Err(err) => {
                self.transition(ServiceState::Failed)?;
                Err(err)
            }
        }
    }

    /// Graceful, idempotent shutdown. A service that never started, or already stopped, is left alone.
    pub async fn stop(&self) -> Result<(), ItestError> {
        let current = self.state();
        if is_quiescent(current) {
            return Ok(());
        }
        if current == ServiceState::Starting {
            self.transition(ServiceState::Failed)?;
        }
        self.transition(ServiceState::Stopping)?;

        let handle = self.handle.lock().await.take();
        let result = match handle {
            Some(mut handle) => handle.stop().await,
            None => Ok(()),
        };
        match result {
            Ok(()) => {
                self.transition(ServiceState::Stopped)?;
                info!("service stopped service={}", self.name);
                Ok(())
            }
            Err(err) => {
                warn!("service stop failed service={} error={}", self.name, err);
                self.transition(ServiceState::Failed)?;
                Err(err)
            }
        }
    }
}
