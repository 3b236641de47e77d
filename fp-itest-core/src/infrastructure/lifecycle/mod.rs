//! Uniform start / wait-ready / stop contract for every external service of a test run.

mod probe;
mod process;
mod service;

pub use probe::{FnProbe, TcpProbe};
pub use process::{ProcessHandle, ProcessLauncher, ProcessSpec};
pub use service::ManagedService;

use crate::foundation::ItestError;
use async_trait::async_trait;

/// Answers "is the service usable yet". Errors mean "not yet".
#[async_trait]
pub trait HealthProbe: Send + Sync {
    fn describe(&self) -> String;
    async fn check(&self) -> Result<(), ItestError>;
}

/// Stop capability of something that was launched. Stopping twice must be harmless.
#[async_trait]
pub trait ServiceHandle: Send + Sync {
    async fn stop(&mut self) -> Result<(), ItestError>;
}

/// Spawns a service and returns before it is ready.
#[async_trait]
pub trait ServiceLauncher: Send + Sync {
    async fn launch(&self, name: &str) -> Result<Box<dyn ServiceHandle>, ItestError>;
}
