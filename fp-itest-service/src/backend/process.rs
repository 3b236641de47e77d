use super::SigningServiceFactory;
use fp_itest_core::foundation::ItestError;
use fp_itest_core::infrastructure::lifecycle::{ProcessLauncher, ProcessSpec, ServiceLauncher};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

/// Runs an external signing-service binary as `<program> start --home <dir> --rpc-listener <addr>
/// --metrics-listener <addr>`, with its output captured in the home directory.
#[derive(Clone, Debug)]
pub struct ProcessSignerFactory {
    program: PathBuf,
    env: Vec<(String, String)>,
}

impl ProcessSignerFactory {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self { program: program.into(), env: Vec::new() }
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    pub fn spec(&self, home_dir: &Path, rpc_addr: SocketAddr, metrics_addr: SocketAddr) -> ProcessSpec {
        let spec = ProcessSpec::new(&self.program, home_dir)
            .arg("start")
            .arg("--home")
            .arg(home_dir.display().to_string())
            .arg("--rpc-listener")
            .arg(rpc_addr.to_string())
            .arg("--metrics-listener")
            .arg(metrics_addr.to_string());
        self.env.iter().fold(spec, |spec, (key, value)| spec.env(key.as_str(), value.as_str()))
    }
}

impl SigningServiceFactory for ProcessSignerFactory {
    fn launcher(&self, home_dir: &Path, rpc_addr: SocketAddr, metrics_addr: SocketAddr) -> Result<Box<dyn ServiceLauncher>, ItestError> {
        if !self.program.exists() {
            return Err(ItestError::process("signing-service", format!("binary not found: {}", self.program.display())));
        }
        Ok(Box::new(ProcessLauncher::new(self.spec(home_dir, rpc_addr, metrics_addr))))
    }
}
