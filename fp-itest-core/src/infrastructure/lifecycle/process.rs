use crate::foundation::{ItestError, PROCESS_STOP_TIMEOUT};
use crate::infrastructure::lifecycle::{ServiceHandle, ServiceLauncher};
use async_trait::async_trait;
use log::{debug, info, warn};
use std::fs::File;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::{Child, Command};

/// What to run for an OS-process service.
#[derive(Clone, Debug)]
pub struct ProcessSpec {
    pub program: PathBuf,
    pub args: Vec<String>,
    pub env: Vec<(String, String)>,
    /// Working directory; stdout/stderr land here as `<name>.stdout.log` / `<name>.stderr.log`.
    pub work_dir: PathBuf,
}

impl ProcessSpec {
    pub fn new(program: impl Into<PathBuf>, work_dir: impl Into<PathBuf>) -> Self {
        Self { program: program.into(), args: Vec::new(), env: Vec::new(), work_dir: work_dir.into() }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }
}

#[derive(Clone, Debug)]
pub struct ProcessLauncher {
    spec: ProcessSpec,
    stop_timeout: Duration,
}

impl ProcessLauncher {
    pub fn new(spec: ProcessSpec) -> Self {
        Self { spec, stop_timeout: PROCESS_STOP_TIMEOUT }
    }

    pub fn with_stop_timeout(mut self, stop_timeout: Duration) -> Self {
        self.stop_timeout = stop_timeout;
        self
    }

    fn log_file(&self, name: &str, stream: &str) -> Result<File, ItestError> {
        let path = self.spec.work_dir.join(format!("{name}.{stream}.log"));
        File::create(&path).map_err(|err| ItestError::process(name, format!("create {}: {err}", path.display())))
    }
}

#[async_trait]
impl ServiceLauncher for ProcessLauncher {
    async fn launch(&self, name: &str) -> Result<Box<dyn ServiceHandle>, ItestError> {
        std::fs::create_dir_all(&self.spec.work_dir)?;
        let stdout = self.log_file(name, "stdout")?;
        let stderr = self.log_file(name, "stderr")?;

        let child = Command::new(&self.spec.program)
            .args(&self.spec.args)
            .envs(self.spec.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .current_dir(&self.spec.work_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::from(stdout))
            .stderr(Stdio::from(stderr))
            .kill_on_drop(true)
            .spawn()
            .map_err(|err| ItestError::process(name, format!("spawn {}: {err}", self.spec.program.display())))?;

        info!("process spawned service={} program={} pid={:?}", name, self.spec.program.display(), child.id());
        Ok(Box::new(ProcessHandle { name: name.to_string(), child: Some(child), stop_timeout: self.stop_timeout }))
    }
}

/// Owns a spawned child. Dropping it kills the process.
#[derive(Debug)]
pub struct ProcessHandle {
    name: String,
    child: Option<Child>,
    stop_timeout: Duration,
}

#[async_trait]
impl ServiceHandle for ProcessHandle {
    async fn stop(&mut self) -> Result<(), ItestError> {
        let Some(mut child) = self.child.take() else {
            return Ok(());
        };
        if let Some(status) = child.try_wait()? {
            warn!("process already exited service={} status={}", self.name, status);
            return Ok(());
        }

        child.start_kill().map_err(|err| ItestError::process(&self.name, format!("kill: {err}")))?;
        match tokio::time::timeout(self.stop_timeout, child.wait()).await {
            Ok(Ok(status)) => {
                debug!("process reaped service={} status={}", self.name, status);
                Ok(())
            }
            Ok(Err(err)) => Err(ItestError::process(&self.name, format!("wait: {err}"))),
            Err(_) => Err(ItestError::process(
                &self.name,
                format!("did not exit within {}ms after kill", self.stop_timeout.as_millis()),
            )),
        }
    }
}
