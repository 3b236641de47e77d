use crate::foundation::ItestError;
use crate::infrastructure::lifecycle::HealthProbe;
use async_trait::async_trait;
use std::future::Future;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::TcpStream;

const TCP_CONNECT_TIMEOUT: Duration = Duration::from_secs(1);

/// Healthy once a TCP connection to `addr` can be opened.
#[derive(Clone, Debug)]
pub struct TcpProbe {
    addr: SocketAddr,
}

impl TcpProbe {
    pub fn new(addr: SocketAddr) -> Self {
        Self { addr }
    }
}

#[async_trait]
impl HealthProbe for TcpProbe {
    fn describe(&self) -> String {
        format!("tcp connect {}", self.addr)
    }

    async fn check(&self) -> Result<(), ItestError> {
        match tokio::time::timeout(TCP_CONNECT_TIMEOUT, TcpStream::connect(self.addr)).await {
            Ok(Ok(_stream)) => Ok(()),
            Ok(Err(err)) => Err(ItestError::Message(format!("connect {}: {err}", self.addr))),
            Err(_) => Err(ItestError::Message(format!("connect {}: timed out", self.addr))),
        }
    }
}

/// Health check backed by an arbitrary async closure, e.g. a cheap node query.
pub struct FnProbe<F> {
    description: String,
    check: F,
}

impl<F> FnProbe<F> {
    pub fn new(description: impl Into<String>, check: F) -> Self {
        Self { description: description.into(), check }
    }
}

#[async_trait]
impl<F, Fut> HealthProbe for FnProbe<F>
where
    F: Fn() -> Fut + Send + Sync,
    Fut: Future<Output = Result<(), ItestError>> + Send,
{
    fn describe(&self) -> String {
        self.description.clone()
    }

    async fn check(&self) -> Result<(), ItestError> {
        (self.check)().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn test_tcp_probe_follows_listener() {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("addr");
        let probe = TcpProbe::new(addr);
        assert!(probe.check().await.is_ok());

        drop(listener);
        let err = probe.check().await.unwrap_err();
        assert!(err.to_string().contains(&addr.to_string()));
    }

    #[tokio::test]
    async fn test_fn_probe_reports_closure_result() {
        let up = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&up);
        let probe = FnProbe::new("query tip", move || {
            let flag = Arc::clone(&flag);
            async move {
                if flag.load(Ordering::SeqCst) {
                    Ok(())
                } else {
                    Err(ItestError::NodeRpcError("connection refused".to_string()))
                }
            }
        });
        assert_eq!(probe.describe(), "query tip");
        assert!(probe.check().await.is_err());
        up.store(true, Ordering::SeqCst);
        assert!(probe.check().await.is_ok());
    }
}
