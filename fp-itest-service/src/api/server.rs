use async_trait::async_trait;
use axum::Router;
use fp_itest_core::foundation::ItestError;
use fp_itest_core::infrastructure::lifecycle::ServiceHandle;
use log::{error, info};
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

/// A background axum server with graceful shutdown.
pub struct HttpServer {
    name: String,
    addr: SocketAddr,
    shutdown: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<Result<(), ItestError>>>,
}

impl HttpServer {
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }
}

pub fn spawn_server(name: &str, listener: TcpListener, router: Router) -> Result<HttpServer, ItestError> {
    let addr = listener.local_addr()?;
    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
    let server_name = name.to_string();
    let task = tokio::spawn(async move {
        info!("HTTP server ready and accepting connections name={} addr={}", server_name, addr);
        axum::serve(listener, router.into_make_service_with_connect_info::<SocketAddr>())
            .with_graceful_shutdown(async move {
                let _ = shutdown_rx.await;
            })
            .await
            .map_err(|err| {
                error!("HTTP server terminated unexpectedly name={} addr={} error={}", server_name, addr, err);
                ItestError::process(server_name.as_str(), err.to_string())
            })
    });
    Ok(HttpServer { name: name.to_string(), addr, shutdown: Some(shutdown_tx), task: Some(task) })
}

#[async_trait]
impl ServiceHandle for HttpServer {
    async fn stop(&mut self) -> Result<(), ItestError> {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
        let Some(task) = self.task.take() else {
            return Ok(());
        };
        task.await.map_err(|err| ItestError::process(self.name.as_str(), format!("server task: {err}")))??;
        info!("HTTP server stopped name={} addr={}", self.name, self.addr);
        Ok(())
    }
}

/// Servers that start and stop together (e.g. an API listener and its metrics listener).
pub struct ServerGroup {
    servers: Vec<HttpServer>,
}

impl ServerGroup {
    pub fn new(servers: Vec<HttpServer>) -> Self {
        Self { servers }
    }

    pub fn addrs(&self) -> Vec<SocketAddr> {
        self.servers.iter().map(HttpServer::addr).collect()
    }
}

#[async_trait]
impl ServiceHandle for ServerGroup {
    async fn stop(&mut self) -> Result<(), ItestError> {
        let mut failures = Vec::new();
        for server in &mut self.servers {
            if let Err(err) = server.stop().await {
                failures.push(err);
            }
        }
        ItestError::aggregate(failures)
    }
}
