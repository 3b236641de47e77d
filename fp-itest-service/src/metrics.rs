use fp_itest_core::foundation::ItestError;
use fp_itest_core::infrastructure::rpc::FinalityProviderInstance;
use log::debug;
use prometheus::{Encoder, IntCounterVec, IntGauge, Registry, TextEncoder};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy)]
pub struct SignerMetricsSnapshot {
    pub uptime: Duration,
    pub requests_ok: u64,
    pub requests_error: u64,
}

/// Request counters exposed by the signing service.
pub struct SignerMetrics {
    registry: Registry,
    requests_total: IntCounterVec,
    started_at: Instant,
    requests_ok: AtomicU64,
    requests_error: AtomicU64,
}

fn metrics_err(err: impl ToString) -> ItestError {
    ItestError::Message(err.to_string())
}

fn encode_registry(registry: &Registry) -> Result<String, ItestError> {
    let metric_families = registry.gather();
    let mut buffer = Vec::new();
    TextEncoder::new().encode(&metric_families, &mut buffer).map_err(metrics_err)?;
    String::from_utf8(buffer).map_err(metrics_err)
}

impl SignerMetrics {
    pub fn new() -> Result<Self, ItestError> {
        debug!("initializing signer metrics");
        let registry = Registry::new();
        let requests_total = IntCounterVec::new(
            prometheus::Opts::new("signer_requests_total", "Signing service requests by operation and status"),
            &["op", "status"],
        )
        .map_err(metrics_err)?;
        registry.register(Box::new(requests_total.clone())).map_err(metrics_err)?;
        Ok(Self {
            registry,
            requests_total,
            started_at: Instant::now(),
            requests_ok: AtomicU64::new(0),
            requests_error: AtomicU64::new(0),
        })
    }

    pub fn record(&self, op: &str, ok: bool) {
        let status = if ok { "ok" } else { "error" };
        self.requests_total.with_label_values(&[op, status]).inc();
        if ok {
            self.requests_ok.fetch_add(1, Ordering::Relaxed);
        } else {
            self.requests_error.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn snapshot(&self) -> SignerMetricsSnapshot {
        SignerMetricsSnapshot {
            uptime: self.started_at.elapsed(),
            requests_ok: self.requests_ok.load(Ordering::Relaxed),
            requests_error: self.requests_error.load(Ordering::Relaxed),
        }
    }

    pub fn encode(&self) -> Result<String, ItestError> {
        encode_registry(&self.registry)
    }
}

/// Per-instance gauges, refreshed from the live instance on every scrape.
pub struct InstanceMetrics {
    registry: Registry,
    last_voted_height: IntGauge,
    running: IntGauge,
}

impl InstanceMetrics {
    pub fn new() -> Result<Self, ItestError> {
        let registry = Registry::new();
        let last_voted_height =
            IntGauge::new("fp_last_voted_height", "Highest block height this provider has voted on").map_err(metrics_err)?;
        let running = IntGauge::new("fp_running", "1 while the provider instance is voting").map_err(metrics_err)?;
        registry.register(Box::new(last_voted_height.clone())).map_err(metrics_err)?;
        registry.register(Box::new(running.clone())).map_err(metrics_err)?;
        Ok(Self { registry, last_voted_height, running })
    }

    pub fn observe(&self, instance: &dyn FinalityProviderInstance) {
        self.last_voted_height.set(i64::try_from(instance.last_voted_height()).unwrap_or(i64::MAX));
        self.running.set(i64::from(instance.is_running()));
    }

    pub fn encode(&self) -> Result<String, ItestError> {
        encode_registry(&self.registry)
    }
}
