//! ---
//! sc_section: "03-logging-metrics"
//! sc_subsection: "module"
//! sc_type: "source"
//! sc_scope: "code"
//! sc_description: "Metrics collection and export utilities."
//! sc_version: "v0.1.0"
//! sc_owner: "tbd"
//! ---
use std::net::{SocketAddr, TcpListener as StdTcpListener};
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::http::{header, HeaderValue, StatusCode};
use axum::routing::get;
use axum::{response::IntoResponse, Router};
use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounterVec, IntGauge, Opts, Registry, TextEncoder,
};
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{error, info};

/// Shared registry type used across services.
pub type SharedRegistry = Arc<Registry>;

/// Produce a new shared registry.
pub fn new_registry() -> SharedRegistry {
    Arc::new(Registry::new())
}

/// Spawn an HTTP server that exposes the registry at `/metrics`.
pub fn spawn_http_server(registry: SharedRegistry, addr: SocketAddr) -> Result<MetricsServer> {
    let app = Router::new().route(
        "/metrics",
        get({
            let registry = registry.clone();
            move || metrics_handler(registry.clone())
        }),
    );

    let std_listener = StdTcpListener::bind(addr)
        .with_context(|| format!("failed to bind metrics listener {}", addr))?;
    let addr = std_listener
        .local_addr()
        .context("failed to resolve metrics listener address")?;
    std_listener
        .set_nonblocking(true)
        .with_context(|| "failed to configure metrics listener as non-blocking")?;
    let listener = TcpListener::from_std(std_listener)
        .with_context(|| "failed to convert std listener into tokio listener")?;

    info!(address = %addr, "metrics server starting");

    let (shutdown_tx, shutdown_rx) = oneshot::channel();
    let service = app.into_make_service();
    let handle: JoinHandle<Result<()>> = tokio::spawn(async move {
        axum::serve(listener, service)
            .with_graceful_shutdown(async move {
                let _ = shutdown_rx.await;
            })
            .await
            .context("metrics server encountered an error")?;
        Ok(())
    });

    Ok(MetricsServer {
        addr,
        shutdown: Some(shutdown_tx),
        task: handle,
    })
}

/// Prometheus scrape endpoint. Returns `text/plain` metrics even on large registries.
async fn metrics_handler(registry: SharedRegistry) -> impl IntoResponse {
    let families = registry.gather();
    let encoder = TextEncoder::new();
    match encoder.encode_to_string(&families) {
        Ok(body) => (
            StatusCode::OK,
            [(
                header::CONTENT_TYPE,
                HeaderValue::from_str(encoder.format_type()).unwrap_or_else(|_| {
                    HeaderValue::from_static("text/plain; charset=utf-8")
                }),
            )],
            body,
        )
            .into_response(),
        Err(err) => {
            error!(error = %err, "failed to encode metrics");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                String::from("metrics encoding error"),
            )
                .into_response()
        }
    }
}

/// Handle to the running HTTP exporter.
#[derive(Debug)]
pub struct MetricsServer {
    addr: SocketAddr,
    shutdown: Option<oneshot::Sender<()>>,
    task: JoinHandle<Result<()>>,
}

impl MetricsServer {
    /// Return the bound address for convenience.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Signal shutdown and await task completion.
    pub async fn shutdown(mut self) -> Result<()> {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        match self.task.await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(err)) => Err(err),
            Err(join_err) => Err(anyhow::Error::new(join_err)),
        }
    }
}

/// Metrics recorded by the harness dispatcher.
#[derive(Clone)]
pub struct HarnessMetrics {
    registry: SharedRegistry,
    tests_total: IntCounterVec,
    test_duration_seconds: Histogram,
    registered_subsystems: IntGauge,
}

impl HarnessMetrics {
    pub fn new(registry: SharedRegistry) -> Result<Self> {
        let tests_total = IntCounterVec::new(
            Opts::new(
                "syscheck_tests_total",
                "Count of executed tests by subsystem and outcome",
            ),
            &["subsystem", "outcome"],
        )?;
        registry.register(Box::new(tests_total.clone()))?;

        let buckets = prometheus::exponential_buckets(0.001, 2.0, 16)
            .context("failed to construct histogram buckets")?;
        let test_duration_seconds = Histogram::with_opts(
            HistogramOpts::new(
                "syscheck_test_duration_seconds",
                "Wall-clock duration of individual test executions",
            )
            .buckets(buckets),
        )?;
        registry.register(Box::new(test_duration_seconds.clone()))?;

        let registered_subsystems = IntGauge::with_opts(Opts::new(
            "syscheck_registered_subsystems",
            "Number of subsystems currently registered with the harness",
        ))?;
        registry.register(Box::new(registered_subsystems.clone()))?;

        Ok(Self {
            registry,
            tests_total,
            test_duration_seconds,
            registered_subsystems,
        })
    }

    pub fn registry(&self) -> SharedRegistry {
        self.registry.clone()
    }

    pub fn observe_test(&self, subsystem: &str, passed: bool, duration_seconds: f64) {
        let outcome = if passed { "passed" } else { "failed" };
        self.tests_total
            .with_label_values(&[subsystem, outcome])
            .inc();
        self.test_duration_seconds.observe(duration_seconds);
    }

    pub fn set_subsystem_count(&self, count: usize) {
        self.registered_subsystems.set(count as i64);
    }
}

pub use prometheus;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn harness_metrics_register_and_record() {
        let registry = new_registry();
        let metrics = HarnessMetrics::new(registry.clone()).expect("register metrics");

        metrics.set_subsystem_count(3);
        metrics.observe_test("fileio", true, 0.010);
        metrics.observe_test("fileio", false, 0.020);

        let families = registry.gather();
        let names: Vec<_> = families.iter().map(|f| f.get_name().to_owned()).collect();
        assert!(names.iter().any(|n| n == "syscheck_tests_total"));
        assert!(names.iter().any(|n| n == "syscheck_registered_subsystems"));
    }

    #[test]
    fn duplicate_registration_is_rejected() {
        let registry = new_registry();
        let _first = HarnessMetrics::new(registry.clone()).expect("first registration");
        assert!(HarnessMetrics::new(registry).is_err());
    }

    #[tokio::test]
    async fn exporter_spawns_on_ephemeral_port_and_shuts_down() {
        let registry = new_registry();
        let server = spawn_http_server(registry, "127.0.0.1:0".parse().expect("addr"))
            .expect("spawn exporter");
        assert_ne!(server.addr().port(), 0);
        server.shutdown().await.expect("clean shutdown");
    }
}
