//! Prometheus metrics for the aggregator health checker
//!
//! Exposed on a separate listener so the status port keeps its fixed set of
//! endpoints.

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::OnceLock;

use http_body_util::Full;
use hyper::body::Bytes;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use prometheus::{
    HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Global metrics registry
static METRICS: OnceLock<Metrics> = OnceLock::new();

/// Get the global metrics instance
pub fn metrics() -> &'static Metrics {
    METRICS.get_or_init(Metrics::new)
}

pub struct Metrics {
    /// Registry for all metrics
    pub registry: Registry,
    /// Completed evaluation cycles by verdict
    pub health_checks_total: IntCounterVec,
    /// 1 while the latest health verdict is healthy
    pub healthy: IntGauge,
    /// 1 while this node is the master aggregator
    pub master_aggregator: IntGauge,
    /// Diagnostic query latency by step (completed queries only)
    pub query_duration_seconds: HistogramVec,
    /// Diagnostic queries that hit their deadline
    pub query_timeouts_total: IntCounterVec,
    /// KILL attempts against timed-out sessions by result
    pub connection_kills_total: IntCounterVec,
    /// Evaluation cycles that panicked
    pub cycle_panics_total: IntCounter,
}

impl Metrics {
    pub fn new() -> Self {
        let registry = Registry::new();

        let health_checks_total = IntCounterVec::new(
            Opts::new(
                "agg_health_checks_total",
                "Total number of completed health evaluation cycles",
            ),
            &["result"], // healthy, unhealthy
        )
        .unwrap();

        let healthy = IntGauge::new(
            "agg_health_healthy",
            "Whether the aggregator is currently reported healthy",
        )
        .unwrap();

        let master_aggregator = IntGauge::new(
            "agg_health_master_aggregator",
            "Whether this node is currently the master aggregator",
        )
        .unwrap();

        let query_duration_seconds = HistogramVec::new(
            HistogramOpts::new(
                "agg_health_query_duration_seconds",
                "Diagnostic query latency in seconds",
            )
            .buckets(vec![
                0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
            ]),
            &["step"],
        )
        .unwrap();

        let query_timeouts_total = IntCounterVec::new(
            Opts::new(
                "agg_health_query_timeouts_total",
                "Total number of diagnostic queries that exceeded their deadline",
            ),
            &["step"],
        )
        .unwrap();

        let connection_kills_total = IntCounterVec::new(
            Opts::new(
                "agg_health_connection_kills_total",
                "Total number of KILL attempts against timed-out sessions",
            ),
            &["result"], // ok, failed, timeout
        )
        .unwrap();

        let cycle_panics_total = IntCounter::new(
            "agg_health_cycle_panics_total",
            "Total number of evaluation cycles that panicked",
        )
        .unwrap();

        registry
            .register(Box::new(health_checks_total.clone()))
            .unwrap();
        registry.register(Box::new(healthy.clone())).unwrap();
        registry
            .register(Box::new(master_aggregator.clone()))
            .unwrap();
        registry
            .register(Box::new(query_duration_seconds.clone()))
            .unwrap();
        registry
            .register(Box::new(query_timeouts_total.clone()))
            .unwrap();
        registry
            .register(Box::new(connection_kills_total.clone()))
            .unwrap();
        registry
            .register(Box::new(cycle_panics_total.clone()))
            .unwrap();

        Self {
            registry,
            health_checks_total,
            healthy,
            master_aggregator,
            query_duration_seconds,
            query_timeouts_total,
            connection_kills_total,
            cycle_panics_total,
        }
    }

    /// Record a completed diagnostic query
    pub fn record_query(&self, step: &str, duration_secs: f64) {
        self.query_duration_seconds
            .with_label_values(&[step])
            .observe(duration_secs);
    }

    pub fn record_query_timeout(&self, step: &str) {
        self.query_timeouts_total.with_label_values(&[step]).inc();
    }

    pub fn record_kill(&self, result: &str) {
        self.connection_kills_total
            .with_label_values(&[result])
            .inc();
    }

    /// Record the verdict of a health cycle
    pub fn record_health_check(&self, healthy: bool) {
        let result = if healthy { "healthy" } else { "unhealthy" };
        self.health_checks_total.with_label_values(&[result]).inc();
        self.healthy.set(healthy as i64);
    }

    pub fn set_master_aggregator(&self, is_master: bool) {
        self.master_aggregator.set(is_master as i64);
    }

    pub fn record_cycle_panic(&self) {
        self.cycle_panics_total.inc();
    }

    /// Get metrics as Prometheus text format
    pub fn gather(&self) -> String {
        use prometheus::Encoder;
        let encoder = prometheus::TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
            debug!(error = %e, "Failed to encode metrics");
        }
        String::from_utf8_lossy(&buffer).into_owned()
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

async fn handle_request(
    req: Request<hyper::body::Incoming>,
) -> Result<Response<Full<Bytes>>, Infallible> {
    let (status, body) = match req.uri().path() {
        "/metrics" => (StatusCode::OK, metrics().gather()),
        _ => (StatusCode::NOT_FOUND, "Not Found\n".to_string()),
    };
    let mut response = Response::new(Full::new(Bytes::from(body)));
    *response.status_mut() = status;
    response.headers_mut().insert(
        hyper::header::CONTENT_TYPE,
        hyper::header::HeaderValue::from_static("text/plain; version=0.0.4; charset=utf-8"),
    );
    Ok(response)
}

/// Serve `/metrics` until `shutdown` fires
pub async fn start_metrics_server(addr: &str, shutdown: CancellationToken) -> anyhow::Result<()> {
    let addr: SocketAddr = addr.parse()?;
    let listener = TcpListener::bind(addr).await?;
    info!(addr = %addr, "Metrics server listening");
    serve_metrics(listener, shutdown).await;
    Ok(())
}

async fn serve_metrics(listener: TcpListener, shutdown: CancellationToken) {
    loop {
        let (stream, _) = tokio::select! {
            _ = shutdown.cancelled() => {
                info!("Metrics server shutting down");
                return;
            }
            accepted = listener.accept() => match accepted {
                Ok(v) => v,
                Err(e) => {
                    debug!(error = %e, "Failed to accept metrics connection");
                    continue;
                }
            },
        };
        let io = TokioIo::new(stream);

        tokio::spawn(async move {
            if let Err(e) = http1::Builder::new()
                .serve_connection(io, service_fn(handle_request))
                .await
            {
                debug!(error = %e, "Metrics connection error");
            }
        });
    }
}
