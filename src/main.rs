mod config;
mod db;
mod health;
mod metrics;
mod protocol;
mod runner;
mod server;

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn, Level};
use tracing_subscriber::EnvFilter;

use config::Config;
use db::MysqlConnector;
use health::{HealthChecker, HealthState};
use runner::QueryRunner;
use server::StatusServer;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::builder()
                .with_default_directive(Level::INFO.into())
                .from_env_lossy(),
        )
        .init();

    // Load configuration
    let mut config = match std::env::args().nth(1) {
        Some(path) => {
            let config = config::load_config(&path)?;
            info!(path = %path, "Loaded configuration");
            config
        }
        None => load_or_default_config(),
    };
    config.apply_env_overrides()?;
    config.validate()?;

    info!(
        db = %config.database.addr(),
        user = %config.database.user,
        role_check = config.check.role_check_enabled,
        interval_ms = config.check.interval_ms,
        query_timeout_ms = config.check.query_timeout_ms,
        "Aggregator health checker configured"
    );

    let shutdown = CancellationToken::new();
    spawn_signal_handler(shutdown.clone());

    // Evaluation loop
    let connector = Arc::new(MysqlConnector::new(config.database.clone()));
    let runner = QueryRunner::new(connector, config.check.reclaim_timeout());
    let state = Arc::new(HealthState::new());
    let checker = Arc::new(HealthChecker::new(state.clone(), runner, &config.check));
    let checker_handle = checker.start(shutdown.clone());

    // Optional metrics listener
    if config.metrics.enabled {
        let addr = config.metrics.listen_addr.clone();
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            if let Err(e) = metrics::start_metrics_server(&addr, shutdown).await {
                error!(addr = %addr, error = %e, "Metrics server failed");
            }
        });
    }

    let status = StatusServer::new(state, config.check.role_check_enabled);
    let result = status.run(&config.server.addr(), shutdown.clone()).await;

    // A bind failure must not leave the loop running unobserved
    shutdown.cancel();
    if let Err(e) = checker_handle.await {
        warn!(error = %e, "Health checker task ended abnormally");
    }

    result
}

fn load_or_default_config() -> Config {
    let config_paths = ["config/agg-health.toml", "agg-health.toml"];

    for path in config_paths {
        match config::load_config(path) {
            Ok(config) => {
                info!(path = path, "Loaded configuration");
                return config;
            }
            Err(e) => {
                warn!(path = path, error = %e, "Failed to load config");
            }
        }
    }

    info!("Using default configuration");
    Config::default()
}

fn spawn_signal_handler(shutdown: CancellationToken) {
    tokio::spawn(async move {
        wait_for_signal().await;
        info!("Shutdown signal received");
        shutdown.cancel();
    });
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    let mut terminate = match signal(SignalKind::terminate()) {
        Ok(s) => s,
        Err(e) => {
            warn!(error = %e, "Failed to install SIGTERM handler");
            let _ = tokio::signal::ctrl_c().await;
            return;
        }
    };

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {}
        _ = terminate.recv() => {}
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
