//! Evaluation loop
//!
//! One background task runs a health evaluation, then the role evaluation
//! when the node is healthy, then sleeps for the check interval. Cycles never
//! overlap, and a panicking cycle is turned into an unhealthy verdict instead
//! of killing the loop and leaving a stale verdict behind.

use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::config::CheckConfig;
use crate::metrics::metrics;
use crate::runner::QueryRunner;

use super::error::CheckError;
use super::evaluator::HealthEvaluator;
use super::master::RoleEvaluator;
use super::state::HealthState;

/// Owner of the evaluation loop
pub struct HealthChecker {
    state: Arc<HealthState>,
    health: HealthEvaluator,
    /// `None` when role checking is disabled
    role: Option<RoleEvaluator>,
    interval: Duration,
}

impl HealthChecker {
    pub fn new(state: Arc<HealthState>, runner: QueryRunner, config: &CheckConfig) -> Self {
        let timeout = config.query_timeout();
        let role = config
            .role_check_enabled
            .then(|| RoleEvaluator::new(runner.clone(), timeout));

        Self {
            state,
            health: HealthEvaluator::new(runner, timeout),
            role,
            interval: config.interval(),
        }
    }

    /// Spawn the loop; it exits when `shutdown` is cancelled
    pub fn start(self: Arc<Self>, shutdown: CancellationToken) -> JoinHandle<()> {
        info!(
            interval_ms = self.interval.as_millis() as u64,
            role_check = self.role.is_some(),
            "Health checker started"
        );

        tokio::spawn(async move {
            loop {
                // Stuck queries must not hold up shutdown
                tokio::select! {
                    _ = shutdown.cancelled() => {
                        info!("Health checker shutting down mid-cycle");
                        break;
                    }
                    _ = self.run_guarded_cycle() => {}
                }

                tokio::select! {
                    _ = shutdown.cancelled() => {
                        info!("Health checker shutting down");
                        break;
                    }
                    _ = tokio::time::sleep(self.interval) => {}
                }
            }
        })
    }

    /// Run one cycle, converting a panic into an unhealthy verdict
    pub async fn run_guarded_cycle(&self) {
        self.guarded(self.run_cycle()).await
    }

    /// Run `cycle`; if it panics, record `CheckError::Internal`.
    ///
    /// Panics inside a query worker never get here: the runner reports them
    /// as a failed step. This catches panics in the evaluation code itself.
    async fn guarded<F>(&self, cycle: F)
    where
        F: Future<Output = ()>,
    {
        if let Err(panic) = AssertUnwindSafe(cycle).catch_unwind().await {
            let message = panic_message(&panic);
            metrics().record_cycle_panic();
            error!(error = %message, "Health check cycle panicked");
            let result = Err(CheckError::Internal(message));
            self.state.record_health(&result);
            metrics().record_health_check(false);
        }
    }

    /// One full evaluation cycle
    pub async fn run_cycle(&self) {
        let result = self.health.evaluate().await;
        let changed = self.state.record_health(&result);
        metrics().record_health_check(result.is_ok());

        match &result {
            Ok(()) => info!("HealthCheck: Healthy"),
            Err(e) => error!(
                last_error = %e,
                degraded = e.is_state_violation(),
                "HealthCheck: Unhealthy"
            ),
        }
        if changed {
            info!(healthy = result.is_ok(), "Health verdict changed");
        }

        // Role is meaningless on an unhealthy node; keep the last verdict
        let Some(role) = &self.role else {
            return;
        };
        if result.is_err() {
            debug!("Skipping master aggregator check on unhealthy node");
            return;
        }

        let role_result = role.evaluate().await;
        let is_master = matches!(role_result, Ok(true));
        if self.state.record_role(&role_result) {
            info!(is_master, "Master aggregator verdict changed");
        }
        metrics().set_master_aggregator(is_master);

        match &role_result {
            Ok(true) => info!("MA Check: This node is MA"),
            Ok(false) => info!("MA Check: This node is not MA"),
            Err(e) => error!(last_error = %e, "MA Check: This node is not MA"),
        }
    }
}

fn panic_message(panic: &Box<dyn Any + Send>) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "panic".to_string()
    }
}
