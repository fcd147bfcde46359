//! Aggregator health evaluation
//!
//! Runs the diagnostic steps in order and stops at the first one that fails:
//! 1. Connection check (`select 1`)
//! 2. Node role (`aggregator_id()` is -1 on leaves)
//! 3. Offline master partitions
//! 4. Consensus quorum, only when `@@consensus_enabled` is on

use std::time::Duration;

use tracing::debug;

use crate::runner::{Query, QueryRunner};

use super::error::{expect_outcome, parse_int, CheckError};
use super::queries;

/// Run one diagnostic step through the bounded runner
pub(super) async fn run_step(
    runner: &QueryRunner,
    query: &Query,
    deadline: Duration,
) -> Result<Option<String>, CheckError> {
    let outcome = runner.run(query, deadline).await;
    expect_outcome(query, deadline, outcome)
}

/// Evaluator for the aggregator health verdict
pub struct HealthEvaluator {
    runner: QueryRunner,
    query_timeout: Duration,
}

impl HealthEvaluator {
    pub fn new(runner: QueryRunner, query_timeout: Duration) -> Self {
        Self {
            runner,
            query_timeout,
        }
    }

    async fn step(&self, query: &Query) -> Result<Option<String>, CheckError> {
        run_step(&self.runner, query, self.query_timeout).await
    }

    /// `Ok(())` when every applicable step passed, otherwise the first failure
    pub async fn evaluate(&self) -> Result<(), CheckError> {
        let probe = self.step(&queries::CONNECTION_CHECK).await?;
        if probe.as_deref() != Some(queries::CONNECTION_OK) {
            return Err(CheckError::ConnectionCheck);
        }

        let aggregator_id = self.step(&queries::ROLE_CHECK).await?;
        if aggregator_id.as_deref() == Some(queries::NOT_AN_AGGREGATOR) {
            return Err(CheckError::NotAggregator);
        }

        let query = &queries::UNAVAILABLE_MASTER_PARTITIONS;
        let offline = parse_int(query, self.step(query).await?)?;
        if offline > 0 {
            return Err(CheckError::UnavailablePartitions { count: offline });
        }

        self.check_consensus().await
    }

    async fn check_consensus(&self) -> Result<(), CheckError> {
        let enabled = self.step(&queries::CONSENSUS_ENABLED).await?;
        if enabled.as_deref() != Some(queries::CONSENSUS_ON) {
            debug!("Consensus disabled, skipping quorum check");
            return Ok(());
        }

        // Non-voting members are excluded from both counts, as are voters in
        // any state other than Connecting/Connected
        let query = &queries::CONSENSUS_CONNECTING;
        let connecting = parse_int(query, self.step(query).await?)?;
        let query = &queries::CONSENSUS_CONNECTED;
        let connected = parse_int(query, self.step(query).await?)?;

        if connecting > connected {
            return Err(CheckError::Demoted {
                connecting,
                connected,
            });
        }
        Ok(())
    }
}
