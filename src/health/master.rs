//! Master aggregator detection
//!
//! A node is the master aggregator when its `aggregator_id()` matches the
//! `node_id` flagged `MASTER_AGGREGATOR = 1` in `information_schema.aggregators`.

use std::time::Duration;

use tracing::debug;

use crate::runner::QueryRunner;

use super::error::{parse_int, CheckError};
use super::evaluator::run_step;
use super::queries;

/// Evaluator for the master aggregator verdict
pub struct RoleEvaluator {
    runner: QueryRunner,
    query_timeout: Duration,
}

impl RoleEvaluator {
    pub fn new(runner: QueryRunner, query_timeout: Duration) -> Self {
        Self {
            runner,
            query_timeout,
        }
    }

    /// `Ok(true)` if this node is the master aggregator.
    ///
    /// `Ok(false)` is a clean answer; errors are reserved for failed queries.
    pub async fn evaluate(&self) -> Result<bool, CheckError> {
        let query = &queries::MASTER_AGGREGATOR_ID;
        let master_id = parse_int(
            query,
            run_step(&self.runner, query, self.query_timeout).await?,
        )?;

        let query = &queries::AGGREGATOR_ID;
        let own_id = parse_int(
            query,
            run_step(&self.runner, query, self.query_timeout).await?,
        )?;

        debug!(master_id, own_id, "Compared aggregator ids");
        Ok(master_id == own_id)
    }
}
