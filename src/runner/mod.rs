//! Bounded query execution
//!
//! Each diagnostic query runs in its own spawned worker task that owns a fresh
//! session. The caller waits up to a deadline; past it, the server-side session
//! is killed through the [`Reclaimer`] and the worker is aborted. Aborting
//! drops the worker's socket, so a query stuck on network I/O is reclaimed
//! rather than left running in the background.

mod reclaim;

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::db::{ConnectionError, ConnectionHandle, Connector};
use crate::metrics::metrics;

pub use reclaim::Reclaimer;

/// A diagnostic statement and the step label used in error messages
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Query {
    pub label: &'static str,
    pub sql: &'static str,
}

impl Query {
    pub const fn new(label: &'static str, sql: &'static str) -> Self {
        Self { label, sql }
    }
}

/// Result of one bounded query execution
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryOutcome {
    /// First column of the first row, `None` for no row or NULL
    Success(Option<String>),
    /// The worker reported an error (connect, protocol or server error)
    Failed(String),
    /// The deadline elapsed; the session was reclaimed
    TimedOut,
}

/// Session handle published by the worker before it sends the query
type HandleSlot = Arc<Mutex<Option<ConnectionHandle>>>;

/// Runs single queries under a hard deadline
#[derive(Clone)]
pub struct QueryRunner {
    connector: Arc<dyn Connector>,
    reclaimer: Reclaimer,
}

impl QueryRunner {
    pub fn new(connector: Arc<dyn Connector>, reclaim_timeout: Duration) -> Self {
        let reclaimer = Reclaimer::new(connector.clone(), reclaim_timeout);
        Self {
            connector,
            reclaimer,
        }
    }

    /// Execute `query` and wait at most `deadline` for it.
    ///
    /// Returns within `deadline` plus the reclaim timeout. The worker is
    /// finished or aborted by the time this returns.
    pub async fn run(&self, query: &Query, deadline: Duration) -> QueryOutcome {
        let slot: HandleSlot = Arc::new(Mutex::new(None));
        let started = Instant::now();

        let mut worker: JoinHandle<Result<Option<String>, ConnectionError>> = tokio::spawn(
            Self::work(self.connector.clone(), query.sql, slot.clone()),
        );

        let outcome = match tokio::time::timeout(deadline, &mut worker).await {
            Ok(Ok(Ok(value))) => QueryOutcome::Success(value),
            Ok(Ok(Err(e))) => QueryOutcome::Failed(e.to_string()),
            Ok(Err(join_error)) => QueryOutcome::Failed(format!("worker aborted: {}", join_error)),
            Err(_) => {
                self.reclaim(query, deadline, &slot, worker).await;
                metrics().record_query_timeout(query.label);
                return QueryOutcome::TimedOut;
            }
        };

        metrics().record_query(query.label, started.elapsed().as_secs_f64());
        debug!(step = query.label, outcome = ?outcome, "Query finished");
        outcome
    }

    async fn reclaim(
        &self,
        query: &Query,
        deadline: Duration,
        slot: &HandleSlot,
        worker: JoinHandle<Result<Option<String>, ConnectionError>>,
    ) {
        warn!(
            step = query.label,
            timeout_ms = deadline.as_millis() as u64,
            "Query timeout, forcibly terminating worker connection"
        );

        let handle = *slot.lock();
        match handle {
            Some(handle) => self.reclaimer.kill(handle).await,
            None => warn!(
                step = query.label,
                "Connection id not published, cannot kill worker connection"
            ),
        }

        worker.abort();
        // Cancelled, or the worker slipped in a result after the deadline; either way it is gone
        let _ = worker.await;
    }

    /// Worker body: own session, publish its handle, run, close
    async fn work(
        connector: Arc<dyn Connector>,
        sql: &'static str,
        slot: HandleSlot,
    ) -> Result<Option<String>, ConnectionError> {
        let mut session = connector.connect().await?;
        *slot.lock() = Some(session.handle());

        let result = session.query_first_value(sql).await;
        session.close().await;
        result
    }
}
