//! Forced termination of server-side sessions
//!
//! When a diagnostic query blows its deadline the worker's socket is dropped,
//! but the aggregator may keep executing the statement. The reclaimer opens a
//! separate administrative session and issues `KILL <id>` so the server frees
//! the session too.

use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use crate::db::{ConnectionError, ConnectionHandle, Connector};
use crate::metrics::metrics;

/// Why a reclaim attempt did not go through. Logged, never propagated.
#[derive(Debug, thiserror::Error)]
pub enum ReclaimError {
    #[error("admin connection failed: {0}")]
    Connect(ConnectionError),
    #[error("KILL rejected: {0}")]
    Kill(ConnectionError),
    #[error("KILL did not complete within {0:?}")]
    TimedOut(Duration),
}

/// Kills sessions through short-lived administrative connections
#[derive(Clone)]
pub struct Reclaimer {
    connector: Arc<dyn Connector>,
    timeout: Duration,
}

impl Reclaimer {
    pub fn new(connector: Arc<dyn Connector>, timeout: Duration) -> Self {
        Self { connector, timeout }
    }

    /// Best-effort `KILL <handle>`.
    ///
    /// Never fails: a session that is already gone, an unreachable server or a
    /// hung admin connection are all logged and swallowed. Returns within the
    /// configured reclaim timeout.
    pub async fn kill(&self, handle: ConnectionHandle) {
        match tokio::time::timeout(self.timeout, self.try_kill(handle)).await {
            Ok(Ok(())) => {
                metrics().record_kill("ok");
                info!(connection_id = %handle, "Killed connection");
            }
            Ok(Err(e)) => {
                metrics().record_kill("failed");
                warn!(connection_id = %handle, error = %e, "Failed to kill connection");
            }
            Err(_) => {
                // Dropping the future above released the admin socket
                metrics().record_kill("timeout");
                let e = ReclaimError::TimedOut(self.timeout);
                warn!(connection_id = %handle, error = %e, "Failed to kill connection");
            }
        }
    }

    async fn try_kill(&self, handle: ConnectionHandle) -> Result<(), ReclaimError> {
        let mut admin = self
            .connector
            .connect()
            .await
            .map_err(ReclaimError::Connect)?;

        let result = admin
            .execute(&format!("KILL {}", handle))
            .await
            .map_err(ReclaimError::Kill);

        admin.close().await;
        result
    }
}

#[cfg(test)]
mod tests {
    use std::time::Instant;

    use super::*;
    use crate::db::mock::{ConnectMode, MockConnector, Reply};

    fn reclaimer(mock: &MockConnector, timeout: Duration) -> Reclaimer {
        Reclaimer::new(Arc::new(mock.clone()), timeout)
    }

    #[tokio::test]
    async fn test_kill_issues_statement_and_closes_admin_session() {
        let mock = MockConnector::new();
        reclaimer(&mock, Duration::from_secs(1))
            .kill(ConnectionHandle(77))
            .await;

        assert_eq!(mock.kills(), vec!["KILL 77".to_string()]);
        assert_eq!(mock.opened(), 1);
        assert_eq!(mock.closed(), 1);
        assert_eq!(mock.dropped(), 1);
    }

    #[tokio::test]
    async fn test_kill_unknown_session_is_swallowed() {
        let mock = MockConnector::new();
        mock.kill_reply(Reply::Fail("(1094, 'Unknown thread id: 77')".into()));

        // Killing an already-closed session twice must not panic
        let r = reclaimer(&mock, Duration::from_secs(1));
        r.kill(ConnectionHandle(77)).await;
        r.kill(ConnectionHandle(77)).await;

        assert_eq!(mock.kills().len(), 2);
        assert_eq!(mock.closed(), 2);
    }

    #[tokio::test]
    async fn test_kill_connect_failure_is_swallowed() {
        let mock = MockConnector::new();
        mock.connect_mode(ConnectMode::Fail("connection refused".into()));

        reclaimer(&mock, Duration::from_secs(1))
            .kill(ConnectionHandle(5))
            .await;
        assert!(mock.kills().is_empty());
    }

    #[tokio::test]
    async fn test_kill_is_bounded_when_admin_connection_hangs() {
        let mock = MockConnector::new();
        mock.kill_reply(Reply::Hang);

        let start = Instant::now();
        reclaimer(&mock, Duration::from_millis(50))
            .kill(ConnectionHandle(9))
            .await;

        assert!(start.elapsed() < Duration::from_secs(2));
        // The abandoned admin session was dropped, not leaked
        assert_eq!(mock.dropped(), 1);
    }
}
