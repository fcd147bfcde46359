//! Database access for diagnostic queries
//!
//! This module provides:
//! - `Connector` / `Session`: the narrow connection interface the query runner
//!   and reclaimer work against
//! - `MysqlConnector`: the MySQL wire-protocol implementation used in production

mod connection;
#[cfg(test)]
pub mod mock;

use std::fmt;

use async_trait::async_trait;

pub use connection::{ConnectionError, MysqlConnector};

/// Server-side session identifier, the target of `KILL <id>`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionHandle(pub u64);

impl fmt::Display for ConnectionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// An open database session
#[async_trait]
pub trait Session: Send {
    /// Identifier of this session on the server
    fn handle(&self) -> ConnectionHandle;

    /// Execute a statement and return the first column of the first row.
    ///
    /// Returns `None` when the statement produced no rows or the value is NULL.
    async fn query_first_value(&mut self, sql: &str) -> Result<Option<String>, ConnectionError>;

    /// Execute a statement, discarding any result
    async fn execute(&mut self, sql: &str) -> Result<(), ConnectionError>;

    /// Politely close the session. Dropping the session also closes the socket.
    async fn close(&mut self);
}

/// Factory for fresh, independent sessions
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    async fn connect(&self) -> Result<Box<dyn Session>, ConnectionError>;
}
