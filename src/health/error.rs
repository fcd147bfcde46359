use std::time::Duration;

use crate::runner::{Query, QueryOutcome};

/// Why an evaluation did not come back clean.
///
/// The `Display` text is what the status endpoints report as the cause.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CheckError {
    /// A diagnostic query hit its deadline and its session was reclaimed
    #[error("{step} Timeout after {}", describe(.deadline))]
    TimedOut {
        step: &'static str,
        deadline: Duration,
    },

    /// The server or the connection failed the query
    #[error("{step} Failed: {message}")]
    Failed {
        step: &'static str,
        message: String,
    },

    /// A query answered with something that is not the expected shape
    #[error("{step} Failed: unexpected value {}", .value.as_deref().unwrap_or("NULL"))]
    UnexpectedValue {
        step: &'static str,
        value: Option<String>,
    },

    #[error("Step 1: Aggregator connection failed")]
    ConnectionCheck,

    #[error("Step 2: This node is not an aggregator node")]
    NotAggregator,

    #[error("Step 3: {count} unavailable master partitions")]
    UnavailablePartitions { count: i64 },

    #[error("Step 4: This cluster was demoted (connecting: {connecting}, connected: {connected})")]
    Demoted { connecting: i64, connected: i64 },

    /// The evaluation itself blew up
    #[error("unknown error : {0}")]
    Internal(String),
}

impl CheckError {
    /// True for degraded-cluster verdicts, false for failures to evaluate
    pub fn is_state_violation(&self) -> bool {
        matches!(
            self,
            CheckError::ConnectionCheck
                | CheckError::NotAggregator
                | CheckError::UnavailablePartitions { .. }
                | CheckError::Demoted { .. }
        )
    }
}

/// Convert a runner outcome into the step's value or the step's error
pub fn expect_outcome(
    query: &Query,
    deadline: Duration,
    outcome: QueryOutcome,
) -> Result<Option<String>, CheckError> {
    match outcome {
        QueryOutcome::Success(value) => Ok(value),
        QueryOutcome::Failed(message) => Err(CheckError::Failed {
            step: query.label,
            message,
        }),
        QueryOutcome::TimedOut => Err(CheckError::TimedOut {
            step: query.label,
            deadline,
        }),
    }
}

/// Parse an integer result (counts, node ids)
pub fn parse_int(query: &Query, value: Option<String>) -> Result<i64, CheckError> {
    let parsed = value.as_deref().and_then(|v| v.trim().parse::<i64>().ok());
    match parsed {
        Some(n) => Ok(n),
        None => Err(CheckError::UnexpectedValue {
            step: query.label,
            value,
        }),
    }
}

fn describe(deadline: &Duration) -> String {
    if deadline.subsec_millis() == 0 {
        format!("{} seconds", deadline.as_secs())
    } else {
        format!("{} milliseconds", deadline.as_millis())
    }
}
