//! Diagnostic statements run against the aggregator
//!
//! Every statement carries the `/*mntr_select*/` tag so monitoring traffic can
//! be told apart in the aggregator's process list and plan cache.

use crate::runner::Query;

pub const CONNECTION_CHECK: Query = Query::new(
    "Step 1: Aggregator connection check",
    "select 1 /*mntr_select*/;",
);

pub const ROLE_CHECK: Query = Query::new(
    "Step 2: Aggregator role check",
    "select aggregator_id()/*mntr_select*/;",
);

pub const UNAVAILABLE_MASTER_PARTITIONS: Query = Query::new(
    "Step 3: Check the count of unavailable master partitions.",
    "select count(*) from information_schema.DISTRIBUTED_PARTITIONS where role = 'Master' and is_offline = 1/*mntr_select*/;",
);

pub const CONSENSUS_ENABLED: Query = Query::new(
    "Step 4: Select the consensus_enabled values.",
    "select @@consensus_enabled/*mntr_select*/;",
);

pub const CONSENSUS_CONNECTING: Query = Query::new(
    "Step 4-1: Counting the connecting nodes.",
    "select count(*) from information_schema.lmv_consensus_nodes where ROLE != 'Non-voting Member' and CONNECTION = 'Connecting'/*mntr_select*/;",
);

pub const CONSENSUS_CONNECTED: Query = Query::new(
    "Step 4-2: Counting the connected nodes.",
    "select count(*) from information_schema.lmv_consensus_nodes where ROLE != 'Non-voting Member' and CONNECTION = 'Connected'/*mntr_select*/;",
);

pub const MASTER_AGGREGATOR_ID: Query = Query::new(
    "Step 1: Master Aggregator id check",
    "select node_id from information_schema.aggregators where MASTER_AGGREGATOR = 1/*mntr_select*/;",
);

pub const AGGREGATOR_ID: Query = Query::new(
    "Step 2: Aggregator id check",
    "select aggregator_id()/*mntr_select*/;",
);

/// Value returned by the connection check on a working session
pub const CONNECTION_OK: &str = "1";

/// `aggregator_id()` on a leaf node
pub const NOT_AN_AGGREGATOR: &str = "-1";

/// `@@consensus_enabled` when consensus is on
pub const CONSENSUS_ON: &str = "1";
