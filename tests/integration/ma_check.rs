//! /ma_check against a live aggregator

use crate::{get_aggregator_config, http_get, role_check_enabled, skip_if_not_enabled};

#[test]
fn test_ma_check_matches_aggregator_ids() {
    skip_if_not_enabled!();
    if !role_check_enabled() {
        eprintln!("Skipping: role check disabled");
        return;
    }

    let config = get_aggregator_config();
    let master_id =
        config.query_int("select node_id from information_schema.aggregators where MASTER_AGGREGATOR = 1");
    let own_id = config.query_int("select aggregator_id()");

    let health = http_get("/agg_check");
    let response = http_get("/ma_check");

    if health.status == 200 && master_id.is_some() && master_id == own_id {
        assert_eq!(response.status, 200, "body: {}", response.body);
        assert_eq!(response.body, "OK - Master Aggregator\n");
    } else if master_id != own_id {
        assert_eq!(response.status, 503);
        assert!(response.body.starts_with("Unavailable - "));
    }
}

#[test]
fn test_ma_check_absent_when_disabled() {
    skip_if_not_enabled!();
    if role_check_enabled() {
        eprintln!("Skipping: role check enabled");
        return;
    }

    let response = http_get("/ma_check");
    assert_eq!(response.status, 404);
}
