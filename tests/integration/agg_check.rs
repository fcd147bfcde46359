//! /agg_check against a live aggregator

use std::time::{Duration, Instant};

use crate::{get_aggregator_config, http_get, http_request, skip_if_not_enabled};

#[test]
fn test_agg_check_matches_cluster_state() {
    skip_if_not_enabled!();

    let config = get_aggregator_config();
    let offline = config
        .query_int(
            "select count(*) from information_schema.DISTRIBUTED_PARTITIONS \
             where role = 'Master' and is_offline = 1",
        )
        .unwrap_or(0);

    let response = http_get("/agg_check");
    if offline == 0 {
        assert_eq!(response.status, 200, "body: {}", response.body);
        assert_eq!(response.body, "OK - Aggregator Healthy\n");
    } else {
        assert_eq!(response.status, 503);
        assert!(response.body.contains("unavailable master partitions"));
    }
}

#[test]
fn test_agg_check_answers_quickly() {
    skip_if_not_enabled!();

    // Served from cached state, never from a live query
    for _ in 0..20 {
        let start = Instant::now();
        let response = http_get("/agg_check");
        assert!(response.status == 200 || response.status == 503);
        assert!(start.elapsed() < Duration::from_millis(500));
    }
}

#[test]
fn test_unhealthy_body_carries_cause() {
    skip_if_not_enabled!();

    let response = http_get("/agg_check");
    if response.status == 503 {
        assert!(response.body.starts_with("Unavailable - "));
        assert!(response.body.len() > "Unavailable - \n".len());
    }
}

#[test]
fn test_unknown_path_is_not_found() {
    skip_if_not_enabled!();

    let response = http_get("/health");
    assert_eq!(response.status, 404);
    assert_eq!(response.body, "Not Found\n");

    let response = http_request("POST", "/agg_check");
    assert_eq!(response.status, 501);
}

#[test]
fn test_no_monitoring_sessions_leak() {
    skip_if_not_enabled!();

    let config = get_aggregator_config();
    let count_sql = "select count(*) from information_schema.processlist \
                     where info like '%mntr_select%' and info not like '%processlist%'";

    // Several cycles' worth of checks must not accumulate sessions
    let before = config.query_int(count_sql).unwrap_or(0);
    std::thread::sleep(Duration::from_secs(5));
    let after = config.query_int(count_sql).unwrap_or(0);

    assert!(before <= 2, "stale monitoring sessions: {}", before);
    assert!(after <= 2, "stale monitoring sessions: {}", after);
}
