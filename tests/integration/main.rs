//! Integration test entry point
//!
//! Run with: AGG_HEALTH_RUN_INTEGRATION_TESTS=1 cargo test --test integration
//!
//! Requires a SingleStore aggregator and a running `agg-health` pointed at it.
//!
//! Environment variables:
//! - AGG_HEALTH_RUN_INTEGRATION_TESTS: Set to "1" to enable integration tests
//! - AGG_HEALTH_TEST_DB_HOST: Aggregator host (default: 127.0.0.1)
//! - AGG_HEALTH_TEST_DB_PORT: Aggregator port (default: 3306)
//! - AGG_HEALTH_TEST_DB_USER: Aggregator user (default: root)
//! - AGG_HEALTH_TEST_DB_PASS: Aggregator password (default: empty)
//! - AGG_HEALTH_TEST_HTTP_ADDR: Status server address (default: 127.0.0.1:3309)
//! - AGG_HEALTH_TEST_ROLE_CHECK: Set to "0" if the checker runs without /ma_check

mod agg_check;
mod ma_check;

use mysql::prelude::*;
use mysql::{Conn, OptsBuilder};
use std::env;
use std::io::{Read, Write};
use std::net::TcpStream;
use std::time::Duration;

/// Check if integration tests should run
pub fn should_run_integration_tests() -> bool {
    env::var("AGG_HEALTH_RUN_INTEGRATION_TESTS")
        .map(|v| v == "1")
        .unwrap_or(false)
}

/// Skip test if integration tests are not enabled
#[macro_export]
macro_rules! skip_if_not_enabled {
    () => {
        if !crate::should_run_integration_tests() {
            eprintln!("Skipping integration test (set AGG_HEALTH_RUN_INTEGRATION_TESTS=1 to run)");
            return;
        }
    };
}

/// Aggregator connection config
#[derive(Debug, Clone)]
pub struct AggregatorTestConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
}

/// Get aggregator connection config from environment
pub fn get_aggregator_config() -> AggregatorTestConfig {
    AggregatorTestConfig {
        host: env::var("AGG_HEALTH_TEST_DB_HOST").unwrap_or_else(|_| "127.0.0.1".to_string()),
        port: env::var("AGG_HEALTH_TEST_DB_PORT")
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or(3306),
        user: env::var("AGG_HEALTH_TEST_DB_USER").unwrap_or_else(|_| "root".to_string()),
        password: env::var("AGG_HEALTH_TEST_DB_PASS").unwrap_or_default(),
    }
}

impl AggregatorTestConfig {
    /// Open a direct connection to the aggregator
    pub fn conn(&self) -> Conn {
        let opts = OptsBuilder::new()
            .ip_or_hostname(Some(&self.host))
            .tcp_port(self.port)
            .user(Some(&self.user))
            .pass(Some(&self.password));
        Conn::new(opts).expect("Failed to connect to aggregator")
    }

    /// First column of the first row as an integer
    pub fn query_int(&self, sql: &str) -> Option<i64> {
        self.conn()
            .query_first(sql)
            .expect("Diagnostic query should succeed")
    }
}

/// Status server address from environment
pub fn status_addr() -> String {
    env::var("AGG_HEALTH_TEST_HTTP_ADDR").unwrap_or_else(|_| "127.0.0.1:3309".to_string())
}

pub fn role_check_enabled() -> bool {
    env::var("AGG_HEALTH_TEST_ROLE_CHECK")
        .map(|v| v != "0")
        .unwrap_or(true)
}

/// Minimal HTTP/1.1 response
#[derive(Debug)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

/// Send a request to the status server and read the whole response
pub fn http_request(method: &str, path: &str) -> HttpResponse {
    let mut stream = TcpStream::connect(status_addr()).expect("Failed to connect to status server");
    stream
        .set_read_timeout(Some(Duration::from_secs(5)))
        .expect("set_read_timeout");
    let request = format!(
        "{} {} HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n",
        method, path
    );
    stream.write_all(request.as_bytes()).expect("Failed to send request");

    let mut raw = String::new();
    stream.read_to_string(&mut raw).expect("Failed to read response");

    let (head, body) = raw.split_once("\r\n\r\n").expect("Malformed HTTP response");
    let status = head
        .split_whitespace()
        .nth(1)
        .and_then(|s| s.parse().ok())
        .expect("Missing status code");
    HttpResponse {
        status,
        body: body.to_string(),
    }
}

pub fn http_get(path: &str) -> HttpResponse {
    http_request("GET", path)
}
