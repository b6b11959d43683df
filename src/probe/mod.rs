//! Probe module: the HTTP(S) check and the worker pool that runs it.

mod http;
mod worker;

pub use http::*;
pub use worker::*;

use chrono::{DateTime, Utc};
use std::time::Instant;
use thiserror::Error;

/// Probe error types.
#[derive(Error, Debug)]
pub enum ProbeError {
    #[error("probe timed out: {0}")]
    Timeout(String),
    #[error("network error: {0}")]
    Network(String),
    #[error("invalid configuration: {0}")]
    Config(String),
}

/// One scheduled check for one monitor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Job {
    pub monitor_id: String,
    pub url: String,
}

/// Raw outcome of a check, produced by a worker.
#[derive(Debug, Clone)]
pub struct CheckResult {
    pub monitor_id: String,
    pub url: String,
    pub up: bool,
    /// Milliseconds from request start to body drained.
    pub latency_ms: i64,
    /// Request start, UTC.
    pub timestamp: DateTime<Utc>,
    /// 0 when no response was received.
    pub status_code: u16,
    pub error: Option<String>,
    /// Filled in by the result processor.
    pub is_degraded: bool,
    pub cert_expiry: Option<DateTime<Utc>>,
}

/// Run the check for a job. Network failures become a down result.
pub async fn run_check(client: &reqwest::Client, job: &Job) -> CheckResult {
    let timestamp = Utc::now();
    let start = Instant::now();
    let outcome = run_http_probe(client, &job.url).await;
    let latency_ms = start.elapsed().as_millis() as i64;

    let mut result = CheckResult {
        monitor_id: job.monitor_id.clone(),
        url: job.url.clone(),
        up: false,
        latency_ms,
        timestamp,
        status_code: 0,
        error: None,
        is_degraded: false,
        cert_expiry: None,
    };

    match outcome {
        Ok(o) => {
            result.up = o.status_code < 400;
            result.status_code = o.status_code;
            result.cert_expiry = o.cert_expiry;
        }
        Err(e) => {
            result.error = Some(e.to_string());
        }
    }

    result
}
