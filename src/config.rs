//! Configuration module for Warden.
//!
//! Loads configuration from environment variables with sensible defaults.

use std::env;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("invalid value {value:?} for {key}")]
    Invalid { key: &'static str, value: String },
}

/// Tunables for the check engine.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Number of concurrent probe workers.
    pub worker_count: usize,
    pub job_queue_size: usize,
    pub result_queue_size: usize,
    /// Flush the check batch once it holds this many records.
    pub batch_size: usize,
    /// Flush the check batch at least this often.
    pub batch_interval: Duration,
    /// Period of the background reconcile against the store.
    pub sync_interval: Duration,
    /// Persisted checks replayed into a freshly started monitor.
    pub hydrate_depth: usize,
    /// Per-request timeout of a probe.
    pub probe_timeout: Duration,
    pub retention_interval: Duration,
    /// Capacity of the side-effect write queue.
    pub write_queue_size: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            worker_count: 50,
            job_queue_size: 1000,
            result_queue_size: 1000,
            batch_size: 50,
            batch_interval: Duration::from_secs(2),
            sync_interval: Duration::from_secs(10),
            hydrate_depth: 50,
            probe_timeout: Duration::from_secs(5),
            retention_interval: Duration::from_secs(24 * 60 * 60),
            write_queue_size: 1000,
        }
    }
}

/// Server configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// HTTP port for the control API (default: 9090)
    pub http_port: u16,
    /// Path to the SQLite database file (default: "warden.db")
    pub db_path: String,
    pub engine: EngineConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_port: 9090,
            db_path: "warden.db".to_string(),
            engine: EngineConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables.
    ///
    /// Environment variables:
    /// - `WARDEN_HTTP_PORT`: HTTP port (default: 9090)
    /// - `WARDEN_DB_PATH`: Database file path (default: "warden.db")
    /// - `WARDEN_WORKER_COUNT`: probe workers (default: 50)
    /// - `WARDEN_JOB_QUEUE_SIZE`: job queue capacity (default: 1000)
    /// - `WARDEN_RESULT_QUEUE_SIZE`: result queue capacity (default: 1000)
    pub fn load() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut cfg = Self::default();

        if let Some(port) = parse_var(&lookup, "WARDEN_HTTP_PORT")? {
            cfg.http_port = port;
        }

        if let Some(db_path) = lookup("WARDEN_DB_PATH") {
            cfg.db_path = db_path;
        }

        if let Some(workers) = parse_var::<usize, _>(&lookup, "WARDEN_WORKER_COUNT")? {
            cfg.engine.worker_count = workers.max(1);
        }

        if let Some(size) = parse_var::<usize, _>(&lookup, "WARDEN_JOB_QUEUE_SIZE")? {
            cfg.engine.job_queue_size = size.max(1);
        }

        if let Some(size) = parse_var::<usize, _>(&lookup, "WARDEN_RESULT_QUEUE_SIZE")? {
            cfg.engine.result_queue_size = size.max(1);
        }

        Ok(cfg)
    }
}

fn parse_var<T, F>(lookup: &F, key: &'static str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::Invalid { key, value }),
        None => Ok(None),
    }
}
