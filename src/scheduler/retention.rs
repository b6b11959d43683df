//! Retention sweeper for pruning old check history.

use crate::db::{DbError, Store};

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

pub const DEFAULT_RETENTION_DAYS: i64 = 30;

/// Background task deleting checks past the retention horizon.
pub struct RetentionSweeper {
    store: Arc<Store>,
}

impl RetentionSweeper {
    pub fn new(store: Arc<Store>) -> Self {
        Self { store }
    }

    /// Sweep now, then once per `period` until `stop` fires.
    pub fn start(self, period: Duration, mut stop: broadcast::Receiver<()>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);

            loop {
                tokio::select! {
                    _ = stop.recv() => break,
                    _ = interval.tick() => {
                        if let Err(e) = sweep_checks(&self.store) {
                            tracing::error!("Retention: failed to prune checks: {}", e);
                        }
                    }
                }
            }
        })
    }
}

/// The configured horizon in days. Unset or out-of-range values give the default.
pub fn retention_days(store: &Store) -> i64 {
    match store.get_setting("data_retention_days") {
        Ok(Some(v)) => v
            .trim()
            .parse::<i64>()
            .ok()
            .filter(|d| (1..=crate::db::MAX_RETENTION_DAYS).contains(d))
            .unwrap_or(DEFAULT_RETENTION_DAYS),
        Ok(None) => DEFAULT_RETENTION_DAYS,
        Err(e) => {
            tracing::warn!("Retention: failed to read setting: {}", e);
            DEFAULT_RETENTION_DAYS
        }
    }
}

/// Delete checks older than the configured horizon.
pub fn sweep_checks(store: &Store) -> Result<usize, DbError> {
    let days = retention_days(store);
    let deleted = store.prune_monitor_checks(days)?;
    if deleted > 0 {
        tracing::info!("Retention: pruned {} checks older than {} days", deleted, days);
    }
    Ok(deleted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{CheckRecord, CheckStatus};
    use chrono::{Duration as ChronoDuration, Utc};
    use tempfile::NamedTempFile;

    fn check(age_days: i64) -> CheckRecord {
        CheckRecord {
            monitor_id: "m1".to_string(),
            status: CheckStatus::Up,
            latency: 10,
            timestamp: Utc::now() - ChronoDuration::days(age_days),
            status_code: 200,
        }
    }

    #[test]
    fn test_sweep_keeps_recent_checks() {
        let tmp = NamedTempFile::new().unwrap();
        let store = Store::new(tmp.path()).unwrap();
        store.set_setting("data_retention_days", "7").unwrap();
        store
            .batch_insert_checks(&[check(10), check(8), check(3), check(0)])
            .unwrap();

        assert_eq!(sweep_checks(&store).unwrap(), 2);
        assert_eq!(store.get_monitor_checks("m1", 10).unwrap().len(), 2);
    }

    #[test]
    fn test_invalid_setting_uses_default() {
        let tmp = NamedTempFile::new().unwrap();
        let store = Store::new(tmp.path()).unwrap();
        assert_eq!(retention_days(&store), DEFAULT_RETENTION_DAYS);

        store.set_setting("data_retention_days", "0").unwrap();
        assert_eq!(retention_days(&store), DEFAULT_RETENTION_DAYS);
        store.set_setting("data_retention_days", "forever").unwrap();
        assert_eq!(retention_days(&store), DEFAULT_RETENTION_DAYS);
        store.set_setting("data_retention_days", "90").unwrap();
        assert_eq!(retention_days(&store), 90);
    }

    #[tokio::test]
    async fn test_sweeper_runs_immediately_and_stops() {
        let tmp = NamedTempFile::new().unwrap();
        let store = Arc::new(Store::new(tmp.path()).unwrap());
        store.batch_insert_checks(&[check(45), check(1)]).unwrap();

        let (stop_tx, stop_rx) = broadcast::channel(1);
        let handle = RetentionSweeper::new(store.clone()).start(Duration::from_secs(3600), stop_rx);

        // First tick fires at once
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(store.get_monitor_checks("m1", 10).unwrap().len(), 1);

        stop_tx.send(()).unwrap();
        tokio_test::assert_ok!(handle.await);
    }
}
