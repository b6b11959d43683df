//! Fixed-size probe worker pool.
//!
//! Workers share one job receiver and one result sender. They never touch
//! monitor state; they only turn jobs into [`CheckResult`]s.

use super::{run_check, CheckResult, Job};

use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;

/// Job receiver shared by all workers.
pub type SharedJobs = Arc<Mutex<mpsc::Receiver<Job>>>;

/// Spawn `count` workers. Each exits once the job queue is closed and drained,
/// or when the result queue has no consumer left.
pub fn spawn_workers(
    count: usize,
    jobs: SharedJobs,
    results: mpsc::Sender<CheckResult>,
    client: reqwest::Client,
) -> Vec<JoinHandle<()>> {
    (0..count)
        .map(|id| {
            let jobs = jobs.clone();
            let results = results.clone();
            let client = client.clone();
            tokio::spawn(async move { run_worker(id, jobs, results, client).await })
        })
        .collect()
}

async fn run_worker(
    id: usize,
    jobs: SharedJobs,
    results: mpsc::Sender<CheckResult>,
    client: reqwest::Client,
) {
    loop {
        let job = {
            let mut rx = jobs.lock().await;
            rx.recv().await
        };

        let Some(job) = job else {
            break;
        };

        let result = run_check(&client, &job).await;
        tracing::debug!(
            monitor_id = %result.monitor_id,
            "Worker {}: {} -> up={} status={} {}ms",
            id,
            job.url,
            result.up,
            result.status_code,
            result.latency_ms
        );

        // Blocks while the result queue is full
        if results.send(result).await.is_err() {
            tracing::warn!("Worker {}: result queue closed", id);
            break;
        }
    }
    tracing::debug!("Worker {} exiting", id);
}
