//! Per-monitor state tracker and check loop.

use super::fatigue::{Fatigue, NotificationPolicy};
use crate::db::{self, CheckRecord};
use crate::notify::EventType;
use crate::probe::Job;

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};

/// Checks kept in the rolling history.
pub const HISTORY_CAPACITY: usize = 50;

/// One entry of the rolling history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HistoryEntry {
    pub up: bool,
    pub latency_ms: i64,
    pub timestamp: DateTime<Utc>,
    pub status_code: u16,
    pub degraded: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Last recorded status of a monitor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LastStatus {
    pub up: bool,
    pub latency_ms: i64,
    pub has_history: bool,
    pub degraded: bool,
}

/// Read-only view of a monitor, as served to API consumers.
#[derive(Debug, Clone, Serialize)]
pub struct MonitorSnapshot {
    pub id: String,
    pub group_id: String,
    pub name: String,
    pub url: String,
    pub interval: u64,
    pub up: bool,
    pub latency_ms: i64,
    pub degraded: bool,
    pub flapping: bool,
    pub has_history: bool,
    pub history: Vec<HistoryEntry>,
}

struct State {
    name: String,
    group_id: String,
    history: VecDeque<HistoryEntry>,
    last_up: bool,
    last_latency: i64,
    last_degraded: bool,
    has_history: bool,
    fatigue: Fatigue,
}

/// In-memory tracker for one active monitor.
///
/// URL and interval are fixed for the tracker's lifetime; the manager replaces
/// the tracker when either changes.
pub struct Monitor {
    id: String,
    url: String,
    interval: Duration,
    created_at: DateTime<Utc>,
    capacity: usize,
    state: RwLock<State>,
    stop_tx: broadcast::Sender<()>,
    stop_rx: Mutex<Option<broadcast::Receiver<()>>>,
}

impl Monitor {
    pub fn new(config: &db::Monitor, policy: NotificationPolicy) -> Self {
        Self::with_capacity(config, policy, HISTORY_CAPACITY)
    }

    pub fn with_capacity(config: &db::Monitor, policy: NotificationPolicy, capacity: usize) -> Self {
        let (stop_tx, stop_rx) = broadcast::channel(1);
        let capacity = capacity.max(1);

        Self {
            id: config.id.clone(),
            url: config.url.clone(),
            interval: Duration::from_secs(config.effective_interval() as u64),
            created_at: config.created_at,
            capacity,
            state: RwLock::new(State {
                name: config.name.clone(),
                group_id: config.group_id.clone(),
                history: VecDeque::with_capacity(capacity),
                last_up: false,
                last_latency: 0,
                last_degraded: false,
                has_history: false,
                fatigue: Fatigue::new(policy),
            }),
            stop_tx,
            stop_rx: Mutex::new(Some(stop_rx)),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, State> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, State> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn name(&self) -> String {
        self.read().name.clone()
    }

    pub fn group_id(&self) -> String {
        self.read().group_id.clone()
    }

    /// Refresh display details that do not need a restart.
    pub fn update_details(&self, name: &str, group_id: &str) {
        let mut state = self.write();
        state.name = name.to_string();
        state.group_id = group_id.to_string();
    }

    /// Append a check to the history and update the last-known status.
    pub fn record_result(
        &self,
        up: bool,
        latency_ms: i64,
        timestamp: DateTime<Utc>,
        status_code: u16,
        error: Option<String>,
        degraded: bool,
    ) {
        let mut state = self.write();
        if state.history.len() >= self.capacity {
            state.history.pop_front();
        }
        state.history.push_back(HistoryEntry {
            up,
            latency_ms,
            timestamp,
            status_code,
            degraded,
            error,
        });
        state.last_up = up;
        state.last_latency = latency_ms;
        state.last_degraded = degraded;
        state.has_history = true;
    }

    pub fn last_status(&self) -> LastStatus {
        let state = self.read();
        LastStatus {
            up: state.last_up,
            latency_ms: state.last_latency,
            has_history: state.has_history,
            degraded: state.last_degraded,
        }
    }

    /// Rolling history, oldest first.
    pub fn history(&self) -> Vec<HistoryEntry> {
        self.read().history.iter().cloned().collect()
    }

    pub fn snapshot(&self) -> MonitorSnapshot {
        let state = self.read();
        MonitorSnapshot {
            id: self.id.clone(),
            group_id: state.group_id.clone(),
            name: state.name.clone(),
            url: self.url.clone(),
            interval: self.interval.as_secs(),
            up: state.last_up,
            latency_ms: state.last_latency,
            degraded: state.last_degraded,
            flapping: state.fatigue.is_flapping(),
            has_history: state.has_history,
            history: state.history.iter().cloned().collect(),
        }
    }

    /// Replay persisted checks (newest first, as the store returns them).
    pub fn hydrate(&self, checks: &[CheckRecord], latency_threshold: i64) {
        for check in checks.iter().rev() {
            let up = check.status.is_up();
            self.record_result(
                up,
                check.latency,
                check.timestamp,
                check.status_code,
                None,
                up && check.latency > latency_threshold,
            );
        }

        let mut state = self.write();
        let replayed: Vec<(bool, bool)> = state.history.iter().map(|h| (h.up, h.degraded)).collect();
        state.fatigue.hydrate(&replayed);
    }

    // --- Fatigue ---

    pub fn policy(&self) -> NotificationPolicy {
        self.read().fatigue.policy().clone()
    }

    pub fn set_policy(&self, policy: NotificationPolicy) {
        self.write().fatigue.set_policy(policy);
    }

    pub fn increment_down(&self) -> bool {
        self.write().fatigue.increment_down()
    }

    pub fn reset_down(&self) -> bool {
        self.write().fatigue.reset_down()
    }

    pub fn increment_degraded(&self) -> bool {
        self.write().fatigue.increment_degraded()
    }

    pub fn reset_degraded(&self) -> bool {
        self.write().fatigue.reset_degraded()
    }

    pub fn should_notify(&self, event_type: EventType, now: DateTime<Utc>) -> bool {
        self.read().fatigue.should_notify(event_type, now)
    }

    pub fn mark_notified(&self, event_type: EventType, now: DateTime<Utc>) {
        self.write().fatigue.mark_notified(event_type, now);
    }

    pub fn is_flapping(&self) -> bool {
        self.read().fatigue.is_flapping()
    }

    /// Re-evaluate flapping over the current history. Returns
    /// `(is_flapping, changed)`.
    pub fn evaluate_flapping(&self) -> (bool, bool) {
        let mut state = self.write();
        let ups: Vec<bool> = state.history.iter().map(|h| h.up).collect();
        state.fatigue.evaluate_flapping(&ups)
    }

    // --- Loop ---

    /// Spawn the check loop. Has no effect if it was already started.
    pub fn start(&self, jobs: mpsc::Sender<Job>) {
        let stop_rx = self
            .stop_rx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let Some(stop_rx) = stop_rx else {
            return;
        };

        let job = Job {
            monitor_id: self.id.clone(),
            url: self.url.clone(),
        };
        let first_tick = align_delay(self.created_at, self.interval, Utc::now());
        tokio::spawn(run_check_loop(job, self.interval, first_tick, jobs, stop_rx));
    }

    /// Stop the check loop.
    pub fn stop(&self) {
        let _ = self.stop_tx.send(());
    }
}

/// Time from `now` until the next multiple of `interval` after `created_at`.
/// Zero when `now` is exactly on a tick.
pub fn align_delay(created_at: DateTime<Utc>, interval: Duration, now: DateTime<Utc>) -> Duration {
    let interval_ms = interval.as_millis() as i64;
    if interval_ms <= 0 {
        return Duration::ZERO;
    }

    let elapsed_ms = (now - created_at).num_milliseconds();
    if elapsed_ms <= 0 {
        return Duration::ZERO;
    }

    match elapsed_ms % interval_ms {
        0 => Duration::ZERO,
        rem => Duration::from_millis((interval_ms - rem) as u64),
    }
}

async fn run_check_loop(
    job: Job,
    interval: Duration,
    first_tick: Duration,
    jobs: mpsc::Sender<Job>,
    mut stop_rx: broadcast::Receiver<()>,
) {
    tracing::debug!(monitor_id = %job.monitor_id, "Starting check loop every {:?}", interval);

    // First check runs immediately; later ones follow the creation-time grid
    if !enqueue(&jobs, &job) {
        return;
    }

    let first_tick = if first_tick.is_zero() { interval } else { first_tick };
    let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + first_tick, interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = stop_rx.recv() => {
                break;
            }
            _ = ticker.tick() => {
                if !enqueue(&jobs, &job) {
                    break;
                }
            }
        }
    }

    tracing::debug!(monitor_id = %job.monitor_id, "Check loop stopped");
}

/// Returns false once the job queue has been closed.
fn enqueue(jobs: &mpsc::Sender<Job>, job: &Job) -> bool {
    match jobs.try_send(job.clone()) {
        Ok(()) => true,
        Err(mpsc::error::TrySendError::Full(_)) => {
            tracing::warn!(monitor_id = %job.monitor_id, "Job queue full, skipping check");
            true
        }
        Err(mpsc::error::TrySendError::Closed(_)) => false,
    }
}
