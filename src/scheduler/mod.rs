//! Scheduler module: the check engine.
//!
//! The [`Manager`] owns the monitor registry, the probe worker pool, the
//! result processor and the background sweeps.

mod fatigue;
mod maintenance;
mod monitor;
mod processor;
mod retention;
mod ssl;
mod writer;

pub use fatigue::*;
pub use maintenance::*;
pub use monitor::*;
pub use processor::*;
pub use retention::*;
pub use ssl::*;
pub use writer::*;

use crate::config::EngineConfig;
use crate::db::{OutageType, Store};
use crate::notify::NotificationQueue;
use crate::probe::{build_probe_client, spawn_workers, CheckResult, Job, ProbeError};

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::{broadcast, mpsc, RwLock};
use tokio::task::JoinHandle;

/// Default latency above which an up check counts as degraded, in ms.
pub const DEFAULT_LATENCY_THRESHOLD_MS: i64 = 1000;

/// User whose timezone governs the SSL alert window.
const ADMIN_USER_ID: i64 = 1;

/// Registry and cached settings, guarded by one lock.
struct Registry {
    monitors: HashMap<String, Arc<Monitor>>,
    latency_threshold: i64,
    maintenance: Vec<MaintenanceWindow>,
    timezone: Tz,
    policy: NotificationPolicy,
    /// Set once by `stop`; a later sync must not start trackers.
    stopped: bool,
}

/// Channel ends created with the manager and handed out on start.
struct Pipes {
    job_rx: mpsc::Receiver<Job>,
    result_tx: mpsc::Sender<CheckResult>,
    result_rx: mpsc::Receiver<CheckResult>,
}

/// The check engine.
pub struct Manager {
    store: Arc<Store>,
    config: EngineConfig,
    notifier: NotificationQueue,
    client: reqwest::Client,
    registry: RwLock<Registry>,
    ssl: SslTracker,
    job_tx: Mutex<Option<mpsc::Sender<Job>>>,
    pipes: Mutex<Option<Pipes>>,
    stop_tx: broadcast::Sender<()>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl Manager {
    pub fn new(
        store: Arc<Store>,
        config: EngineConfig,
        notifier: NotificationQueue,
    ) -> Result<Arc<Self>, ProbeError> {
        let client = build_probe_client(config.probe_timeout)?;
        let (job_tx, job_rx) = mpsc::channel(config.job_queue_size.max(1));
        let (result_tx, result_rx) = mpsc::channel(config.result_queue_size.max(1));
        let (stop_tx, _) = broadcast::channel(1);

        Ok(Arc::new(Self {
            store,
            config,
            notifier,
            client,
            registry: RwLock::new(Registry {
                monitors: HashMap::new(),
                latency_threshold: DEFAULT_LATENCY_THRESHOLD_MS,
                maintenance: Vec::new(),
                timezone: Tz::UTC,
                policy: NotificationPolicy::default(),
                stopped: false,
            }),
            ssl: SslTracker::new(),
            job_tx: Mutex::new(Some(job_tx)),
            pipes: Mutex::new(Some(Pipes {
                job_rx,
                result_tx,
                result_rx,
            })),
            stop_tx,
            tasks: Mutex::new(Vec::new()),
        }))
    }

    /// Start workers, the result processor and the background loops, then
    /// run the first sync.
    pub async fn start(self: &Arc<Self>) {
        let Some(pipes) = self.pipes.lock().unwrap_or_else(PoisonError::into_inner).take() else {
            tracing::warn!("Manager already started");
            return;
        };

        self.load_latency_threshold().await;

        let mut tasks = spawn_workers(
            self.config.worker_count.max(1),
            Arc::new(tokio::sync::Mutex::new(pipes.job_rx)),
            pipes.result_tx,
            self.client.clone(),
        );

        let (writer, write_rx) = StoreWriter::new(self.config.write_queue_size);
        tasks.push(spawn_store_writer(self.store.clone(), write_rx));

        let processor = ResultProcessor::new(self.clone(), writer);
        tasks.push(tokio::spawn(
            processor.run(pipes.result_rx, self.config.batch_interval),
        ));

        let sweeper = RetentionSweeper::new(self.store.clone());
        tasks.push(sweeper.start(self.config.retention_interval, self.stop_tx.subscribe()));

        self.sync().await;

        let manager = self.clone();
        let mut stop_rx = self.stop_tx.subscribe();
        tasks.push(tokio::spawn(async move {
            let period = manager.config.sync_interval;
            let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = stop_rx.recv() => break,
                    _ = ticker.tick() => manager.sync().await,
                }
            }
        }));

        self.tasks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .extend(tasks);

        tracing::info!(
            "Manager started with {} workers",
            self.config.worker_count.max(1)
        );
    }

    /// Stop every monitor, close the job queue and wait for the pipeline to
    /// drain.
    pub async fn stop(&self) {
        let _ = self.stop_tx.send(());

        {
            let mut registry = self.registry.write().await;
            registry.stopped = true;
            for (_, monitor) in registry.monitors.drain() {
                monitor.stop();
            }
        }

        // Workers exit once the queue is closed and drained
        self.job_tx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();

        let tasks: Vec<JoinHandle<()>> = self
            .tasks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain(..)
            .collect();
        for task in tasks {
            if let Err(e) = task.await {
                tracing::error!("Engine task failed: {}", e);
            }
        }

        tracing::info!("Manager stopped");
    }

    /// Stop and forget every monitor, keeping the engine running.
    pub async fn reset(&self) {
        let mut registry = self.registry.write().await;
        for (_, monitor) in registry.monitors.drain() {
            monitor.stop();
        }
        self.ssl.clear_all();
        tracing::info!("Manager reset");
    }

    /// Reconcile the registry against the store.
    pub async fn sync(&self) {
        let configs = match self.store.get_monitors() {
            Ok(m) => m,
            Err(e) => {
                tracing::error!("Sync: failed to load monitors: {}", e);
                return;
            }
        };

        let maintenance = self.load_maintenance();
        let timezone = self.load_timezone();
        let policy = NotificationPolicy::load(&self.store);

        let mut registry = self.registry.write().await;
        if registry.stopped {
            tracing::debug!("Sync: manager stopped, skipping");
            return;
        }
        let job_tx = self
            .job_tx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        if let Some(windows) = maintenance {
            registry.maintenance = windows;
        }
        registry.timezone = timezone;
        registry.policy = policy.clone();
        let latency_threshold = registry.latency_threshold;

        let mut seen = HashSet::new();
        for config in &configs {
            seen.insert(config.id.clone());

            if !config.active {
                if let Some(monitor) = registry.monitors.remove(&config.id) {
                    monitor.stop();
                    tracing::info!(monitor_id = %config.id, "Monitor paused, stopped");
                }
                self.ssl.clear(&config.id);
                continue;
            }

            let resolved = policy.for_monitor(config);
            let interval = std::time::Duration::from_secs(config.effective_interval() as u64);

            let unchanged = registry
                .monitors
                .get(&config.id)
                .filter(|m| m.url() == config.url && m.interval() == interval);
            if let Some(monitor) = unchanged {
                monitor.update_details(&config.name, &config.group_id);
                monitor.set_policy(resolved);
                continue;
            }

            if let Some(old) = registry.monitors.remove(&config.id) {
                old.stop();
                tracing::info!(monitor_id = %config.id, "Monitor config changed, restarting");
            }

            let monitor = Arc::new(Monitor::new(config, resolved));
            match self
                .store
                .get_monitor_checks(&config.id, self.config.hydrate_depth)
            {
                Ok(checks) => monitor.hydrate(&checks, latency_threshold),
                Err(e) => {
                    tracing::warn!(monitor_id = %config.id, "Failed to hydrate history: {}", e)
                }
            }
            if let Some(tx) = &job_tx {
                monitor.start(tx.clone());
            }
            tracing::info!(monitor_id = %config.id, "Started monitor {}", config.name);
            registry.monitors.insert(config.id.clone(), monitor);
        }

        let removed: Vec<String> = registry
            .monitors
            .keys()
            .filter(|id| !seen.contains(*id))
            .cloned()
            .collect();
        for id in removed {
            if let Some(monitor) = registry.monitors.remove(&id) {
                monitor.stop();
            }
            self.ssl.clear(&id);
            tracing::info!(monitor_id = %id, "Monitor deleted, stopped");
        }

        self.reconcile_outages(&registry.monitors, Utc::now());
    }

    /// Close open outages the monitor's current state no longer supports.
    fn reconcile_outages(&self, monitors: &HashMap<String, Arc<Monitor>>, now: DateTime<Utc>) {
        let outages = match self.store.get_active_outages() {
            Ok(o) => o,
            Err(e) => {
                tracing::error!("Sync: failed to load open outages: {}", e);
                return;
            }
        };

        for outage in outages {
            let Some(monitor) = monitors.get(&outage.monitor_id) else {
                continue;
            };
            let status = monitor.last_status();
            if !status.has_history {
                continue;
            }

            let stale = match outage.outage_type {
                OutageType::Down => status.up,
                OutageType::Degraded => !status.up || !status.degraded,
            };
            if !stale {
                continue;
            }

            match self.store.close_outage(&outage.monitor_id, now) {
                Ok(_) => tracing::info!(
                    monitor_id = %outage.monitor_id,
                    "Closed stale {} outage",
                    outage.outage_type.as_str()
                ),
                Err(e) => tracing::error!(
                    monitor_id = %outage.monitor_id,
                    "Failed to close stale outage: {}",
                    e
                ),
            }
        }
    }

    fn load_maintenance(&self) -> Option<Vec<MaintenanceWindow>> {
        match self.store.get_open_maintenance() {
            Ok(incidents) => Some(incidents.iter().map(MaintenanceWindow::from).collect()),
            Err(e) => {
                tracing::error!("Sync: failed to load maintenance windows: {}", e);
                None
            }
        }
    }

    fn load_timezone(&self) -> Tz {
        match self.store.get_user(ADMIN_USER_ID) {
            Ok(Some(user)) => user_timezone(&user.timezone).unwrap_or_else(|| {
                tracing::warn!("Unknown timezone {:?}, using UTC", user.timezone);
                Tz::UTC
            }),
            Ok(None) => Tz::UTC,
            Err(e) => {
                tracing::warn!("Failed to load notification timezone: {}", e);
                Tz::UTC
            }
        }
    }

    async fn load_latency_threshold(&self) {
        let stored = match self.store.get_setting("latency_threshold") {
            Ok(v) => v.and_then(|v| v.trim().parse::<i64>().ok()),
            Err(e) => {
                tracing::warn!("Failed to read latency threshold: {}", e);
                None
            }
        };
        if let Some(ms) = stored.filter(|ms| *ms > 0) {
            self.set_latency_threshold(ms).await;
        }
    }

    /// Refresh only the cached maintenance windows.
    pub async fn reload_maintenance(&self) {
        if let Some(windows) = self.load_maintenance() {
            self.registry.write().await.maintenance = windows;
        }
    }

    pub async fn get_monitor(&self, id: &str) -> Option<Arc<Monitor>> {
        self.registry.read().await.monitors.get(id).cloned()
    }

    /// Stop and drop one monitor. Returns whether it was running.
    pub async fn remove_monitor(&self, id: &str) -> bool {
        let removed = self.registry.write().await.monitors.remove(id);
        self.ssl.clear(id);
        match removed {
            Some(monitor) => {
                monitor.stop();
                true
            }
            None => false,
        }
    }

    /// Snapshot of every running monitor, ordered by name.
    pub async fn get_all(&self) -> Vec<Arc<Monitor>> {
        let mut monitors: Vec<Arc<Monitor>> =
            self.registry.read().await.monitors.values().cloned().collect();
        monitors.sort_by_key(|m| m.name());
        monitors
    }

    pub async fn set_latency_threshold(&self, ms: i64) {
        self.registry.write().await.latency_threshold = ms;
    }

    pub async fn get_latency_threshold(&self) -> i64 {
        self.registry.read().await.latency_threshold
    }

    pub async fn is_group_in_maintenance(&self, group_id: &str) -> bool {
        self.is_group_in_maintenance_at(group_id, Utc::now()).await
    }

    pub async fn is_group_in_maintenance_at(&self, group_id: &str, now: DateTime<Utc>) -> bool {
        in_maintenance(&self.registry.read().await.maintenance, group_id, now)
    }

    /// The global notification policy from the last sync.
    pub async fn notification_policy(&self) -> NotificationPolicy {
        self.registry.read().await.policy.clone()
    }

    pub fn store(&self) -> &Arc<Store> {
        &self.store
    }
}

/// Resolve a stored timezone name. An unset name means UTC.
fn user_timezone(name: &str) -> Option<Tz> {
    let name = name.trim();
    if name.is_empty() {
        return Some(Tz::UTC);
    }
    name.parse().ok()
}
