//! Result processor: the single consumer of check results.
//!
//! For every result it updates the monitor's tracker, detects transitions,
//! gates notifications, queues side-effect writes and batches the check row
//! for durable storage.

use super::maintenance::in_maintenance;
use super::monitor::Monitor;
use super::writer::{StoreWrite, StoreWriter};
use super::Manager;
use crate::db::{CheckRecord, CheckStatus, OutageType};
use crate::notify::{EventType, NotificationEvent};
use crate::probe::CheckResult;

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

/// Consumes check results and turns them into state, events and rows.
pub struct ResultProcessor {
    manager: Arc<Manager>,
    writer: StoreWriter,
    batch: Vec<CheckRecord>,
    batch_size: usize,
}

/// Everything one result is judged against, captured under one read lock.
struct Context {
    monitor: Arc<Monitor>,
    latency_threshold: i64,
    in_maintenance: bool,
    timezone: Tz,
    /// When the check ran, reported on notifications.
    checked_at: DateTime<Utc>,
}

impl ResultProcessor {
    pub fn new(manager: Arc<Manager>, writer: StoreWriter) -> Self {
        let batch_size = manager.config.batch_size.max(1);
        Self {
            manager,
            writer,
            batch: Vec::with_capacity(batch_size),
            batch_size,
        }
    }

    /// Drain `rx` until every sender is gone, flushing on size and on a timer.
    pub async fn run(mut self, mut rx: mpsc::Receiver<CheckResult>, flush_interval: Duration) {
        let mut ticker = tokio::time::interval(flush_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                result = rx.recv() => {
                    match result {
                        Some(r) => {
                            self.process(r, Utc::now()).await;
                            if self.batch.len() >= self.batch_size {
                                self.flush();
                            }
                        }
                        None => {
                            // Channel closed, flush remaining and exit
                            self.flush();
                            break;
                        }
                    }
                }
                _ = ticker.tick() => {
                    self.flush();
                }
            }
        }

        tracing::info!("Result processor stopped");
    }

    /// Write the pending batch. A failed batch is dropped.
    pub fn flush(&mut self) {
        if self.batch.is_empty() {
            return;
        }

        if let Err(e) = self.manager.store.batch_insert_checks(&self.batch) {
            tracing::error!("Failed to flush {} checks: {}", self.batch.len(), e);
        }

        self.batch.clear();
    }

    pub fn pending(&self) -> usize {
        self.batch.len()
    }

    /// Handle one result as of `now`.
    pub async fn process(&mut self, mut result: CheckResult, now: DateTime<Utc>) {
        let Some(ctx) = self.context(&result, now).await else {
            tracing::debug!(monitor_id = %result.monitor_id, "Result for unknown monitor, discarding");
            return;
        };
        let monitor = &ctx.monitor;

        result.is_degraded = result.up && result.latency_ms > ctx.latency_threshold;

        // Transitions are judged against the flapping state before this check
        if result.up {
            if monitor.reset_down() {
                self.on_recovered(&ctx, now);
            }
            if result.is_degraded {
                if monitor.increment_degraded() {
                    self.on_degraded(&ctx, now);
                }
            } else if monitor.reset_degraded() {
                self.on_latency_normalized(&ctx, now);
            }
        } else if monitor.increment_down() {
            self.on_down(&ctx, &result, now);
        }

        if let Some(expiry) = result.cert_expiry {
            if is_https(&result.url) {
                self.check_ssl(&ctx, expiry, now);
            }
        }

        monitor.record_result(
            result.up,
            result.latency_ms,
            result.timestamp,
            result.status_code,
            result.error.clone(),
            result.is_degraded,
        );

        let (flapping, flap_changed) = monitor.evaluate_flapping();
        if flap_changed {
            self.on_flap_change(&ctx, flapping, now);
        }

        self.batch.push(CheckRecord {
            monitor_id: result.monitor_id,
            status: if result.up { CheckStatus::Up } else { CheckStatus::Down },
            latency: result.latency_ms,
            timestamp: result.timestamp,
            status_code: result.status_code,
        });
    }

    async fn context(&self, result: &CheckResult, now: DateTime<Utc>) -> Option<Context> {
        let registry = self.manager.registry.read().await;
        let monitor = registry.monitors.get(&result.monitor_id)?.clone();
        let in_maintenance = in_maintenance(&registry.maintenance, &monitor.group_id(), now);

        Some(Context {
            monitor,
            latency_threshold: registry.latency_threshold,
            in_maintenance,
            timezone: registry.timezone,
            checked_at: result.timestamp,
        })
    }

    fn on_down(&self, ctx: &Context, result: &CheckResult, now: DateTime<Utc>) {
        let message = match result.status_code {
            0 => "Monitor is down".to_string(),
            code => format!("Monitor is down (Status: {})", code),
        };
        tracing::info!(monitor_id = %ctx.monitor.id(), "{}", message);

        self.open_outage(ctx, OutageType::Down, &message, now);
        self.event(ctx, "down", &message, now);
        self.notify_gated(ctx, EventType::Down, message, now);
    }

    fn on_recovered(&self, ctx: &Context, now: DateTime<Utc>) {
        let message = "Monitor recovered".to_string();
        tracing::info!(monitor_id = %ctx.monitor.id(), "{}", message);

        self.writer.submit(StoreWrite::CloseOutage {
            monitor_id: ctx.monitor.id().to_string(),
            at: now,
        });
        self.event(ctx, "recovered", &message, now);

        // Recovery skips the cooldown
        if !ctx.in_maintenance && !ctx.monitor.is_flapping() {
            self.notify(ctx, EventType::Up, message);
        }
    }

    fn on_degraded(&self, ctx: &Context, now: DateTime<Utc>) {
        let message = format!("High latency detected (>{}ms)", ctx.latency_threshold);
        tracing::info!(monitor_id = %ctx.monitor.id(), "{}", message);

        self.open_outage(ctx, OutageType::Degraded, &message, now);
        self.event(ctx, "degraded", &message, now);
        self.notify_gated(ctx, EventType::Degraded, message, now);
    }

    fn on_latency_normalized(&self, ctx: &Context, now: DateTime<Utc>) {
        tracing::info!(monitor_id = %ctx.monitor.id(), "Latency normalized");
        self.writer.submit(StoreWrite::CloseOutage {
            monitor_id: ctx.monitor.id().to_string(),
            at: now,
        });
        self.event(ctx, "recovered", "Latency normalized", now);
    }

    fn on_flap_change(&self, ctx: &Context, flapping: bool, now: DateTime<Utc>) {
        let (event_type, message) = if flapping {
            (EventType::Flapping, "Monitor is flapping between states")
        } else {
            (EventType::Stabilized, "Monitor has stabilized")
        };
        tracing::info!(monitor_id = %ctx.monitor.id(), "{}", message);

        self.event(ctx, event_type.as_str(), message, now);
        if !ctx.in_maintenance {
            self.notify(ctx, event_type, message.to_string());
        }
    }

    fn check_ssl(&self, ctx: &Context, expiry: DateTime<Utc>, now: DateTime<Utc>) {
        let Some(alert) = self
            .manager
            .ssl
            .observe(ctx.monitor.id(), expiry, now, ctx.timezone)
        else {
            return;
        };
        tracing::info!(
            monitor_id = %ctx.monitor.id(),
            "{} (threshold {} days)",
            alert.message,
            alert.threshold
        );

        self.event(ctx, EventType::SslExpiring.as_str(), &alert.message, now);
        if !ctx.in_maintenance {
            self.notify(ctx, EventType::SslExpiring, alert.message);
        }
    }

    fn open_outage(&self, ctx: &Context, outage_type: OutageType, summary: &str, now: DateTime<Utc>) {
        self.writer.submit(StoreWrite::OpenOutage {
            monitor_id: ctx.monitor.id().to_string(),
            outage_type,
            summary: summary.to_string(),
            at: now,
        });
    }

    fn event(&self, ctx: &Context, event_type: &str, message: &str, now: DateTime<Utc>) {
        self.writer.submit(StoreWrite::CreateEvent {
            monitor_id: ctx.monitor.id().to_string(),
            event_type: event_type.to_string(),
            message: message.to_string(),
            at: now,
        });
    }

    /// Notify unless suppressed by maintenance, flapping or cooldown.
    fn notify_gated(&self, ctx: &Context, event_type: EventType, message: String, now: DateTime<Utc>) {
        if ctx.in_maintenance {
            tracing::debug!(monitor_id = %ctx.monitor.id(), "In maintenance, not notifying");
            return;
        }
        if ctx.monitor.is_flapping() {
            tracing::debug!(monitor_id = %ctx.monitor.id(), "Flapping, not notifying");
            return;
        }
        if !ctx.monitor.should_notify(event_type, now) {
            tracing::debug!(monitor_id = %ctx.monitor.id(), "In cooldown, not notifying");
            return;
        }
        ctx.monitor.mark_notified(event_type, now);
        self.notify(ctx, event_type, message);
    }

    fn notify(&self, ctx: &Context, event_type: EventType, message: String) {
        self.manager.notifier.enqueue(NotificationEvent {
            monitor_id: ctx.monitor.id().to_string(),
            monitor_name: ctx.monitor.name(),
            monitor_url: ctx.monitor.url().to_string(),
            event_type,
            message,
            time: ctx.checked_at,
        });
    }
}

fn is_https(url: &str) -> bool {
    url.get(..8)
        .map(|scheme| scheme.eq_ignore_ascii_case("https://"))
        .unwrap_or(false)
}
