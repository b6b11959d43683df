//! SQLite database store implementation.

use chrono::{DateTime, Duration as ChronoDuration, NaiveDateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Result as SqlResult, Row};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use thiserror::Error;

use super::models::*;

refinery::embed_migrations!("migrations");

/// Longest accepted retention horizon (10 years).
pub const MAX_RETENTION_DAYS: i64 = 3650;

/// Database error types.
#[derive(Error, Debug)]
pub enum DbError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("Migration error: {0}")]
    Migration(String),
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("Not found")]
    NotFound,
    #[error("database connection lock poisoned")]
    Poisoned,
}

/// Thread-safe database store.
#[derive(Clone)]
pub struct Store {
    conn: Arc<Mutex<Connection>>,
}

impl Store {
    /// Create a new store with the given database path.
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self, DbError> {
        let conn = Connection::open(path)?;
        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        store.init()?;
        Ok(store)
    }

    /// Run embedded migrations.
    fn init(&self) -> Result<(), DbError> {
        let mut conn = self.conn()?;
        migrations::runner()
            .run(&mut *conn)
            .map_err(|e| DbError::Migration(e.to_string()))?;
        Ok(())
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, DbError> {
        self.conn.lock().map_err(|_| DbError::Poisoned)
    }

    // --- Monitors ---

    /// Insert a monitor configuration.
    pub fn create_monitor(&self, monitor: &Monitor) -> Result<(), DbError> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO monitors (id, group_id, name, url, active, interval_seconds, created_at, confirmation_threshold, notification_cooldown_minutes)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                monitor.id,
                monitor.group_id,
                monitor.name,
                monitor.url,
                monitor.active,
                monitor.effective_interval(),
                format_db_time(monitor.created_at),
                monitor.confirmation_threshold,
                monitor.notification_cooldown_minutes,
            ],
        )?;
        Ok(())
    }

    /// Update name, URL, interval and notification overrides. The active flag is
    /// managed separately through [`Store::set_monitor_active`].
    pub fn update_monitor(&self, monitor: &Monitor) -> Result<(), DbError> {
        let conn = self.conn()?;
        let rows = conn.execute(
            "UPDATE monitors SET name=?1, url=?2, interval_seconds=?3, confirmation_threshold=?4, notification_cooldown_minutes=?5 WHERE id=?6",
            params![
                monitor.name,
                monitor.url,
                monitor.effective_interval(),
                monitor.confirmation_threshold,
                monitor.notification_cooldown_minutes,
                monitor.id,
            ],
        )?;
        if rows == 0 {
            return Err(DbError::NotFound);
        }
        Ok(())
    }

    /// Pause or resume a monitor.
    pub fn set_monitor_active(&self, id: &str, active: bool) -> Result<(), DbError> {
        let conn = self.conn()?;
        let rows = conn.execute(
            "UPDATE monitors SET active = ?1 WHERE id = ?2",
            params![active, id],
        )?;
        if rows == 0 {
            return Err(DbError::NotFound);
        }
        Ok(())
    }

    /// Delete a monitor and everything recorded for it.
    pub fn delete_monitor(&self, id: &str) -> Result<(), DbError> {
        let conn = self.conn()?;
        let tx = conn.unchecked_transaction()?;
        tx.execute("DELETE FROM monitor_checks WHERE monitor_id = ?1", params![id])?;
        tx.execute("DELETE FROM monitor_events WHERE monitor_id = ?1", params![id])?;
        tx.execute("DELETE FROM monitor_outages WHERE monitor_id = ?1", params![id])?;
        tx.execute("DELETE FROM monitors WHERE id = ?1", params![id])?;
        tx.commit()?;
        Ok(())
    }

    /// Get all monitor configurations, oldest first.
    pub fn get_monitors(&self) -> Result<Vec<Monitor>, DbError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, group_id, name, url, active, interval_seconds, created_at, confirmation_threshold, notification_cooldown_minutes
             FROM monitors ORDER BY created_at ASC",
        )?;

        let monitors = stmt
            .query_map([], |row| {
                let created: String = row.get(6)?;
                Ok(Monitor {
                    id: row.get(0)?,
                    group_id: row.get(1)?,
                    name: row.get(2)?,
                    url: row.get(3)?,
                    active: row.get(4)?,
                    interval: row.get(5)?,
                    created_at: parse_db_time(&created).unwrap_or_else(Utc::now),
                    confirmation_threshold: row.get(7)?,
                    notification_cooldown_minutes: row.get(8)?,
                })
            })?
            .collect::<SqlResult<Vec<_>>>()?;

        Ok(monitors)
    }

    // --- Checks ---

    /// Insert check records in one transaction.
    pub fn batch_insert_checks(&self, checks: &[CheckRecord]) -> Result<(), DbError> {
        if checks.is_empty() {
            return Ok(());
        }

        let conn = self.conn()?;
        let tx = conn.unchecked_transaction()?;

        {
            let mut stmt = tx.prepare(
                "INSERT INTO monitor_checks (monitor_id, status, latency, timestamp, status_code) VALUES (?1, ?2, ?3, ?4, ?5)",
            )?;

            for c in checks {
                stmt.execute(params![
                    c.monitor_id,
                    c.status.as_str(),
                    c.latency,
                    format_db_time(c.timestamp),
                    c.status_code,
                ])?;
            }
        }

        tx.commit()?;
        Ok(())
    }

    /// Get the most recent `limit` checks for a monitor, newest first.
    pub fn get_monitor_checks(&self, monitor_id: &str, limit: usize) -> Result<Vec<CheckRecord>, DbError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT monitor_id, status, latency, timestamp, status_code FROM monitor_checks
             WHERE monitor_id = ?1 ORDER BY timestamp DESC, id DESC LIMIT ?2",
        )?;

        let checks = stmt
            .query_map(params![monitor_id, limit as i64], |row| {
                let status: String = row.get(1)?;
                let time_str: String = row.get(3)?;
                Ok(CheckRecord {
                    monitor_id: row.get(0)?,
                    status: CheckStatus::parse(&status),
                    latency: row.get(2)?,
                    timestamp: parse_db_time(&time_str).unwrap_or_else(Utc::now),
                    status_code: row.get(4)?,
                })
            })?
            .collect::<SqlResult<Vec<_>>>()?;

        Ok(checks)
    }

    /// Delete checks older than `days` days. Returns the number of rows removed.
    pub fn prune_monitor_checks(&self, days: i64) -> Result<usize, DbError> {
        if !(1..=MAX_RETENTION_DAYS).contains(&days) {
            return Err(DbError::InvalidArgument(format!(
                "retention days must be between 1 and {}",
                MAX_RETENTION_DAYS
            )));
        }
        self.delete_checks_before(Utc::now() - ChronoDuration::days(days))
    }

    /// Delete checks recorded before a cutoff.
    pub fn delete_checks_before(&self, cutoff: DateTime<Utc>) -> Result<usize, DbError> {
        let conn = self.conn()?;
        let rows = conn.execute(
            "DELETE FROM monitor_checks WHERE timestamp < ?1",
            params![format_db_time(cutoff)],
        )?;
        Ok(rows)
    }

    // --- Events ---

    /// Append an event row to a monitor's timeline.
    pub fn create_event(
        &self,
        monitor_id: &str,
        event_type: &str,
        message: &str,
        at: DateTime<Utc>,
    ) -> Result<(), DbError> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO monitor_events (monitor_id, type, message, timestamp) VALUES (?1, ?2, ?3, ?4)",
            params![monitor_id, event_type, message, format_db_time(at)],
        )?;
        Ok(())
    }

    /// Get the latest events for a monitor, newest first.
    pub fn get_monitor_events(&self, monitor_id: &str, limit: usize) -> Result<Vec<MonitorEvent>, DbError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, monitor_id, type, message, timestamp FROM monitor_events
             WHERE monitor_id = ?1 ORDER BY timestamp DESC, id DESC LIMIT ?2",
        )?;

        let events = stmt
            .query_map(params![monitor_id, limit as i64], |row| {
                let time_str: String = row.get(4)?;
                Ok(MonitorEvent {
                    id: row.get(0)?,
                    monitor_id: row.get(1)?,
                    event_type: row.get(2)?,
                    message: row.get(3)?,
                    timestamp: parse_db_time(&time_str).unwrap_or_else(Utc::now),
                })
            })?
            .collect::<SqlResult<Vec<_>>>()?;

        Ok(events)
    }

    // --- Outages ---

    /// Open an outage, closing any outage still open for the monitor first.
    pub fn open_outage(
        &self,
        monitor_id: &str,
        outage_type: OutageType,
        summary: &str,
        at: DateTime<Utc>,
    ) -> Result<(), DbError> {
        let conn = self.conn()?;
        let tx = conn.unchecked_transaction()?;
        let ts = format_db_time(at);
        tx.execute(
            "UPDATE monitor_outages SET end_time = ?1 WHERE monitor_id = ?2 AND end_time IS NULL",
            params![ts, monitor_id],
        )?;
        tx.execute(
            "INSERT INTO monitor_outages (monitor_id, type, summary, start_time) VALUES (?1, ?2, ?3, ?4)",
            params![monitor_id, outage_type.as_str(), summary, ts],
        )?;
        tx.commit()?;
        Ok(())
    }

    /// Close the open outage for a monitor, if any. Returns the number of rows closed.
    pub fn close_outage(&self, monitor_id: &str, at: DateTime<Utc>) -> Result<usize, DbError> {
        let conn = self.conn()?;
        let rows = conn.execute(
            "UPDATE monitor_outages SET end_time = ?1 WHERE monitor_id = ?2 AND end_time IS NULL",
            params![format_db_time(at), monitor_id],
        )?;
        Ok(rows)
    }

    /// Get all outages that have not ended yet.
    pub fn get_active_outages(&self) -> Result<Vec<Outage>, DbError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, monitor_id, type, summary, start_time, end_time FROM monitor_outages
             WHERE end_time IS NULL ORDER BY start_time DESC",
        )?;
        let outages = stmt
            .query_map([], outage_from_row)?
            .collect::<SqlResult<Vec<_>>>()?;
        Ok(outages)
    }

    /// Get every outage recorded for a monitor, newest first.
    pub fn get_monitor_outages(&self, monitor_id: &str) -> Result<Vec<Outage>, DbError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, monitor_id, type, summary, start_time, end_time FROM monitor_outages
             WHERE monitor_id = ?1 ORDER BY id DESC",
        )?;
        let outages = stmt
            .query_map(params![monitor_id], outage_from_row)?
            .collect::<SqlResult<Vec<_>>>()?;
        Ok(outages)
    }

    // --- Incidents ---

    /// Insert an incident or maintenance window.
    pub fn create_incident(&self, incident: &Incident) -> Result<(), DbError> {
        let groups = serde_json::to_string(&incident.affected_groups)
            .map_err(|e| DbError::InvalidArgument(e.to_string()))?;
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO incidents (id, title, description, type, status, start_time, end_time, affected_groups, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                incident.id,
                incident.title,
                incident.description,
                incident.incident_type,
                incident.status,
                format_db_time(incident.start_time),
                incident.end_time.map(format_db_time),
                groups,
                format_db_time(incident.created_at),
            ],
        )?;
        Ok(())
    }

    /// Get maintenance windows that are neither completed nor resolved.
    pub fn get_open_maintenance(&self) -> Result<Vec<Incident>, DbError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, title, description, type, status, start_time, end_time, affected_groups, created_at
             FROM incidents
             WHERE type = 'maintenance' AND status NOT IN ('completed', 'resolved')
             ORDER BY start_time ASC",
        )?;

        let incidents = stmt
            .query_map([], |row| {
                let start: String = row.get(5)?;
                let end: Option<String> = row.get(6)?;
                let groups: String = row.get(7)?;
                let created: String = row.get(8)?;
                Ok(Incident {
                    id: row.get(0)?,
                    title: row.get(1)?,
                    description: row.get(2)?,
                    incident_type: row.get(3)?,
                    status: row.get(4)?,
                    start_time: parse_db_time(&start).unwrap_or_else(Utc::now),
                    end_time: end.as_deref().and_then(parse_db_time),
                    affected_groups: serde_json::from_str(&groups).unwrap_or_default(),
                    created_at: parse_db_time(&created).unwrap_or_else(Utc::now),
                })
            })?
            .collect::<SqlResult<Vec<_>>>()?;

        Ok(incidents)
    }

    // --- Settings ---

    /// Read a setting, `None` when unset.
    pub fn get_setting(&self, key: &str) -> Result<Option<String>, DbError> {
        let conn = self.conn()?;
        let value = conn
            .query_row(
                "SELECT value FROM settings WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value)
    }

    /// Insert or replace a setting.
    pub fn set_setting(&self, key: &str, value: &str) -> Result<(), DbError> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO settings (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            params![key, value],
        )?;
        Ok(())
    }

    // --- Users ---

    /// Create a user and return its id.
    pub fn create_user(&self, username: &str, timezone: &str) -> Result<i64, DbError> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO users (username, timezone) VALUES (?1, ?2)",
            params![username, timezone],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// Get a user by id.
    pub fn get_user(&self, id: i64) -> Result<Option<User>, DbError> {
        let conn = self.conn()?;
        let user = conn
            .query_row(
                "SELECT id, username, timezone FROM users WHERE id = ?1",
                params![id],
                |row| {
                    Ok(User {
                        id: row.get(0)?,
                        username: row.get(1)?,
                        timezone: row.get(2)?,
                    })
                },
            )
            .optional()?;
        Ok(user)
    }

    // --- Notification channels ---

    pub fn create_notification_channel(&self, channel: &NotificationChannel) -> Result<(), DbError> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO notification_channels (id, type, name, config, enabled, created_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                channel.id,
                channel.channel_type,
                channel.name,
                channel.config,
                channel.enabled,
                format_db_time(channel.created_at),
            ],
        )?;
        Ok(())
    }

    pub fn get_notification_channels(&self) -> Result<Vec<NotificationChannel>, DbError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, type, name, config, enabled, created_at FROM notification_channels ORDER BY created_at DESC",
        )?;
        let channels = stmt
            .query_map([], |row| {
                let created: String = row.get(5)?;
                Ok(NotificationChannel {
                    id: row.get(0)?,
                    channel_type: row.get(1)?,
                    name: row.get(2)?,
                    config: row.get(3)?,
                    enabled: row.get(4)?,
                    created_at: parse_db_time(&created).unwrap_or_else(Utc::now),
                })
            })?
            .collect::<SqlResult<Vec<_>>>()?;
        Ok(channels)
    }
}

fn outage_from_row(row: &Row<'_>) -> SqlResult<Outage> {
    let outage_type: String = row.get(2)?;
    let start: String = row.get(4)?;
    let end: Option<String> = row.get(5)?;
    Ok(Outage {
        id: row.get(0)?,
        monitor_id: row.get(1)?,
        outage_type: OutageType::parse(&outage_type).unwrap_or(OutageType::Down),
        summary: row.get(3)?,
        start_time: parse_db_time(&start).unwrap_or_else(Utc::now),
        end_time: end.as_deref().and_then(parse_db_time),
    })
}

/// Format a timestamp in the fixed-width layout used by every time column, so
/// range comparisons in SQL are plain string comparisons.
pub fn format_db_time(t: DateTime<Utc>) -> String {
    t.format("%Y-%m-%d %H:%M:%S%.9f").to_string()
}

/// Parse a datetime string from the database.
fn parse_db_time(s: &str) -> Option<DateTime<Utc>> {
    let formats = [
        "%Y-%m-%d %H:%M:%S%.9f",
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%dT%H:%M:%S%.9fZ",
        "%Y-%m-%dT%H:%M:%SZ",
    ];

    for fmt in &formats {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(DateTime::from_naive_utc_and_offset(dt, Utc));
        }
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    fn test_store() -> (Store, NamedTempFile) {
        let tmp = NamedTempFile::new().unwrap();
        let store = Store::new(tmp.path()).unwrap();
        (store, tmp)
    }

    fn check(monitor_id: &str, up: bool, at: DateTime<Utc>) -> CheckRecord {
        CheckRecord {
            monitor_id: monitor_id.to_string(),
            status: if up { CheckStatus::Up } else { CheckStatus::Down },
            latency: 42,
            timestamp: at,
            status_code: if up { 200 } else { 0 },
        }
    }

    #[test]
    fn test_monitor_crud() {
        let (store, _tmp) = test_store();

        let mut monitor = Monitor {
            id: "m1".to_string(),
            group_id: "g1".to_string(),
            name: "API".to_string(),
            url: "https://example.com".to_string(),
            interval: 0,
            confirmation_threshold: Some(2),
            ..Default::default()
        };
        store.create_monitor(&monitor).unwrap();

        let fetched = store.get_monitors().unwrap();
        assert_eq!(fetched.len(), 1);
        assert_eq!(fetched[0].interval, 60);
        assert_eq!(fetched[0].confirmation_threshold, Some(2));
        assert_eq!(fetched[0].notification_cooldown_minutes, None);
        assert!(fetched[0].active);

        monitor.name = "API v2".to_string();
        monitor.interval = 30;
        store.update_monitor(&monitor).unwrap();
        store.set_monitor_active("m1", false).unwrap();

        let fetched = store.get_monitors().unwrap();
        assert_eq!(fetched[0].name, "API v2");
        assert_eq!(fetched[0].interval, 30);
        assert!(!fetched[0].active);

        assert!(matches!(
            store.set_monitor_active("missing", true),
            Err(DbError::NotFound)
        ));

        store.delete_monitor("m1").unwrap();
        assert!(store.get_monitors().unwrap().is_empty());
    }

    #[test]
    fn test_checks_are_returned_newest_first() {
        let (store, _tmp) = test_store();
        let now = Utc::now();
        let checks: Vec<_> = (0..5)
            .map(|i| check("m1", i % 2 == 0, now - ChronoDuration::minutes(5 - i)))
            .collect();
        store.batch_insert_checks(&checks).unwrap();

        let fetched = store.get_monitor_checks("m1", 3).unwrap();
        assert_eq!(fetched.len(), 3);
        assert!(fetched[0].timestamp > fetched[1].timestamp);
        assert!(fetched[1].timestamp > fetched[2].timestamp);
        assert_eq!(fetched[0].status, CheckStatus::Up);
        assert_eq!(fetched[1].status, CheckStatus::Down);
    }

    #[test]
    fn test_prune_keeps_recent_checks() {
        let (store, _tmp) = test_store();
        let now = Utc::now();
        store
            .batch_insert_checks(&[
                check("m1", true, now - ChronoDuration::days(45)),
                check("m1", true, now - ChronoDuration::days(31)),
                check("m1", false, now - ChronoDuration::days(29)),
                check("m1", true, now - ChronoDuration::hours(1)),
            ])
            .unwrap();

        let removed = store.prune_monitor_checks(30).unwrap();
        assert_eq!(removed, 2);

        let left = store.get_monitor_checks("m1", 10).unwrap();
        assert_eq!(left.len(), 2);
        assert!(left
            .iter()
            .all(|c| c.timestamp > now - ChronoDuration::days(30)));
    }

    #[test]
    fn test_prune_rejects_invalid_days() {
        let (store, _tmp) = test_store();
        assert!(store.prune_monitor_checks(0).is_err());
        assert!(store.prune_monitor_checks(MAX_RETENTION_DAYS + 1).is_err());
    }

    #[test]
    fn test_close_outage_is_idempotent() {
        let (store, _tmp) = test_store();
        let now = Utc::now();

        assert_eq!(store.close_outage("m1", now).unwrap(), 0);
        assert!(store.get_monitor_outages("m1").unwrap().is_empty());

        store.open_outage("m1", OutageType::Down, "down", now).unwrap();
        assert_eq!(store.close_outage("m1", now).unwrap(), 1);
        assert_eq!(store.close_outage("m1", now).unwrap(), 0);

        let outages = store.get_monitor_outages("m1").unwrap();
        assert_eq!(outages.len(), 1);
        assert!(outages[0].end_time.is_some());
    }

    #[test]
    fn test_open_outage_closes_previous() {
        let (store, _tmp) = test_store();
        let now = Utc::now();

        store
            .open_outage("m1", OutageType::Degraded, "slow", now)
            .unwrap();
        store
            .open_outage("m1", OutageType::Down, "down", now + ChronoDuration::seconds(5))
            .unwrap();
        store
            .open_outage("m2", OutageType::Down, "down", now)
            .unwrap();

        let active = store.get_active_outages().unwrap();
        assert_eq!(active.len(), 2);
        let m1: Vec<_> = active.iter().filter(|o| o.monitor_id == "m1").collect();
        assert_eq!(m1.len(), 1);
        assert_eq!(m1[0].outage_type, OutageType::Down);

        let all = store.get_monitor_outages("m1").unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[1].outage_type, OutageType::Degraded);
        assert!(all[1].end_time.is_some());
    }

    #[test]
    fn test_settings_and_users() {
        let (store, _tmp) = test_store();
        assert_eq!(store.get_setting("latency_threshold").unwrap(), None);
        store.set_setting("latency_threshold", "500").unwrap();
        store.set_setting("latency_threshold", "750").unwrap();
        assert_eq!(
            store.get_setting("latency_threshold").unwrap().as_deref(),
            Some("750")
        );

        let id = store.create_user("admin", "Europe/Berlin").unwrap();
        let user = store.get_user(id).unwrap().unwrap();
        assert_eq!(user.timezone, "Europe/Berlin");
        assert!(store.get_user(id + 1).unwrap().is_none());
    }

    #[test]
    fn test_open_maintenance_excludes_finished() {
        let (store, _tmp) = test_store();
        let open = Incident {
            id: "i1".to_string(),
            title: "DB upgrade".to_string(),
            affected_groups: vec!["g1".to_string(), "g2".to_string()],
            ..Default::default()
        };
        let done = Incident {
            id: "i2".to_string(),
            status: "completed".to_string(),
            ..Default::default()
        };
        let incident = Incident {
            id: "i3".to_string(),
            incident_type: "incident".to_string(),
            status: "investigating".to_string(),
            ..Default::default()
        };
        for i in [&open, &done, &incident] {
            store.create_incident(i).unwrap();
        }

        let windows = store.get_open_maintenance().unwrap();
        assert_eq!(windows.len(), 1);
        assert_eq!(windows[0].id, "i1");
        assert_eq!(windows[0].affected_groups, vec!["g1", "g2"]);
        assert!(windows[0].end_time.is_none());
    }

    #[test]
    fn test_events_newest_first() {
        let (store, _tmp) = test_store();
        let now = Utc::now();
        store.create_event("m1", "down", "Monitor is down", now).unwrap();
        store
            .create_event("m1", "recovered", "Monitor recovered", now + ChronoDuration::seconds(1))
            .unwrap();

        let events = store.get_monitor_events("m1", 10).unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].event_type, "recovered");
        assert_eq!(events[1].event_type, "down");
    }

    #[test]
    fn test_parse_db_time_roundtrip_format() {
        let t = Utc::now();
        assert_eq!(parse_db_time(&format_db_time(t)), Some(t));
        assert!(parse_db_time("not a time").is_none());
    }
}
