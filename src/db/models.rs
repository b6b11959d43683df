//! Database model types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A monitor configuration as persisted by the admin API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Monitor {
    pub id: String,
    pub group_id: String,
    pub name: String,
    pub url: String,
    pub active: bool,
    /// Check interval in seconds. Values below 1 are treated as 60.
    pub interval: i64,
    pub created_at: DateTime<Utc>,
    pub confirmation_threshold: Option<u32>,
    pub notification_cooldown_minutes: Option<u32>,
}

impl Default for Monitor {
    fn default() -> Self {
        Self {
            id: String::new(),
            group_id: String::new(),
            name: String::new(),
            url: String::new(),
            active: true,
            interval: 60,
            created_at: Utc::now(),
            confirmation_threshold: None,
            notification_cooldown_minutes: None,
        }
    }
}

impl Monitor {
    /// Interval in seconds with the 60s fallback applied.
    pub fn effective_interval(&self) -> i64 {
        if self.interval < 1 {
            60
        } else {
            self.interval
        }
    }
}

/// Persisted outcome of a single check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckStatus {
    Up,
    Down,
}

impl CheckStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CheckStatus::Up => "up",
            CheckStatus::Down => "down",
        }
    }

    pub fn parse(s: &str) -> Self {
        if s == "up" {
            CheckStatus::Up
        } else {
            CheckStatus::Down
        }
    }

    pub fn is_up(&self) -> bool {
        matches!(self, CheckStatus::Up)
    }
}

/// A single persisted check row.
#[derive(Debug, Clone, Serialize)]
pub struct CheckRecord {
    pub monitor_id: String,
    pub status: CheckStatus,
    /// Latency in milliseconds.
    pub latency: i64,
    pub timestamp: DateTime<Utc>,
    /// HTTP status code, 0 when no response was received.
    pub status_code: u16,
}

/// A timestamped event row shown in the monitor timeline.
#[derive(Debug, Clone, Serialize)]
pub struct MonitorEvent {
    pub id: i64,
    pub monitor_id: String,
    pub event_type: String,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

/// Kind of outage a monitor is in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutageType {
    Down,
    Degraded,
}

impl OutageType {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutageType::Down => "down",
            OutageType::Degraded => "degraded",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "down" => Some(OutageType::Down),
            "degraded" => Some(OutageType::Degraded),
            _ => None,
        }
    }
}

/// A continuous period during which a monitor was down or degraded.
#[derive(Debug, Clone, Serialize)]
pub struct Outage {
    pub id: i64,
    pub monitor_id: String,
    pub outage_type: OutageType,
    pub summary: String,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
}

/// An incident or maintenance record. Only maintenance rows matter to the engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Incident {
    pub id: String,
    pub title: String,
    pub description: String,
    /// "incident" or "maintenance"
    pub incident_type: String,
    /// e.g. "scheduled", "in_progress", "completed", "resolved"
    pub status: String,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub affected_groups: Vec<String>,
    pub created_at: DateTime<Utc>,
}

impl Default for Incident {
    fn default() -> Self {
        Self {
            id: String::new(),
            title: String::new(),
            description: String::new(),
            incident_type: "maintenance".to_string(),
            status: "scheduled".to_string(),
            start_time: Utc::now(),
            end_time: None,
            affected_groups: Vec::new(),
            created_at: Utc::now(),
        }
    }
}

/// A dashboard user. The engine only reads the timezone.
#[derive(Debug, Clone, Serialize)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub timezone: String,
}

/// A configured notification destination.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationChannel {
    pub id: String,
    /// "slack", ...
    pub channel_type: String,
    pub name: String,
    /// Channel-specific JSON configuration.
    pub config: String,
    pub enabled: bool,
    pub created_at: DateTime<Utc>,
}
