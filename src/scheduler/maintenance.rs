//! Maintenance windows cached from incident records.

use crate::db::Incident;

use chrono::{DateTime, Utc};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MaintenanceWindow {
    pub start: DateTime<Utc>,
    /// `None` means open-ended.
    pub end: Option<DateTime<Utc>>,
    pub affected_groups: Vec<String>,
}

impl MaintenanceWindow {
    /// True when `now` is inside the window and `group_id` is affected.
    pub fn covers(&self, group_id: &str, now: DateTime<Utc>) -> bool {
        if now < self.start {
            return false;
        }
        if matches!(self.end, Some(end) if now >= end) {
            return false;
        }
        self.affected_groups.iter().any(|g| g == group_id)
    }
}

impl From<&Incident> for MaintenanceWindow {
    fn from(incident: &Incident) -> Self {
        Self {
            start: incident.start_time,
            end: incident.end_time,
            affected_groups: incident.affected_groups.clone(),
        }
    }
}

pub fn in_maintenance(windows: &[MaintenanceWindow], group_id: &str, now: DateTime<Utc>) -> bool {
    windows.iter().any(|w| w.covers(group_id, now))
}
