//! Certificate expiry thresholds.
//!
//! Each monitor gets at most one alert per threshold per certificate. A new
//! `NotAfter` (renewal) re-arms every threshold.

use chrono::{DateTime, Timelike, Utc};
use chrono_tz::Tz;
use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, PoisonError};

/// Day thresholds, ascending.
pub const SSL_THRESHOLDS: [i64; 4] = [1, 7, 14, 30];

/// Local hours (inclusive start, exclusive end) in which alerts may fire.
const NOTIFY_WINDOW_HOURS: (u32, u32) = (11, 13);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SslAlert {
    pub threshold: i64,
    pub days_left: i64,
    pub message: String,
}

#[derive(Debug, Default)]
struct SslState {
    cert_expiry: Option<DateTime<Utc>>,
    notified: HashSet<i64>,
}

#[derive(Debug, Default)]
pub struct SslTracker {
    states: Mutex<HashMap<String, SslState>>,
}

impl SslTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an observed expiry and return the alert to raise, if any.
    pub fn observe(
        &self,
        monitor_id: &str,
        cert_expiry: DateTime<Utc>,
        now: DateTime<Utc>,
        tz: Tz,
    ) -> Option<SslAlert> {
        let mut states = self.states.lock().unwrap_or_else(PoisonError::into_inner);
        let state = states.entry(monitor_id.to_string()).or_default();

        if state.cert_expiry != Some(cert_expiry) {
            if state.cert_expiry.is_some() {
                tracing::info!(monitor_id, "Certificate changed, re-arming expiry alerts");
            }
            state.cert_expiry = Some(cert_expiry);
            state.notified.clear();
        }

        let days_left = (cert_expiry - now).num_days();
        let threshold = threshold_for(days_left)?;

        if !in_notify_window(now, tz) || state.notified.contains(&threshold) {
            return None;
        }
        state.notified.insert(threshold);

        Some(SslAlert {
            threshold,
            days_left,
            message: expiry_message(days_left, cert_expiry),
        })
    }

    /// Forget a monitor, so its thresholds fire again when it comes back.
    pub fn clear(&self, monitor_id: &str) {
        self.states
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(monitor_id);
    }

    pub fn clear_all(&self) {
        self.states
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

/// Smallest threshold still at or above `days_left`.
pub fn threshold_for(days_left: i64) -> Option<i64> {
    SSL_THRESHOLDS.iter().copied().find(|t| days_left <= *t)
}

fn in_notify_window(now: DateTime<Utc>, tz: Tz) -> bool {
    let hour = now.with_timezone(&tz).hour();
    hour >= NOTIFY_WINDOW_HOURS.0 && hour < NOTIFY_WINDOW_HOURS.1
}

fn expiry_message(days_left: i64, cert_expiry: DateTime<Utc>) -> String {
    let date = cert_expiry.format("%Y-%m-%d");
    if days_left < 0 {
        format!("SSL certificate expired {} days ago ({})", -days_left, date)
    } else {
        format!("SSL certificate expires in {} days ({})", days_left, date)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn noon_utc() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 10, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_threshold_selection() {
        assert_eq!(threshold_for(45), None);
        assert_eq!(threshold_for(30), Some(30));
        assert_eq!(threshold_for(20), Some(30));
        assert_eq!(threshold_for(14), Some(14));
        assert_eq!(threshold_for(6), Some(7));
        assert_eq!(threshold_for(1), Some(1));
        assert_eq!(threshold_for(0), Some(1));
        assert_eq!(threshold_for(-3), Some(1));
    }

    #[test]
    fn test_one_alert_per_threshold() {
        let tracker = SslTracker::new();
        let now = noon_utc();
        let expiry = now + Duration::days(6) + Duration::hours(3);

        let alert = tracker.observe("m1", expiry, now, Tz::UTC).unwrap();
        assert_eq!(alert.threshold, 7);
        assert_eq!(alert.days_left, 6);
        assert_eq!(alert.message, "SSL certificate expires in 6 days (2026-03-16)");

        assert!(tracker
            .observe("m1", expiry, now + Duration::minutes(1), Tz::UTC)
            .is_none());

        // Five days later the 1-day threshold is new
        let later = now + Duration::days(5);
        let alert = tracker.observe("m1", expiry, later, Tz::UTC).unwrap();
        assert_eq!(alert.threshold, 1);
    }

    #[test]
    fn test_renewal_rearms() {
        let tracker = SslTracker::new();
        let now = noon_utc();
        let expiry = now + Duration::days(10);
        assert!(tracker.observe("m1", expiry, now, Tz::UTC).is_some());
        assert!(tracker.observe("m1", expiry, now, Tz::UTC).is_none());

        let renewed = now + Duration::days(12);
        assert_eq!(tracker.observe("m1", renewed, now, Tz::UTC).unwrap().threshold, 14);
    }

    #[test]
    fn test_outside_midday_window_is_deferred() {
        let tracker = SslTracker::new();
        let early = Utc.with_ymd_and_hms(2026, 3, 10, 8, 0, 0).unwrap();
        let expiry = early + Duration::days(3);
        assert!(tracker.observe("m1", expiry, early, Tz::UTC).is_none());

        // Not marked, so it fires once the window opens
        let noon = early + Duration::hours(4);
        assert!(tracker.observe("m1", expiry, noon, Tz::UTC).is_some());
    }

    #[test]
    fn test_window_uses_local_time() {
        let tracker = SslTracker::new();
        // 12:00 UTC is 21:00 in Tokyo
        let now = noon_utc();
        let expiry = now + Duration::days(3);
        assert!(tracker.observe("m1", expiry, now, chrono_tz::Asia::Tokyo).is_none());

        // 03:30 UTC is 12:30 in Tokyo
        let tokyo_noon = Utc.with_ymd_and_hms(2026, 3, 11, 3, 30, 0).unwrap();
        assert!(tracker.observe("m1", expiry, tokyo_noon, chrono_tz::Asia::Tokyo).is_some());
    }

    #[test]
    fn test_expired_message_and_clear() {
        let tracker = SslTracker::new();
        let now = noon_utc();
        let expiry = now - Duration::days(2);
        let alert = tracker.observe("m1", expiry, now, Tz::UTC).unwrap();
        assert_eq!(alert.message, "SSL certificate expired 2 days ago (2026-03-08)");
        assert!(tracker.observe("m1", expiry, now, Tz::UTC).is_none());

        tracker.clear("m1");
        assert!(tracker.observe("m1", expiry, now, Tz::UTC).is_some());
    }
}
