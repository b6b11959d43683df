//! Notification fatigue control: confirmation counting, cooldowns and flap
//! detection.

use crate::db::{self, Store};
use crate::notify::EventType;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::collections::HashMap;
use std::str::FromStr;

pub const DEFAULT_CONFIRMATION_THRESHOLD: u32 = 3;
pub const DEFAULT_COOLDOWN_MINUTES: u32 = 30;
pub const DEFAULT_FLAP_WINDOW_CHECKS: usize = 21;
pub const DEFAULT_FLAP_THRESHOLD_PERCENT: u32 = 25;

/// Fewest checks over which flapping can be judged.
const MIN_FLAP_WINDOW: usize = 3;

/// Resolved notification settings for one monitor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationPolicy {
    /// Consecutive failing checks before a state change counts.
    pub confirmation_threshold: u32,
    /// Minutes between repeat notifications of one type. 0 disables.
    pub cooldown_minutes: u32,
    pub flap_detection_enabled: bool,
    pub flap_window_checks: usize,
    pub flap_threshold_percent: u32,
}

impl Default for NotificationPolicy {
    fn default() -> Self {
        Self {
            confirmation_threshold: DEFAULT_CONFIRMATION_THRESHOLD,
            cooldown_minutes: DEFAULT_COOLDOWN_MINUTES,
            flap_detection_enabled: true,
            flap_window_checks: DEFAULT_FLAP_WINDOW_CHECKS,
            flap_threshold_percent: DEFAULT_FLAP_THRESHOLD_PERCENT,
        }
    }
}

impl NotificationPolicy {
    /// Read the global policy from the settings table. Missing, unreadable or
    /// out-of-range values fall back to their defaults.
    pub fn load(store: &Store) -> Self {
        let defaults = Self::default();

        Self {
            confirmation_threshold: setting::<u32>(store, "notification.confirmation_threshold")
                .filter(|v| *v >= 1)
                .unwrap_or(defaults.confirmation_threshold),
            cooldown_minutes: setting(store, "notification.cooldown_minutes")
                .unwrap_or(defaults.cooldown_minutes),
            flap_detection_enabled: setting(store, "notification.flap_detection_enabled")
                .unwrap_or(defaults.flap_detection_enabled),
            flap_window_checks: setting::<usize>(store, "notification.flap_window_checks")
                .filter(|v| *v >= MIN_FLAP_WINDOW)
                .unwrap_or(defaults.flap_window_checks),
            flap_threshold_percent: setting::<u32>(store, "notification.flap_threshold_percent")
                .filter(|v| (1..=100).contains(v))
                .unwrap_or(defaults.flap_threshold_percent),
        }
    }

    /// Apply a monitor's overrides on top of this policy.
    pub fn for_monitor(&self, monitor: &db::Monitor) -> Self {
        let mut policy = self.clone();
        if let Some(threshold) = monitor.confirmation_threshold.filter(|t| *t >= 1) {
            policy.confirmation_threshold = threshold;
        }
        if let Some(cooldown) = monitor.notification_cooldown_minutes {
            policy.cooldown_minutes = cooldown;
        }
        policy
    }

    /// Percentage below which a flapping monitor is considered stable again.
    fn flap_stop_percent(&self) -> u32 {
        self.flap_threshold_percent * 80 / 100
    }
}

fn setting<T: FromStr>(store: &Store, key: &str) -> Option<T> {
    match store.get_setting(key) {
        Ok(value) => value.and_then(|v| v.trim().parse().ok()),
        Err(e) => {
            tracing::warn!("Failed to read setting {}: {}", key, e);
            None
        }
    }
}

/// Per-monitor fatigue state.
#[derive(Debug, Default)]
pub struct Fatigue {
    policy: NotificationPolicy,
    consecutive_down: u32,
    consecutive_degraded: u32,
    down_confirmed: bool,
    degraded_confirmed: bool,
    last_notified: HashMap<EventType, DateTime<Utc>>,
    flapping: bool,
}

impl Fatigue {
    pub fn new(policy: NotificationPolicy) -> Self {
        Self {
            policy,
            ..Default::default()
        }
    }

    pub fn policy(&self) -> &NotificationPolicy {
        &self.policy
    }

    /// Swap in a new policy. Running counts are kept and judged against the
    /// new threshold on the next check.
    pub fn set_policy(&mut self, policy: NotificationPolicy) {
        self.policy = policy;
    }

    /// Count a down check. True exactly once, when the down state becomes
    /// confirmed.
    pub fn increment_down(&mut self) -> bool {
        self.consecutive_down += 1;
        self.consecutive_degraded = 0;
        self.degraded_confirmed = false;

        if !self.down_confirmed && self.consecutive_down >= self.policy.confirmation_threshold {
            self.down_confirmed = true;
            return true;
        }
        false
    }

    /// Count an up check. Returns whether the down state had been confirmed,
    /// in which case the down cooldown is cleared as well.
    pub fn reset_down(&mut self) -> bool {
        let was_confirmed = self.down_confirmed;
        self.consecutive_down = 0;
        self.down_confirmed = false;
        if was_confirmed {
            self.last_notified.remove(&EventType::Down);
        }
        was_confirmed
    }

    pub fn increment_degraded(&mut self) -> bool {
        self.consecutive_degraded += 1;

        if !self.degraded_confirmed
            && self.consecutive_degraded >= self.policy.confirmation_threshold
        {
            self.degraded_confirmed = true;
            return true;
        }
        false
    }

    pub fn reset_degraded(&mut self) -> bool {
        let was_confirmed = self.degraded_confirmed;
        self.consecutive_degraded = 0;
        self.degraded_confirmed = false;
        if was_confirmed {
            self.last_notified.remove(&EventType::Degraded);
        }
        was_confirmed
    }

    pub fn is_down_confirmed(&self) -> bool {
        self.down_confirmed
    }

    pub fn is_degraded_confirmed(&self) -> bool {
        self.degraded_confirmed
    }

    /// Whether a notification of `event_type` is outside its cooldown.
    pub fn should_notify(&self, event_type: EventType, now: DateTime<Utc>) -> bool {
        if self.policy.cooldown_minutes == 0 {
            return true;
        }
        match self.last_notified.get(&event_type) {
            None => true,
            Some(last) => {
                now - *last >= ChronoDuration::minutes(self.policy.cooldown_minutes as i64)
            }
        }
    }

    pub fn mark_notified(&mut self, event_type: EventType, now: DateTime<Utc>) {
        self.last_notified.insert(event_type, now);
    }

    pub fn is_flapping(&self) -> bool {
        self.flapping
    }

    /// Re-evaluate flapping over `history` (up/down, oldest first).
    ///
    /// Returns `(is_flapping, changed)`.
    pub fn evaluate_flapping(&mut self, history: &[bool]) -> (bool, bool) {
        if !self.policy.flap_detection_enabled {
            let changed = self.flapping;
            self.flapping = false;
            return (false, changed);
        }

        let window = self.policy.flap_window_checks.min(history.len());
        if window < MIN_FLAP_WINDOW {
            return (self.flapping, false);
        }

        let recent = &history[history.len() - window..];
        let transitions = recent.windows(2).filter(|w| w[0] != w[1]).count() as u64;
        let intervals = (window - 1) as u64;
        // transitions / intervals compared against a percentage, in integers
        let scaled = transitions * 100;

        let was_flapping = self.flapping;
        if !was_flapping && scaled >= self.policy.flap_threshold_percent as u64 * intervals {
            self.flapping = true;
        } else if was_flapping && scaled < self.policy.flap_stop_percent() as u64 * intervals {
            self.flapping = false;
        }

        (self.flapping, self.flapping != was_flapping)
    }

    /// Re-establish confirmed state from replayed history
    /// (`(up, degraded)`, oldest first).
    pub fn hydrate(&mut self, history: &[(bool, bool)]) {
        let trailing_down = history.iter().rev().take_while(|(up, _)| !*up).count() as u32;
        let trailing_degraded = history
            .iter()
            .rev()
            .take_while(|(up, degraded)| *up && *degraded)
            .count() as u32;

        let threshold = self.policy.confirmation_threshold;
        self.consecutive_down = trailing_down;
        self.consecutive_degraded = trailing_degraded;
        self.down_confirmed = trailing_down > 0 && trailing_down >= threshold;
        self.degraded_confirmed =
            !self.down_confirmed && trailing_degraded > 0 && trailing_degraded >= threshold;
    }
}
