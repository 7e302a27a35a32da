//! Alert evaluation with per-shard cooldown.
//!
//! An alert fires when its condition holds and no alert of the same kind
//! fired for the same shard within the cooldown. Once the condition clears,
//! the cooldown is forgotten so a new occurrence alerts immediately.

use std::collections::{HashMap, VecDeque};

use serde::Serialize;
use tracing::warn;

use fedplane_state::ShardHealth;

use crate::config::AlertConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertKind {
    ShardUnhealthy,
    HighErrorRate,
    CapacityWarning,
}

impl AlertKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ShardUnhealthy => "shard_unhealthy",
            Self::HighErrorRate => "high_error_rate",
            Self::CapacityWarning => "capacity_warning",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Alert {
    pub kind: AlertKind,
    pub shard_id: String,
    pub message: String,
    pub timestamp: u64,
}

/// What the tracker needs to know about one shard.
#[derive(Debug, Clone, Copy)]
pub struct AlertInput<'a> {
    pub shard_id: &'a str,
    pub health: ShardHealth,
    pub consecutive_errors: u32,
    pub utilization_percent: f64,
}

pub struct AlertTracker {
    config: AlertConfig,
    last_fired: HashMap<(String, AlertKind), u64>,
    recent: VecDeque<Alert>,
    total: u64,
}

impl AlertTracker {
    pub fn new(config: AlertConfig) -> Self {
        Self {
            config,
            last_fired: HashMap::new(),
            recent: VecDeque::new(),
            total: 0,
        }
    }

    /// Evaluate every alert condition for one shard at time `now`.
    pub fn evaluate(&mut self, input: &AlertInput<'_>, now: u64) -> Vec<Alert> {
        let conditions = [
            (
                AlertKind::ShardUnhealthy,
                input.health == ShardHealth::Unhealthy,
                format!("shard {} is unhealthy", input.shard_id),
            ),
            (
                AlertKind::HighErrorRate,
                input.consecutive_errors >= self.config.consecutive_error_threshold,
                format!(
                    "shard {} failed {} consecutive health checks",
                    input.shard_id, input.consecutive_errors
                ),
            ),
            (
                AlertKind::CapacityWarning,
                input.utilization_percent > self.config.capacity_warning_percent,
                format!(
                    "shard {} at {:.1}% of tenant capacity",
                    input.shard_id, input.utilization_percent
                ),
            ),
        ];

        let mut fired = Vec::new();
        for (kind, active, message) in conditions {
            let key = (input.shard_id.to_string(), kind);
            if !active {
                self.last_fired.remove(&key);
                continue;
            }
            let cooling = self
                .last_fired
                .get(&key)
                .is_some_and(|last| now.saturating_sub(*last) < self.config.cooldown_secs);
            if cooling {
                continue;
            }

            self.last_fired.insert(key, now);
            let alert = Alert {
                kind,
                shard_id: input.shard_id.to_string(),
                message,
                timestamp: now,
            };
            warn!(
                alert = kind.as_str(),
                shard_id = %alert.shard_id,
                message = %alert.message,
                "ALERT"
            );
            self.record(alert.clone());
            fired.push(alert);
        }
        fired
    }

    fn record(&mut self, alert: Alert) {
        self.total += 1;
        self.recent.push_back(alert);
        while self.recent.len() > self.config.max_recent.max(1) {
            self.recent.pop_front();
        }
    }

    /// Most recent alerts, newest first.
    pub fn recent(&self, limit: usize) -> Vec<Alert> {
        self.recent.iter().rev().take(limit).cloned().collect()
    }

    /// Alerts fired since start.
    pub fn total(&self) -> u64 {
        self.total
    }

    /// Drop cooldown state of a shard that no longer exists.
    pub fn forget(&mut self, shard_id: &str) {
        self.last_fired.retain(|(id, _), _| id != shard_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input(health: ShardHealth, errors: u32, utilization: f64) -> AlertInput<'static> {
        AlertInput {
            shard_id: "aipress-shard-001",
            health,
            consecutive_errors: errors,
            utilization_percent: utilization,
        }
    }

    #[test]
    fn healthy_shard_raises_nothing() {
        let mut tracker = AlertTracker::new(AlertConfig::default());
        assert!(tracker.evaluate(&input(ShardHealth::Healthy, 0, 40.0), 1000).is_empty());
        assert_eq!(tracker.total(), 0);
    }

    #[test]
    fn error_threshold_fires_once_within_cooldown() {
        let mut tracker = AlertTracker::new(AlertConfig::default());
        let mut high_error = 0;
        for (cycle, errors) in [1u32, 2, 3, 4, 5].into_iter().enumerate() {
            let now = 1000 + cycle as u64 * 300;
            high_error += tracker
                .evaluate(&input(ShardHealth::Unhealthy, errors, 0.0), now)
                .iter()
                .filter(|a| a.kind == AlertKind::HighErrorRate)
                .count();
        }
        // Fires at 3 errors; cycles 4 and 5 are inside the 15 minute cooldown.
        assert_eq!(high_error, 1);
    }

    #[test]
    fn cooldown_expires() {
        let mut tracker = AlertTracker::new(AlertConfig::default());
        let unhealthy = input(ShardHealth::Unhealthy, 0, 0.0);
        assert_eq!(tracker.evaluate(&unhealthy, 1000).len(), 1);
        assert!(tracker.evaluate(&unhealthy, 1000 + 899).is_empty());
        assert_eq!(tracker.evaluate(&unhealthy, 1000 + 900).len(), 1);
        assert_eq!(tracker.total(), 2);
    }

    #[test]
    fn cleared_condition_resets_cooldown() {
        let mut tracker = AlertTracker::new(AlertConfig::default());
        assert_eq!(tracker.evaluate(&input(ShardHealth::Unhealthy, 0, 0.0), 1000).len(), 1);
        assert!(tracker.evaluate(&input(ShardHealth::Healthy, 0, 0.0), 1010).is_empty());
        assert_eq!(tracker.evaluate(&input(ShardHealth::Unhealthy, 0, 0.0), 1020).len(), 1);
    }

    #[test]
    fn capacity_warning_above_threshold() {
        let mut tracker = AlertTracker::new(AlertConfig::default());
        assert!(tracker.evaluate(&input(ShardHealth::Healthy, 0, 80.0), 1000).is_empty());
        let alerts = tracker.evaluate(&input(ShardHealth::Healthy, 0, 96.0), 1001);
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].kind, AlertKind::CapacityWarning);
        assert!(alerts[0].message.contains("96.0%"));
    }

    #[test]
    fn recent_list_is_bounded() {
        let config = AlertConfig {
            max_recent: 2,
            cooldown_secs: 0,
            ..AlertConfig::default()
        };
        let mut tracker = AlertTracker::new(config);
        for i in 0..5 {
            tracker.evaluate(&input(ShardHealth::Unhealthy, 0, 0.0), 1000 + i);
        }
        let recent = tracker.recent(10);
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].timestamp, 1004);
        assert_eq!(tracker.total(), 5);
    }
}
