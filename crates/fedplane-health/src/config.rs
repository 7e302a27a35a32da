//! Health, alerting, and capacity-planning configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// `[health]` section of the daemon configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthConfig {
    /// Period of the monitoring loop.
    pub interval_secs: u64,
    /// Delay before the next cycle after a failed one.
    pub retry_delay_secs: u64,
    /// Timeout of one control-endpoint probe, in milliseconds.
    pub probe_timeout_ms: u64,
    /// Upper bound on shards checked at once.
    pub max_concurrent_checks: usize,
    /// Path appended to a shard's control endpoint URL.
    pub health_path: String,
    /// How long resource samples are kept.
    pub metrics_retention_secs: u64,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            interval_secs: 300,
            retry_delay_secs: 30,
            probe_timeout_ms: 30_000,
            max_concurrent_checks: 32,
            health_path: "/health".to_string(),
            metrics_retention_secs: 24 * 3600,
        }
    }
}

impl HealthConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_secs(self.retry_delay_secs)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }
}

/// `[alerts]` section of the daemon configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AlertConfig {
    /// Consecutive errors that raise a `high_error_rate` alert.
    pub consecutive_error_threshold: u32,
    /// Minimum gap between two alerts of the same kind for the same shard.
    pub cooldown_secs: u64,
    /// Shard utilization (percent) that raises a `capacity_warning`.
    pub capacity_warning_percent: f64,
    /// Alerts kept for inspection.
    pub max_recent: usize,
}

impl Default for AlertConfig {
    fn default() -> Self {
        Self {
            consecutive_error_threshold: 3,
            cooldown_secs: 15 * 60,
            capacity_warning_percent: 80.0,
            max_recent: 500,
        }
    }
}

/// `[capacity]` section of the daemon configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CapacityConfig {
    /// Assumed monthly tenant growth, in percent.
    pub monthly_growth_rate_percent: f64,
    /// Projected shard count is `current * projection_factor`.
    pub projection_factor: f64,
    /// Utilization (percent) above which new shards are recommended.
    pub create_threshold_percent: f64,
    /// Placeholder monthly cost of one shard, in USD.
    pub monthly_cost_per_shard: f64,
}

impl Default for CapacityConfig {
    fn default() -> Self {
        Self {
            monthly_growth_rate_percent: 10.0,
            projection_factor: 1.2,
            create_threshold_percent: 80.0,
            monthly_cost_per_shard: 150.0,
        }
    }
}
