//! Routing configuration.

use serde::{Deserialize, Serialize};

/// `[routing]` section of the daemon configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RoutingConfig {
    /// Shard count `N` used by hash placement.
    pub num_shards: u32,
    /// Shard id prefix; ids are `<prefix>-<NNN>`.
    pub shard_prefix: String,
    /// Capacity assumed for shards registered without an explicit one.
    pub max_tenants_per_shard: u32,
    /// Utilization (percent) above which a shard counts as overloaded.
    pub rebalance_threshold_percent: f64,
    /// Migrations attempted per overloaded shard per rebalance call.
    pub rebalance_batch_size: usize,
    /// Period of the scheduled rebalance loop; `None` disables it.
    pub rebalance_interval_secs: Option<u64>,
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            num_shards: 1000,
            shard_prefix: "aipress-shard".to_string(),
            max_tenants_per_shard: 50,
            rebalance_threshold_percent: 80.0,
            rebalance_batch_size: 5,
            rebalance_interval_secs: None,
        }
    }
}

impl RoutingConfig {
    /// Threshold as a fraction in `0.0..=1.0`.
    pub fn rebalance_threshold(&self) -> f64 {
        self.rebalance_threshold_percent / 100.0
    }
}
