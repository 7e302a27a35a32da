//! Shard resource samples and their retention window.

use std::collections::{HashMap, VecDeque};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use fedplane_state::Shard;

/// One resource-usage sample of a shard.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShardResourceUsage {
    pub shard_id: String,
    pub cpu_utilization_percent: f64,
    pub memory_utilization_percent: f64,
    pub storage_used_gb: f64,
    pub storage_available_gb: f64,
    pub network_ingress_gb: f64,
    pub network_egress_gb: f64,
    pub database_connections: u32,
    pub database_max_connections: u32,
    pub timestamp: u64,
}

/// Source of resource samples, typically a cloud monitoring API.
#[async_trait]
pub trait MetricsSource: Send + Sync {
    /// Sample a shard. `None` means no data is available.
    async fn sample(&self, shard: &Shard) -> anyhow::Result<Option<ShardResourceUsage>>;
}

/// Metrics source that never has data.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullMetricsSource;

#[async_trait]
impl MetricsSource for NullMetricsSource {
    async fn sample(&self, _shard: &Shard) -> anyhow::Result<Option<ShardResourceUsage>> {
        Ok(None)
    }
}

/// Per-shard samples, oldest first, pruned by age.
#[derive(Debug, Default)]
pub struct MetricsHistory {
    samples: HashMap<String, VecDeque<ShardResourceUsage>>,
}

impl MetricsHistory {
    pub fn record(&mut self, sample: ShardResourceUsage) {
        self.samples
            .entry(sample.shard_id.clone())
            .or_default()
            .push_back(sample);
    }

    /// Drop samples older than `cutoff` and shards left without samples.
    pub fn prune(&mut self, cutoff: u64) {
        for samples in self.samples.values_mut() {
            while samples.front().is_some_and(|s| s.timestamp < cutoff) {
                samples.pop_front();
            }
        }
        self.samples.retain(|_, samples| !samples.is_empty());
    }

    pub fn latest(&self, shard_id: &str) -> Option<&ShardResourceUsage> {
        self.samples.get(shard_id).and_then(|s| s.back())
    }

    pub fn sample_count(&self, shard_id: &str) -> usize {
        self.samples.get(shard_id).map_or(0, VecDeque::len)
    }

    pub fn remove(&mut self, shard_id: &str) {
        self.samples.remove(shard_id);
    }
}
