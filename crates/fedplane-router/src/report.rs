//! Reports returned by the router.

use serde::Serialize;

/// Load of a single known shard.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ShardLoad {
    pub shard_id: String,
    pub tenant_count: u32,
    pub max_tenants: u32,
    pub utilization: f64,
}

impl ShardLoad {
    pub fn new(shard_id: &str, tenant_count: u32, max_tenants: u32) -> Self {
        let utilization = if max_tenants == 0 {
            1.0
        } else {
            f64::from(tenant_count) / f64::from(max_tenants)
        };
        Self {
            shard_id: shard_id.to_string(),
            tenant_count,
            max_tenants,
            utilization,
        }
    }

    pub fn has_capacity(&self) -> bool {
        self.tenant_count < self.max_tenants
    }
}

/// One tenant move performed by a rebalance.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct Migration {
    pub tenant_id: String,
    pub from: String,
    pub to: String,
}

/// Outcome of a rebalance call.
#[derive(Debug, Clone, Serialize)]
pub struct RebalanceReport {
    pub timestamp: u64,
    pub migrations_performed: usize,
    pub migrations: Vec<Migration>,
    /// Migrations skipped because the store rejected them.
    pub migrations_failed: usize,
    pub total_tenants: u32,
    pub total_shards: usize,
    pub average_utilization: f64,
    /// Shards above the threshold when the call started.
    pub overloaded_shards: usize,
    /// Shards still eligible as targets when the call finished.
    pub underloaded_shards: usize,
}

/// A shard holding more tenants than its capacity.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct CapacityViolation {
    pub shard_id: String,
    pub tenant_count: u32,
    pub max_tenants: u32,
}

/// Outcome of a routing consistency check. Nothing here is auto-corrected.
#[derive(Debug, Clone, Serialize)]
pub struct ConsistencyReport {
    pub timestamp: u64,
    pub total_issues: usize,
    /// Tenants routed to shards outside the known set.
    pub issues: Vec<String>,
    /// Tenants whose route differs from their hash placement. Expected for
    /// migrated or load-placed tenants.
    pub routing_mismatches: usize,
    pub capacity_violations: Vec<CapacityViolation>,
    pub total_tenants: usize,
    pub total_shards: usize,
}

/// Routing counters.
#[derive(Debug, Clone, Serialize)]
pub struct RoutingStats {
    pub total_routes: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub rebalance_operations: u64,
    pub cache_hit_rate_percent: f64,
    pub total_tenants: usize,
    pub total_shards: usize,
    pub average_tenants_per_shard: f64,
}

/// Explanation of how a tenant is routed.
#[derive(Debug, Clone, Serialize)]
pub struct RoutingDebugInfo {
    pub tenant_id: String,
    pub tenant_hash: String,
    pub hashed_shard_id: String,
    pub shard_id: String,
    pub algorithm: &'static str,
    pub num_shards: u32,
    pub shard_selection_reason: String,
    /// Known shards with spare capacity, least loaded first.
    pub alternative_shards: Vec<String>,
}
