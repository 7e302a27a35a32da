//! Report types and the capacity projection.

use std::collections::{BTreeMap, HashMap};

use serde::Serialize;

use fedplane_state::{Shard, ShardHealth};

use crate::config::CapacityConfig;
use crate::metrics::ShardResourceUsage;

/// Detailed view of one shard.
#[derive(Debug, Clone, Serialize)]
pub struct ShardStatus {
    pub shard_id: String,
    pub project_id: String,
    pub region: String,
    pub health: ShardHealth,
    pub tenant_count: u32,
    pub max_tenants: u32,
    pub utilization_percent: f64,
    pub control_plane_url: String,
    pub control_plane_healthy: bool,
    pub database_healthy: bool,
    pub storage_healthy: bool,
    pub last_health_check: Option<u64>,
    pub response_time_ms: Option<f64>,
    pub consecutive_errors: u32,
    pub resource_usage: Option<ShardResourceUsage>,
}

/// Platform-wide snapshot.
#[derive(Debug, Clone, Serialize)]
pub struct GlobalMetrics {
    pub timestamp: u64,
    pub total_projects: usize,
    pub total_shards: usize,
    pub total_tenants: usize,
    /// Mean control-endpoint response time over the last check of each shard.
    pub avg_response_time_ms: f64,
    pub max_response_time_ms: f64,
    /// Failed checks as a percentage of all checks since start.
    pub global_error_rate_percent: f64,
    pub total_capacity: u64,
    pub used_capacity: usize,
    pub utilization_percent: f64,
    pub healthy_shards: usize,
    pub degraded_shards: usize,
    pub unhealthy_shards: usize,
    pub unknown_shards: usize,
    pub estimated_monthly_cost: f64,
    pub cost_per_tenant: f64,
    pub regional_distribution: BTreeMap<String, usize>,
}

#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct RegionCapacity {
    pub shards: usize,
    pub total_capacity: u64,
    pub used_capacity: usize,
    pub utilization_percent: f64,
}

/// Capacity planning projection.
#[derive(Debug, Clone, Serialize)]
pub struct CapacityReport {
    pub timestamp: u64,
    pub current_shards: usize,
    pub projected_shards_needed: usize,
    pub current_utilization_percent: f64,
    pub projected_growth_rate_percent: f64,
    pub should_create_new_shards: bool,
    pub recommended_new_shards: usize,
    /// Months until capacity is reached at the assumed growth rate. `None`
    /// when there is no growth to project (no tenants or zero rate).
    pub estimated_months_to_capacity: Option<f64>,
    pub regional_capacity: BTreeMap<String, RegionCapacity>,
    pub current_monthly_cost: f64,
    pub projected_monthly_cost: f64,
}

/// Monitor counters.
#[derive(Debug, Clone, Serialize)]
pub struct MonitoringStats {
    pub total_health_checks: u64,
    pub failed_health_checks: u64,
    pub alerts_triggered: u64,
    pub shards_monitored: usize,
    pub shards_with_errors: usize,
    pub success_rate_percent: f64,
    pub monitoring_active: bool,
    pub health_check_interval_secs: u64,
}

fn percent(used: f64, total: f64) -> f64 {
    used / total.max(1.0) * 100.0
}

/// Project shard needs from current usage.
///
/// `tenants_by_shard` gives the tenant count of each shard; `total_tenants`
/// counts every tenant, including any routed to shards not in `shards`.
pub fn capacity_report(
    shards: &[Shard],
    tenants_by_shard: &HashMap<String, usize>,
    total_tenants: usize,
    config: &CapacityConfig,
    now: u64,
) -> CapacityReport {
    let current_shards = shards.len();
    let total_capacity: u64 = shards.iter().map(|s| u64::from(s.max_tenants)).sum();
    let current_utilization_percent = percent(total_tenants as f64, total_capacity as f64);

    let projected_shards_needed = (current_shards as f64 * config.projection_factor).floor() as usize;
    let growth = config.monthly_growth_rate_percent;

    let estimated_months_to_capacity = if growth > 0.0 && total_tenants > 0 {
        let remaining = (total_capacity as f64 - total_tenants as f64).max(0.0);
        Some(remaining / (total_tenants as f64 * growth / 100.0))
    } else {
        None
    };

    let mut regional_capacity: BTreeMap<String, RegionCapacity> = BTreeMap::new();
    for shard in shards {
        let region = regional_capacity.entry(shard.region.clone()).or_default();
        region.shards += 1;
        region.total_capacity += u64::from(shard.max_tenants);
        region.used_capacity += tenants_by_shard.get(&shard.shard_id).copied().unwrap_or(0);
    }
    for region in regional_capacity.values_mut() {
        region.utilization_percent =
            percent(region.used_capacity as f64, region.total_capacity as f64);
    }

    CapacityReport {
        timestamp: now,
        current_shards,
        projected_shards_needed,
        current_utilization_percent,
        projected_growth_rate_percent: growth,
        should_create_new_shards: current_utilization_percent > config.create_threshold_percent,
        recommended_new_shards: projected_shards_needed.saturating_sub(current_shards),
        estimated_months_to_capacity,
        regional_capacity,
        current_monthly_cost: current_shards as f64 * config.monthly_cost_per_shard,
        projected_monthly_cost: projected_shards_needed as f64 * config.monthly_cost_per_shard,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn shard(id: &str, region: &str, max: u32) -> Shard {
        let mut shard = Shard::new(id, id, region, &format!("http://{id}"));
        shard.max_tenants = max;
        shard
    }

    #[test]
    fn projection_for_busy_federation() {
        let shards: Vec<Shard> = (1..=5)
            .map(|n| shard(&format!("aipress-shard-{n:03}"), "us-central1", 50))
            .collect();
        let by_shard: HashMap<String, usize> = shards
            .iter()
            .map(|s| (s.shard_id.clone(), 45))
            .collect();

        let report = capacity_report(&shards, &by_shard, 225, &CapacityConfig::default(), 1000);
        assert_eq!(report.current_shards, 5);
        assert_eq!(report.projected_shards_needed, 6);
        assert_eq!(report.recommended_new_shards, 1);
        assert!((report.current_utilization_percent - 90.0).abs() < 1e-9);
        assert!(report.should_create_new_shards);
        // 25 free / (225 * 10%) ≈ 1.11 months.
        let months = report.estimated_months_to_capacity.unwrap();
        assert!((months - 25.0 / 22.5).abs() < 1e-9);
        assert_eq!(report.current_monthly_cost, 750.0);
        assert_eq!(report.projected_monthly_cost, 900.0);
    }

    #[test]
    fn regional_breakdown() {
        let shards = vec![
            shard("s-001", "us-central1", 50),
            shard("s-002", "us-central1", 50),
            shard("s-003", "europe-west1", 20),
        ];
        let mut by_shard = HashMap::new();
        by_shard.insert("s-001".to_string(), 10);
        by_shard.insert("s-003".to_string(), 5);

        let report = capacity_report(&shards, &by_shard, 15, &CapacityConfig::default(), 1000);
        let us = &report.regional_capacity["us-central1"];
        assert_eq!(us.shards, 2);
        assert_eq!(us.total_capacity, 100);
        assert_eq!(us.used_capacity, 10);
        assert!((us.utilization_percent - 10.0).abs() < 1e-9);
        assert!((report.regional_capacity["europe-west1"].utilization_percent - 25.0).abs() < 1e-9);
        assert!(!report.should_create_new_shards);
    }

    #[test]
    fn empty_federation_has_no_projection() {
        let report = capacity_report(&[], &HashMap::new(), 0, &CapacityConfig::default(), 1000);
        assert_eq!(report.current_shards, 0);
        assert_eq!(report.current_utilization_percent, 0.0);
        assert!(report.estimated_months_to_capacity.is_none());
        assert!(!report.should_create_new_shards);
    }
}
