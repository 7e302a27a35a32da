//! Lifecycle configuration.

use serde::{Deserialize, Serialize};

/// `[lifecycle]` section of the daemon configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LifecycleConfig {
    /// Project ids are `<project_prefix>-<shard number>`.
    pub project_prefix: String,
    pub default_region: String,
    pub billing_account: String,
    pub organization_id: String,
    /// Capacity given to newly created shards.
    pub default_max_tenants: u32,
    /// Placeholder monthly cost of one shard, in USD.
    pub monthly_cost_per_shard: f64,
    /// Period of the failed-project cleanup loop.
    pub cleanup_interval_secs: u64,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            project_prefix: "aipress-shard".to_string(),
            default_region: "us-central1".to_string(),
            billing_account: String::new(),
            organization_id: String::new(),
            default_max_tenants: 50,
            monthly_cost_per_shard: 150.0,
            cleanup_interval_secs: 3600,
        }
    }
}
