//! fedplane-router — tenant-to-shard routing.
//!
//! Places tenants on shards and keeps a routing cache plus per-shard tenant
//! counters in step with the metadata store.
//!
//! # Components
//!
//! - **`hash`** — Deterministic modulo placement from a SHA-256 digest
//! - **`router`** — `TenantRouter`: cache, counters, placement, migration
//! - **`rebalance`** — Greedy, bounded redistribution from hot shards
//! - **`report`** — Report types returned to callers
//!
//! # Placement
//!
//! ```text
//! digest  = sha256(tenant_id)
//! value   = u32::from_str_radix(hex(digest)[..8], 16)
//! shard   = format!("{prefix}-{:03}", value % N + 1)
//! ```
//!
//! The hash is only the initial placement. Once a tenant is registered,
//! the cache (and the store behind it) is authoritative, including after
//! a migration.

pub mod config;
pub mod error;
pub mod hash;
pub mod rebalance;
pub mod report;
pub mod router;

pub use config::RoutingConfig;
pub use error::{RouterError, RouterResult};
pub use hash::{format_shard_id, shard_for_tenant, shard_number, tenant_hash};
pub use report::{
    CapacityViolation, ConsistencyReport, Migration, RebalanceReport, RoutingDebugInfo,
    RoutingStats, ShardLoad,
};
pub use router::TenantRouter;
