//! fedplane-lifecycle — shard provisioning and project bookkeeping.
//!
//! Makes sure a shard's backing project exists and is configured, and keeps
//! the Shard and Project records in the metadata store current. Routing
//! decisions are not made here.
//!
//! # Provisioning flow
//!
//! ```text
//! ensure_shard_exists(id)
//!   ├─ cache hit ─────────────────────────▶ Shard
//!   ├─ store hit ─▶ cache ────────────────▶ Shard
//!   └─ create_shard_project(id)
//!        ├─ save Project { status: creating }
//!        ├─ provisioner.create_project
//!        ├─ provisioner.configure × 5 steps ──▶ control endpoint
//!        ├─ save Project { status: active }, save Shard
//!        └─ on failure: Project { status: error } + Provisioning error
//! ```

pub mod config;
pub mod error;
pub mod manager;
pub mod provisioner;

pub use config::LifecycleConfig;
pub use error::{LifecycleError, LifecycleResult};
pub use manager::{
    CostBreakdown, FederationStatus, LifecycleStats, ProjectCosts, RegionSummary,
    ShardLifecycleManager,
};
pub use provisioner::{ProjectRequest, ProvisioningStep, ShardProvisioner, SimulatedProvisioner};
