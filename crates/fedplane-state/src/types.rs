//! Domain types for the metadata store.
//!
//! These types represent the persisted state of tenants, shards, projects,
//! and audit events. All types are serializable to/from JSON.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

/// Unique identifier for a tenant.
pub type TenantId = String;

/// Shard identifier, formatted `<prefix>-<zero-padded number>`.
pub type ShardId = String;

/// Identifier of the backing resource (project) of a shard.
pub type ProjectId = String;

/// Free-form metadata attached to tenants and shards.
pub type Metadata = HashMap<String, serde_json::Value>;

/// Default tenant capacity of a shard.
pub const DEFAULT_MAX_TENANTS: u32 = 50;

// ── Tenant ────────────────────────────────────────────────────────

/// A customer routed to exactly one shard at a time.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Tenant {
    pub tenant_id: TenantId,
    pub shard_id: ShardId,
    pub project_id: ProjectId,
    /// Unix timestamp (seconds) of placement.
    pub created_at: u64,
    /// Unix timestamp (seconds) the tenant was last seen by a route lookup.
    pub last_seen: Option<u64>,
    #[serde(default)]
    pub metadata: Metadata,
}

impl Tenant {
    pub fn new(tenant_id: &str, shard_id: &str, project_id: &str) -> Self {
        Self {
            tenant_id: tenant_id.to_string(),
            shard_id: shard_id.to_string(),
            project_id: project_id.to_string(),
            created_at: epoch_secs(),
            last_seen: None,
            metadata: Metadata::new(),
        }
    }
}

// ── Shard ─────────────────────────────────────────────────────────

/// Health of a shard, re-derived on every health-check cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShardHealth {
    Healthy,
    Degraded,
    Unhealthy,
    #[default]
    Unknown,
}

impl ShardHealth {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Healthy => "healthy",
            Self::Degraded => "degraded",
            Self::Unhealthy => "unhealthy",
            Self::Unknown => "unknown",
        }
    }
}

/// An independently deployed unit hosting a bounded set of tenants.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Shard {
    pub shard_id: ShardId,
    pub project_id: ProjectId,
    pub region: String,
    /// Base URL of the shard's own control plane.
    pub control_plane_url: String,
    pub tenant_count: u32,
    pub max_tenants: u32,
    pub health: ShardHealth,
    pub last_health_check: Option<u64>,
    pub created_at: u64,
    #[serde(default)]
    pub metadata: Metadata,
}

impl Shard {
    pub fn new(shard_id: &str, project_id: &str, region: &str, control_plane_url: &str) -> Self {
        Self {
            shard_id: shard_id.to_string(),
            project_id: project_id.to_string(),
            region: region.to_string(),
            control_plane_url: control_plane_url.to_string(),
            tenant_count: 0,
            max_tenants: DEFAULT_MAX_TENANTS,
            health: ShardHealth::Unknown,
            last_health_check: None,
            created_at: epoch_secs(),
            metadata: Metadata::new(),
        }
    }

    /// Fraction of capacity in use (0.0 for a zero-capacity shard).
    pub fn utilization(&self) -> f64 {
        if self.max_tenants == 0 {
            return 0.0;
        }
        f64::from(self.tenant_count) / f64::from(self.max_tenants)
    }
}

// ── Project ───────────────────────────────────────────────────────

/// Lifecycle status of a shard's backing resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProjectStatus {
    Creating,
    Active,
    Deleting,
    Suspended,
    Error,
}

/// Backing resource record of a shard.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProjectInfo {
    pub project_id: ProjectId,
    pub project_name: String,
    pub shard_id: Option<ShardId>,
    pub status: ProjectStatus,
    pub region: String,
    pub billing_account: String,
    pub organization_id: String,
    pub created_at: u64,
    #[serde(default)]
    pub resource_usage: Metadata,
    #[serde(default)]
    pub cost_data: Metadata,
}

// ── Audit ─────────────────────────────────────────────────────────

/// Kinds of audited events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    TenantCreated,
    TenantDeleted,
    TenantMigrated,
    ShardCreated,
    ShardDeleted,
    HealthCheckFailed,
    CapacityWarning,
    RebalancingTriggered,
}

/// Immutable, append-only audit record.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AuditEvent {
    pub event_id: String,
    pub event_type: EventType,
    pub timestamp: u64,
    pub actor: Option<String>,
    pub tenant_id: Option<TenantId>,
    pub shard_id: Option<ShardId>,
    pub project_id: Option<ProjectId>,
    #[serde(default)]
    pub details: Metadata,
    pub success: bool,
    pub error_message: Option<String>,
}

static EVENT_SEQ: AtomicU64 = AtomicU64::new(0);

impl AuditEvent {
    /// Start a successful event of the given type, stamped now.
    pub fn new(event_type: EventType) -> Self {
        let timestamp = epoch_secs();
        let seq = EVENT_SEQ.fetch_add(1, Ordering::Relaxed);
        Self {
            event_id: format!("evt-{timestamp:x}-{seq:08x}"),
            event_type,
            timestamp,
            actor: None,
            tenant_id: None,
            shard_id: None,
            project_id: None,
            details: Metadata::new(),
            success: true,
            error_message: None,
        }
    }

    pub fn actor(mut self, actor: &str) -> Self {
        self.actor = Some(actor.to_string());
        self
    }

    pub fn tenant(mut self, tenant_id: &str) -> Self {
        self.tenant_id = Some(tenant_id.to_string());
        self
    }

    pub fn shard(mut self, shard_id: &str) -> Self {
        self.shard_id = Some(shard_id.to_string());
        self
    }

    pub fn project(mut self, project_id: &str) -> Self {
        self.project_id = Some(project_id.to_string());
        self
    }

    pub fn detail(mut self, key: &str, value: impl Into<serde_json::Value>) -> Self {
        self.details.insert(key.to_string(), value.into());
        self
    }

    /// Mark the event as a failure with the given cause.
    pub fn failed(mut self, error: impl ToString) -> Self {
        self.success = false;
        self.error_message = Some(error.to_string());
        self
    }
}

/// Project id backing a shard: `<project_prefix>-<shard number suffix>`.
pub fn project_id_for_shard(project_prefix: &str, shard_id: &str) -> ProjectId {
    let suffix = shard_id.rsplit('-').next().unwrap_or(shard_id);
    format!("{project_prefix}-{suffix}")
}

/// Current unix time in seconds.
pub fn epoch_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
