//! The `MetadataStore` capability interface and backend selection.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{StateError, StateResult};
use crate::memory::MemoryStore;
use crate::redb_store::RedbStore;
use crate::types::*;

/// CRUD + full-scan access to tenants, shards, projects, and the audit log.
///
/// `save_*` upserts by primary identifier; `delete_*` returns whether the
/// record existed. Every single-entity write is atomic, and
/// [`update_shard`](MetadataStore::update_shard) is an atomic
/// read-modify-write of one shard.
pub trait MetadataStore: Send + Sync {
    // ── Tenants ────────────────────────────────────────────────────
    fn save_tenant(&self, tenant: &Tenant) -> StateResult<()>;
    fn get_tenant(&self, tenant_id: &str) -> StateResult<Option<Tenant>>;
    fn get_all_tenants(&self) -> StateResult<Vec<Tenant>>;
    fn delete_tenant(&self, tenant_id: &str) -> StateResult<bool>;
    fn get_tenants_by_shard(&self, shard_id: &str) -> StateResult<Vec<Tenant>>;

    // ── Shards ─────────────────────────────────────────────────────
    fn save_shard(&self, shard: &Shard) -> StateResult<()>;
    fn get_shard(&self, shard_id: &str) -> StateResult<Option<Shard>>;
    fn get_all_shards(&self) -> StateResult<Vec<Shard>>;
    fn delete_shard(&self, shard_id: &str) -> StateResult<bool>;
    /// Apply `apply` to the stored shard and save it, with no other write
    /// in between. Returns the updated shard, or `None` if it does not exist.
    fn update_shard(
        &self,
        shard_id: &str,
        apply: &mut dyn FnMut(&mut Shard),
    ) -> StateResult<Option<Shard>>;

    // ── Projects ───────────────────────────────────────────────────
    fn save_project(&self, project: &ProjectInfo) -> StateResult<()>;
    fn get_project(&self, project_id: &str) -> StateResult<Option<ProjectInfo>>;
    fn get_all_projects(&self) -> StateResult<Vec<ProjectInfo>>;
    fn delete_project(&self, project_id: &str) -> StateResult<bool>;

    // ── Audit ──────────────────────────────────────────────────────
    fn save_audit_event(&self, event: &AuditEvent) -> StateResult<()>;
    /// Audit events, newest first.
    fn get_audit_events(&self, limit: usize, offset: usize) -> StateResult<Vec<AuditEvent>>;
    fn audit_event_count(&self) -> StateResult<usize>;

    /// Record counts for debugging.
    fn stats(&self) -> StateResult<StoreStats> {
        let tenants = self.get_all_tenants()?;
        let mut tenants_by_shard: HashMap<String, usize> = HashMap::new();
        for tenant in &tenants {
            *tenants_by_shard.entry(tenant.shard_id.clone()).or_default() += 1;
        }
        Ok(StoreStats {
            tenants: tenants.len(),
            shards: self.get_all_shards()?.len(),
            projects: self.get_all_projects()?.len(),
            audit_events: self.audit_event_count()?,
            tenants_by_shard,
        })
    }
}

/// Record counts reported by [`MetadataStore::stats`].
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct StoreStats {
    pub tenants: usize,
    pub shards: usize,
    pub projects: usize,
    pub audit_events: usize,
    pub tenants_by_shard: HashMap<String, usize>,
}

/// Which backend to open.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreKind {
    #[default]
    Memory,
    Redb,
}

/// `[store]` section of the daemon configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub kind: StoreKind,
    /// Database file for the redb backend.
    pub path: Option<PathBuf>,
    /// Audit ring size for the memory backend.
    pub audit_capacity: usize,
    /// Number of development shards seeded into an empty memory store.
    pub seed_shards: u32,
    /// Prefix used for seeded shard ids.
    pub seed_shard_prefix: String,
    /// Region used for seeded shards.
    pub seed_region: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            kind: StoreKind::Memory,
            path: None,
            audit_capacity: 10_000,
            seed_shards: 0,
            seed_shard_prefix: "aipress-shard".to_string(),
            seed_region: "us-central1".to_string(),
        }
    }
}

/// Open the backend selected by `config`.
pub fn open_store(config: &StoreConfig) -> StateResult<Arc<dyn MetadataStore>> {
    match config.kind {
        StoreKind::Memory => {
            let store = MemoryStore::with_audit_capacity(config.audit_capacity);
            store.seed_shards(config.seed_shards, &config.seed_shard_prefix, &config.seed_region)?;
            info!(seeded = config.seed_shards, "memory metadata store opened");
            Ok(Arc::new(store))
        }
        StoreKind::Redb => {
            let path = config
                .path
                .as_ref()
                .ok_or_else(|| StateError::Config("redb store requires a path".to_string()))?;
            let store = RedbStore::open(path)?;
            info!(?path, "redb metadata store opened");
            Ok(Arc::new(store))
        }
    }
}
