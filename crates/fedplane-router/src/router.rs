//! TenantRouter — routing cache, shard counters, placement, and migration.
//!
//! The routing cache and the per-shard tenant counters live in a single
//! `RoutingTable` behind one async mutex. Every mutation (register,
//! unregister, migrate, rebalance) holds that lock for its whole
//! read-modify-write, store write included, so concurrent tenant creation
//! cannot lose counter updates.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use fedplane_state::{
    AuditEvent, EventType, Metadata, MetadataStore, Tenant, epoch_secs, project_id_for_shard,
};

use crate::config::RoutingConfig;
use crate::error::{RouterError, RouterResult};
use crate::hash::{self, format_shard_id, parse_shard_number};
use crate::report::*;

/// Cached assignment of one tenant.
#[derive(Debug, Clone)]
pub(crate) struct RouteEntry {
    pub shard_id: String,
    /// Registration order; lower is older.
    pub seq: u64,
}

/// Counter and capacity of one shard.
#[derive(Debug, Clone)]
pub(crate) struct ShardSlot {
    pub tenant_count: u32,
    pub max_tenants: u32,
    /// Whether the shard is in the known (routable) set.
    pub known: bool,
}

#[derive(Debug, Default)]
pub(crate) struct RoutingTable {
    pub routes: HashMap<String, RouteEntry>,
    /// Ordered by shard id, which makes every scan deterministic.
    pub shards: BTreeMap<String, ShardSlot>,
    next_seq: u64,
}

impl RoutingTable {
    fn next_seq(&mut self) -> u64 {
        let seq = self.next_seq;
        self.next_seq += 1;
        seq
    }

    pub fn is_known(&self, shard_id: &str) -> bool {
        self.shards.get(shard_id).is_some_and(|s| s.known)
    }

    /// Load of a known shard.
    pub fn load(&self, shard_id: &str) -> Option<ShardLoad> {
        self.shards
            .get(shard_id)
            .filter(|s| s.known)
            .map(|s| ShardLoad::new(shard_id, s.tenant_count, s.max_tenants))
    }

    /// Loads of all known shards, in shard id order.
    pub fn known_loads(&self) -> Vec<ShardLoad> {
        self.shards
            .iter()
            .filter(|(_, s)| s.known)
            .map(|(id, s)| ShardLoad::new(id, s.tenant_count, s.max_tenants))
            .collect()
    }

    /// Tenants routed to a shard, oldest registration first.
    pub fn tenants_on(&self, shard_id: &str) -> Vec<String> {
        let mut tenants: Vec<(&String, u64)> = self
            .routes
            .iter()
            .filter(|(_, e)| e.shard_id == shard_id)
            .map(|(id, e)| (id, e.seq))
            .collect();
        tenants.sort_by_key(|(_, seq)| *seq);
        tenants.into_iter().map(|(id, _)| id.clone()).collect()
    }

    fn slot_mut(&mut self, shard_id: &str, default_max: u32) -> &mut ShardSlot {
        self.shards
            .entry(shard_id.to_string())
            .or_insert_with(|| ShardSlot {
                tenant_count: 0,
                max_tenants: default_max,
                known: false,
            })
    }
}

#[derive(Default)]
pub(crate) struct Counters {
    total_routes: AtomicU64,
    cache_hits: AtomicU64,
    cache_misses: AtomicU64,
    pub rebalance_operations: AtomicU64,
}

/// Routes tenants to shards and tracks per-shard load.
pub struct TenantRouter {
    pub(crate) store: Arc<dyn MetadataStore>,
    pub(crate) config: RoutingConfig,
    /// Prefix of project ids derived for shards missing from the store.
    project_prefix: String,
    pub(crate) table: Mutex<RoutingTable>,
    pub(crate) counters: Counters,
}

impl TenantRouter {
    /// Create a router with an empty cache. Call [`initialize`](Self::initialize)
    /// to load existing state from the store.
    pub fn new(store: Arc<dyn MetadataStore>, config: RoutingConfig) -> Self {
        Self {
            store,
            project_prefix: config.shard_prefix.clone(),
            config,
            table: Mutex::new(RoutingTable::default()),
            counters: Counters::default(),
        }
    }

    /// Use the lifecycle manager's project prefix when deriving project ids.
    pub fn with_project_prefix(mut self, prefix: &str) -> Self {
        self.project_prefix = prefix.to_string();
        self
    }

    pub fn config(&self) -> &RoutingConfig {
        &self.config
    }

    /// Rebuild the cache and counters from the store.
    pub async fn initialize(&self) -> RouterResult<()> {
        let shards = self.store.get_all_shards()?;
        let mut tenants = self.store.get_all_tenants()?;
        tenants.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.tenant_id.cmp(&b.tenant_id))
        });

        let mut table = self.table.lock().await;
        *table = RoutingTable::default();
        for shard in &shards {
            table.shards.insert(
                shard.shard_id.clone(),
                ShardSlot {
                    tenant_count: 0,
                    max_tenants: shard.max_tenants,
                    known: true,
                },
            );
        }
        for tenant in &tenants {
            let seq = table.next_seq();
            table.routes.insert(
                tenant.tenant_id.clone(),
                RouteEntry {
                    shard_id: tenant.shard_id.clone(),
                    seq,
                },
            );
            table
                .slot_mut(&tenant.shard_id, self.config.max_tenants_per_shard)
                .tenant_count += 1;
        }

        info!(
            tenants = tenants.len(),
            shards = shards.len(),
            "router initialized from store"
        );
        Ok(())
    }

    // ── Lookup ─────────────────────────────────────────────────────

    /// Hash placement of a tenant, ignoring any registered assignment.
    pub fn hashed_shard(&self, tenant_id: &str) -> String {
        hash::shard_for_tenant(tenant_id, self.config.num_shards, &self.config.shard_prefix)
    }

    /// Shard a tenant routes to: its registered assignment if any, else
    /// its hash placement. Unregistered tenants are not cached.
    pub async fn shard_for_tenant(&self, tenant_id: &str) -> String {
        self.counters.total_routes.fetch_add(1, Ordering::Relaxed);
        if let Some(shard_id) = self.lookup(tenant_id).await {
            self.counters.cache_hits.fetch_add(1, Ordering::Relaxed);
            return shard_id;
        }
        self.counters.cache_misses.fetch_add(1, Ordering::Relaxed);
        self.hashed_shard(tenant_id)
    }

    /// Registered assignment of a tenant, if any.
    pub async fn lookup(&self, tenant_id: &str) -> Option<String> {
        let table = self.table.lock().await;
        table.routes.get(tenant_id).map(|e| e.shard_id.clone())
    }

    // ── Registration ───────────────────────────────────────────────

    /// Place a tenant on a shard and persist it.
    ///
    /// Idempotent for the same shard. Registering an already-placed tenant
    /// on a different shard is an error; use [`migrate_tenant`](Self::migrate_tenant).
    pub async fn register_tenant(&self, tenant_id: &str, shard_id: &str) -> RouterResult<Tenant> {
        self.register_tenant_with(tenant_id, shard_id, Metadata::new())
            .await
    }

    /// [`register_tenant`](Self::register_tenant) with caller-supplied metadata.
    pub async fn register_tenant_with(
        &self,
        tenant_id: &str,
        shard_id: &str,
        metadata: Metadata,
    ) -> RouterResult<Tenant> {
        let mut table = self.table.lock().await;

        if let Some(entry) = table.routes.get(tenant_id) {
            if entry.shard_id != shard_id {
                return Err(RouterError::AlreadyRegistered {
                    tenant_id: tenant_id.to_string(),
                    shard_id: entry.shard_id.clone(),
                });
            }
            debug!(%tenant_id, %shard_id, "tenant already registered");
            if let Some(existing) = self.store.get_tenant(tenant_id)? {
                return Ok(existing);
            }
            // Cached but missing from the store: re-persist without recounting.
            let tenant = self.new_tenant(tenant_id, shard_id, metadata)?;
            self.store.save_tenant(&tenant)?;
            return Ok(tenant);
        }

        let tenant = self.new_tenant(tenant_id, shard_id, metadata)?;
        self.store.save_tenant(&tenant)?;

        let seq = table.next_seq();
        table.routes.insert(
            tenant_id.to_string(),
            RouteEntry {
                shard_id: shard_id.to_string(),
                seq,
            },
        );
        let slot = table.slot_mut(shard_id, self.config.max_tenants_per_shard);
        slot.tenant_count += 1;
        let count = slot.tenant_count;
        drop(table);

        self.sync_shard_count(shard_id, count);
        self.audit(
            AuditEvent::new(EventType::TenantCreated)
                .tenant(tenant_id)
                .shard(shard_id)
                .project(&tenant.project_id),
        );
        info!(%tenant_id, %shard_id, tenant_count = count, "tenant registered");
        Ok(tenant)
    }

    /// Remove a tenant from routing and the store. Returns whether it existed.
    pub async fn unregister_tenant(&self, tenant_id: &str) -> RouterResult<bool> {
        let mut table = self.table.lock().await;

        let Some(shard_id) = table.routes.get(tenant_id).map(|e| e.shard_id.clone()) else {
            // Not routed; clear any stray store record.
            return Ok(self.store.delete_tenant(tenant_id)?);
        };

        self.store.delete_tenant(tenant_id)?;
        table.routes.remove(tenant_id);
        let slot = table.slot_mut(&shard_id, self.config.max_tenants_per_shard);
        slot.tenant_count = slot.tenant_count.saturating_sub(1);
        let count = slot.tenant_count;
        drop(table);

        self.sync_shard_count(&shard_id, count);
        self.audit(
            AuditEvent::new(EventType::TenantDeleted)
                .tenant(tenant_id)
                .shard(&shard_id),
        );
        info!(%tenant_id, %shard_id, tenant_count = count, "tenant unregistered");
        Ok(true)
    }

    // ── Placement ──────────────────────────────────────────────────

    /// Least-utilized known shard with spare capacity.
    ///
    /// Ties are broken by shard id. Fails with
    /// [`RouterError::CapacityExhausted`] when every known shard is full,
    /// which callers treat as the signal to provision a new shard.
    pub async fn optimal_shard(&self) -> RouterResult<String> {
        let table = self.table.lock().await;
        let mut loads = table.known_loads();
        // Stable sort over id-ordered input keeps the id tie-break.
        loads.sort_by(|a, b| a.utilization.total_cmp(&b.utilization));

        match loads.into_iter().find(ShardLoad::has_capacity) {
            Some(load) => {
                info!(
                    shard_id = %load.shard_id,
                    utilization = load.utilization,
                    "selected optimal shard"
                );
                Ok(load.shard_id)
            }
            None => {
                warn!("no known shard has spare capacity");
                Err(RouterError::CapacityExhausted)
            }
        }
    }

    /// First known shard with spare capacity, or a suggested id for the
    /// next shard to provision. The suggestion is not created here.
    pub async fn find_available_shard(&self) -> String {
        let table = self.table.lock().await;
        if let Some(load) = table.known_loads().into_iter().find(ShardLoad::has_capacity) {
            return load.shard_id;
        }

        let highest = table
            .shards
            .keys()
            .filter_map(|id| parse_shard_number(id))
            .max()
            .unwrap_or(0);
        let suggestion = format_shard_id(&self.config.shard_prefix, highest + 1);
        info!(shard_id = %suggestion, "no capacity available, suggesting new shard");
        suggestion
    }

    // ── Migration ──────────────────────────────────────────────────

    /// Move a tenant to `target_shard_id`.
    ///
    /// Returns `Ok(true)` when the tenant ends up on the target (including
    /// when it already was there) and `Ok(false)` without any state change
    /// when the target is full.
    pub async fn migrate_tenant(&self, tenant_id: &str, target_shard_id: &str) -> RouterResult<bool> {
        let mut table = self.table.lock().await;
        self.migrate_locked(&mut table, tenant_id, target_shard_id)
    }

    pub(crate) fn migrate_locked(
        &self,
        table: &mut RoutingTable,
        tenant_id: &str,
        target: &str,
    ) -> RouterResult<bool> {
        let source = table
            .routes
            .get(tenant_id)
            .map(|e| e.shard_id.clone())
            .ok_or_else(|| RouterError::TenantNotFound(tenant_id.to_string()))?;

        if source == target {
            debug!(%tenant_id, %target, "tenant already on target shard");
            return Ok(true);
        }

        let load = table
            .load(target)
            .ok_or_else(|| RouterError::ShardNotFound(target.to_string()))?;
        if !load.has_capacity() {
            warn!(%tenant_id, %target, "migration target at capacity");
            return Ok(false);
        }

        let project_id = self.project_for_shard(target)?;
        let mut tenant = match self.store.get_tenant(tenant_id)? {
            Some(t) => t,
            None => Tenant::new(tenant_id, &source, &project_id),
        };
        tenant.shard_id = target.to_string();
        tenant.project_id = project_id;
        self.store.save_tenant(&tenant)?;

        if let Some(entry) = table.routes.get_mut(tenant_id) {
            entry.shard_id = target.to_string();
        }
        let default_max = self.config.max_tenants_per_shard;
        let source_slot = table.slot_mut(&source, default_max);
        source_slot.tenant_count = source_slot.tenant_count.saturating_sub(1);
        let source_count = source_slot.tenant_count;
        let target_slot = table.slot_mut(target, default_max);
        target_slot.tenant_count += 1;
        let target_count = target_slot.tenant_count;

        self.sync_shard_count(&source, source_count);
        self.sync_shard_count(target, target_count);
        self.audit(
            AuditEvent::new(EventType::TenantMigrated)
                .tenant(tenant_id)
                .shard(target)
                .detail("from", source.as_str()),
        );
        info!(%tenant_id, from = %source, to = %target, "tenant migrated");
        Ok(true)
    }

    // ── Shard set ──────────────────────────────────────────────────

    /// Add a shard to the routable set (or update its capacity).
    pub async fn add_shard(&self, shard_id: &str, max_tenants: u32) {
        let mut table = self.table.lock().await;
        let slot = table.slot_mut(shard_id, max_tenants);
        slot.max_tenants = max_tenants;
        slot.known = true;
        info!(%shard_id, max_tenants, "shard added to routing pool");
    }

    /// Remove a shard from the routable set. Routes to it are kept and
    /// reported by [`validate_routing_consistency`](Self::validate_routing_consistency).
    pub async fn remove_shard(&self, shard_id: &str) -> bool {
        let mut table = self.table.lock().await;
        match table.shards.get_mut(shard_id) {
            Some(slot) if slot.known => {
                slot.known = false;
                info!(%shard_id, "shard removed from routing pool");
                true
            }
            _ => false,
        }
    }

    /// Change the capacity of a known shard.
    pub async fn set_shard_capacity(&self, shard_id: &str, max_tenants: u32) -> RouterResult<()> {
        let mut table = self.table.lock().await;
        match table.shards.get_mut(shard_id) {
            Some(slot) if slot.known => {
                slot.max_tenants = max_tenants;
                debug!(%shard_id, max_tenants, "shard capacity updated");
                Ok(())
            }
            _ => Err(RouterError::ShardNotFound(shard_id.to_string())),
        }
    }

    pub async fn shard_tenant_count(&self, shard_id: &str) -> u32 {
        let table = self.table.lock().await;
        table.shards.get(shard_id).map_or(0, |s| s.tenant_count)
    }

    pub async fn total_tenant_count(&self) -> usize {
        self.table.lock().await.routes.len()
    }

    /// Utilization of a known shard.
    pub async fn shard_utilization(&self, shard_id: &str) -> Option<f64> {
        self.table.lock().await.load(shard_id).map(|l| l.utilization)
    }

    /// Loads of all known shards, in shard id order.
    pub async fn shard_loads(&self) -> Vec<ShardLoad> {
        self.table.lock().await.known_loads()
    }

    // ── Diagnostics ────────────────────────────────────────────────

    /// Detect routes to unknown shards, hash/route mismatches, and shards
    /// over capacity.
    pub async fn validate_routing_consistency(&self) -> ConsistencyReport {
        let table = self.table.lock().await;

        let mut routes: Vec<(&String, &RouteEntry)> = table.routes.iter().collect();
        routes.sort_by(|a, b| a.0.cmp(b.0));

        let mut issues = Vec::new();
        let mut routing_mismatches = 0;
        for (tenant_id, entry) in routes {
            if !table.is_known(&entry.shard_id) {
                issues.push(format!(
                    "tenant {tenant_id} routed to unknown shard {}",
                    entry.shard_id
                ));
            }
            if entry.shard_id != self.hashed_shard(tenant_id) {
                routing_mismatches += 1;
            }
        }

        let capacity_violations: Vec<CapacityViolation> = table
            .shards
            .iter()
            .filter(|(_, s)| s.tenant_count > s.max_tenants)
            .map(|(id, s)| CapacityViolation {
                shard_id: id.clone(),
                tenant_count: s.tenant_count,
                max_tenants: s.max_tenants,
            })
            .collect();

        if !issues.is_empty() || !capacity_violations.is_empty() {
            warn!(
                issues = issues.len(),
                capacity_violations = capacity_violations.len(),
                "routing consistency problems detected"
            );
        }

        ConsistencyReport {
            timestamp: epoch_secs(),
            total_issues: issues.len(),
            issues,
            routing_mismatches,
            capacity_violations,
            total_tenants: table.routes.len(),
            total_shards: table.shards.values().filter(|s| s.known).count(),
        }
    }

    /// Routing counters since start.
    pub async fn statistics(&self) -> RoutingStats {
        let table = self.table.lock().await;
        let total_routes = self.counters.total_routes.load(Ordering::Relaxed);
        let cache_hits = self.counters.cache_hits.load(Ordering::Relaxed);
        let total_shards = table.shards.values().filter(|s| s.known).count();
        let total_tenants = table.routes.len();

        RoutingStats {
            total_routes,
            cache_hits,
            cache_misses: self.counters.cache_misses.load(Ordering::Relaxed),
            rebalance_operations: self.counters.rebalance_operations.load(Ordering::Relaxed),
            cache_hit_rate_percent: cache_hits as f64 / total_routes.max(1) as f64 * 100.0,
            total_tenants,
            total_shards,
            average_tenants_per_shard: total_tenants as f64 / total_shards.max(1) as f64,
        }
    }

    /// Explain how a tenant is (or would be) routed.
    pub async fn debug_routing(&self, tenant_id: &str) -> RoutingDebugInfo {
        let hashed = self.hashed_shard(tenant_id);
        let table = self.table.lock().await;
        let registered = table.routes.get(tenant_id).map(|e| e.shard_id.clone());

        let (shard_id, reason) = match registered {
            Some(id) if id == hashed => (id, "registered on its hash placement".to_string()),
            Some(id) => (id, "registered assignment overrides hash placement".to_string()),
            None => (hashed.clone(), "unregistered, hash placement".to_string()),
        };

        let mut loads = table.known_loads();
        loads.sort_by(|a, b| a.utilization.total_cmp(&b.utilization));
        let alternative_shards = loads
            .into_iter()
            .filter(|l| l.has_capacity() && l.shard_id != shard_id)
            .take(5)
            .map(|l| l.shard_id)
            .collect();

        RoutingDebugInfo {
            tenant_id: tenant_id.to_string(),
            tenant_hash: hash::tenant_hash(tenant_id),
            hashed_shard_id: hashed,
            shard_id,
            algorithm: "consistent_hashing",
            num_shards: self.config.num_shards,
            shard_selection_reason: reason,
            alternative_shards,
        }
    }

    // ── Helpers ────────────────────────────────────────────────────

    fn new_tenant(&self, tenant_id: &str, shard_id: &str, metadata: Metadata) -> RouterResult<Tenant> {
        let mut tenant = Tenant::new(tenant_id, shard_id, &self.project_for_shard(shard_id)?);
        tenant.metadata = metadata;
        Ok(tenant)
    }

    /// Project backing a shard: from the store, else derived the way the
    /// lifecycle manager names projects.
    fn project_for_shard(&self, shard_id: &str) -> RouterResult<String> {
        if let Some(shard) = self.store.get_shard(shard_id)? {
            return Ok(shard.project_id);
        }
        Ok(project_id_for_shard(&self.project_prefix, shard_id))
    }

    /// Mirror a counter into the store's shard record. Best-effort: the
    /// store copy is only eventually consistent with the router.
    pub(crate) fn sync_shard_count(&self, shard_id: &str, count: u32) {
        if let Err(e) = self
            .store
            .update_shard(shard_id, &mut |shard| shard.tenant_count = count)
        {
            warn!(%shard_id, error = %e, "failed to persist shard tenant count");
        }
    }

    pub(crate) fn audit(&self, event: AuditEvent) {
        if let Err(e) = self.store.save_audit_event(&event) {
            warn!(error = %e, event_type = ?event.event_type, "failed to record audit event");
        }
    }
}
