//! MemoryStore — volatile metadata backend for development and tests.
//!
//! All collections live behind a single `RwLock`, so every operation is
//! atomic with respect to every other. The audit log is a ring that evicts
//! the oldest events once `audit_capacity` is reached.

use std::collections::{BTreeSet, HashMap, VecDeque};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use tracing::debug;

use crate::error::{StateError, StateResult};
use crate::store::MetadataStore;
use crate::types::*;

const DEFAULT_AUDIT_CAPACITY: usize = 10_000;

#[derive(Default)]
struct Inner {
    tenants: HashMap<String, Tenant>,
    shards: HashMap<String, Shard>,
    projects: HashMap<String, ProjectInfo>,
    audit: VecDeque<AuditEvent>,
    /// shard_id → tenant ids, kept in step with `tenants`.
    tenants_by_shard: HashMap<String, BTreeSet<String>>,
}

impl Inner {
    fn unindex(&mut self, tenant_id: &str, shard_id: &str) {
        if let Some(ids) = self.tenants_by_shard.get_mut(shard_id) {
            ids.remove(tenant_id);
            if ids.is_empty() {
                self.tenants_by_shard.remove(shard_id);
            }
        }
    }
}

/// In-memory metadata store.
pub struct MemoryStore {
    inner: RwLock<Inner>,
    audit_capacity: usize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::with_audit_capacity(DEFAULT_AUDIT_CAPACITY)
    }

    /// Create a store whose audit ring holds at most `audit_capacity` events.
    pub fn with_audit_capacity(audit_capacity: usize) -> Self {
        Self {
            inner: RwLock::new(Inner::default()),
            audit_capacity: audit_capacity.max(1),
        }
    }

    /// Seed `count` development shards (`<prefix>-001` …) unless present.
    pub fn seed_shards(&self, count: u32, prefix: &str, region: &str) -> StateResult<()> {
        let mut inner = self.write()?;
        for n in 1..=count {
            let shard_id = format!("{prefix}-{n:03}");
            inner.shards.entry(shard_id.clone()).or_insert_with(|| {
                let url = format!("https://{shard_id}-control-plane.run.app");
                Shard::new(&shard_id, &shard_id, region, &url)
            });
        }
        debug!(count, %prefix, "seeded development shards");
        Ok(())
    }

    fn read(&self) -> StateResult<RwLockReadGuard<'_, Inner>> {
        self.inner.read().map_err(|_| StateError::Poisoned)
    }

    fn write(&self) -> StateResult<RwLockWriteGuard<'_, Inner>> {
        self.inner.write().map_err(|_| StateError::Poisoned)
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MetadataStore for MemoryStore {
    fn save_tenant(&self, tenant: &Tenant) -> StateResult<()> {
        let mut inner = self.write()?;
        let previous = inner
            .tenants
            .insert(tenant.tenant_id.clone(), tenant.clone());
        if let Some(prev) = previous
            && prev.shard_id != tenant.shard_id
        {
            inner.unindex(&prev.tenant_id, &prev.shard_id);
        }
        inner
            .tenants_by_shard
            .entry(tenant.shard_id.clone())
            .or_default()
            .insert(tenant.tenant_id.clone());
        Ok(())
    }

    fn get_tenant(&self, tenant_id: &str) -> StateResult<Option<Tenant>> {
        Ok(self.read()?.tenants.get(tenant_id).cloned())
    }

    fn get_all_tenants(&self) -> StateResult<Vec<Tenant>> {
        Ok(self.read()?.tenants.values().cloned().collect())
    }

    fn delete_tenant(&self, tenant_id: &str) -> StateResult<bool> {
        let mut inner = self.write()?;
        match inner.tenants.remove(tenant_id) {
            Some(tenant) => {
                inner.unindex(tenant_id, &tenant.shard_id);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn get_tenants_by_shard(&self, shard_id: &str) -> StateResult<Vec<Tenant>> {
        let inner = self.read()?;
        Ok(inner
            .tenants_by_shard
            .get(shard_id)
            .into_iter()
            .flatten()
            .filter_map(|id| inner.tenants.get(id).cloned())
            .collect())
    }

    fn save_shard(&self, shard: &Shard) -> StateResult<()> {
        self.write()?
            .shards
            .insert(shard.shard_id.clone(), shard.clone());
        Ok(())
    }

    fn get_shard(&self, shard_id: &str) -> StateResult<Option<Shard>> {
        Ok(self.read()?.shards.get(shard_id).cloned())
    }

    fn get_all_shards(&self) -> StateResult<Vec<Shard>> {
        Ok(self.read()?.shards.values().cloned().collect())
    }

    fn update_shard(
        &self,
        shard_id: &str,
        apply: &mut dyn FnMut(&mut Shard),
    ) -> StateResult<Option<Shard>> {
        let mut inner = self.write()?;
        Ok(inner.shards.get_mut(shard_id).map(|shard| {
            apply(shard);
            shard.clone()
        }))
    }

    fn delete_shard(&self, shard_id: &str) -> StateResult<bool> {
        let mut inner = self.write()?;
        inner.tenants_by_shard.remove(shard_id);
        Ok(inner.shards.remove(shard_id).is_some())
    }

    fn save_project(&self, project: &ProjectInfo) -> StateResult<()> {
        self.write()?
            .projects
            .insert(project.project_id.clone(), project.clone());
        Ok(())
    }

    fn get_project(&self, project_id: &str) -> StateResult<Option<ProjectInfo>> {
        Ok(self.read()?.projects.get(project_id).cloned())
    }

    fn get_all_projects(&self) -> StateResult<Vec<ProjectInfo>> {
        Ok(self.read()?.projects.values().cloned().collect())
    }

    fn delete_project(&self, project_id: &str) -> StateResult<bool> {
        Ok(self.write()?.projects.remove(project_id).is_some())
    }

    fn save_audit_event(&self, event: &AuditEvent) -> StateResult<()> {
        let mut inner = self.write()?;
        inner.audit.push_back(event.clone());
        while inner.audit.len() > self.audit_capacity {
            inner.audit.pop_front();
        }
        Ok(())
    }

    fn get_audit_events(&self, limit: usize, offset: usize) -> StateResult<Vec<AuditEvent>> {
        // The ring is in append order; newest-first is a reverse walk.
        Ok(self
            .read()?
            .audit
            .iter()
            .rev()
            .skip(offset)
            .take(limit)
            .cloned()
            .collect())
    }

    fn audit_event_count(&self) -> StateResult<usize> {
        Ok(self.read()?.audit.len())
    }
}
