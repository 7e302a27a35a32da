//! RedbStore — durable metadata backend on redb.
//!
//! All values are JSON-serialized into redb's `&[u8]` value columns. Each
//! upsert and delete runs in its own write transaction, which gives atomic
//! per-entity read-modify-write. The audit log is unbounded.

use std::path::Path;
use std::sync::Arc;

use redb::{Database, ReadableDatabase, ReadableTable, ReadableTableMetadata, TableDefinition};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::error::{StateError, StateResult};
use crate::store::MetadataStore;
use crate::tables::*;
use crate::types::*;

/// Convert any `Display` error into a `StateError` variant via a closure factory.
macro_rules! map_err {
    ($variant:ident) => {
        |e| StateError::$variant(e.to_string())
    };
}

type Table = TableDefinition<'static, &'static str, &'static [u8]>;

/// Thread-safe metadata store backed by redb.
#[derive(Clone)]
pub struct RedbStore {
    db: Arc<Database>,
}

impl RedbStore {
    /// Open (or create) a persistent store at the given path.
    pub fn open(path: &Path) -> StateResult<Self> {
        let db = Database::create(path).map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!(?path, "redb store opened");
        Ok(store)
    }

    /// Create an ephemeral in-memory redb database (for testing).
    pub fn open_in_memory() -> StateResult<Self> {
        let backend = redb::backends::InMemoryBackend::new();
        let db = Database::builder()
            .create_with_backend(backend)
            .map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        Ok(store)
    }

    fn ensure_tables(&self) -> StateResult<()> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        // Opening a table in a write transaction creates it if absent.
        for table in [TENANTS, SHARDS, PROJECTS, AUDIT_EVENTS] {
            txn.open_table(table).map_err(map_err!(Table))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    fn put<T: Serialize>(&self, table: Table, key: &str, value: &T) -> StateResult<()> {
        let bytes = serde_json::to_vec(value).map_err(map_err!(Serialize))?;
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut t = txn.open_table(table).map_err(map_err!(Table))?;
            t.insert(key, bytes.as_slice()).map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    fn get<T: DeserializeOwned>(&self, table: Table, key: &str) -> StateResult<Option<T>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let t = txn.open_table(table).map_err(map_err!(Table))?;
        match t.get(key).map_err(map_err!(Read))? {
            Some(guard) => {
                let value = serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?;
                Ok(Some(value))
            }
            None => Ok(None),
        }
    }

    fn scan<T: DeserializeOwned>(&self, table: Table) -> StateResult<Vec<T>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let t = txn.open_table(table).map_err(map_err!(Table))?;
        let mut results = Vec::new();
        for entry in t.iter().map_err(map_err!(Read))? {
            let (_, value) = entry.map_err(map_err!(Read))?;
            results.push(serde_json::from_slice(value.value()).map_err(map_err!(Deserialize))?);
        }
        Ok(results)
    }

    fn remove(&self, table: Table, key: &str) -> StateResult<bool> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let existed;
        {
            let mut t = txn.open_table(table).map_err(map_err!(Table))?;
            existed = t.remove(key).map_err(map_err!(Write))?.is_some();
        }
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(existed)
    }
}

impl MetadataStore for RedbStore {
    fn save_tenant(&self, tenant: &Tenant) -> StateResult<()> {
        self.put(TENANTS, &tenant.tenant_id, tenant)?;
        debug!(tenant_id = %tenant.tenant_id, shard_id = %tenant.shard_id, "tenant stored");
        Ok(())
    }

    fn get_tenant(&self, tenant_id: &str) -> StateResult<Option<Tenant>> {
        self.get(TENANTS, tenant_id)
    }

    fn get_all_tenants(&self) -> StateResult<Vec<Tenant>> {
        self.scan(TENANTS)
    }

    fn delete_tenant(&self, tenant_id: &str) -> StateResult<bool> {
        self.remove(TENANTS, tenant_id)
    }

    fn get_tenants_by_shard(&self, shard_id: &str) -> StateResult<Vec<Tenant>> {
        Ok(self
            .get_all_tenants()?
            .into_iter()
            .filter(|t| t.shard_id == shard_id)
            .collect())
    }

    fn save_shard(&self, shard: &Shard) -> StateResult<()> {
        self.put(SHARDS, &shard.shard_id, shard)
    }

    fn get_shard(&self, shard_id: &str) -> StateResult<Option<Shard>> {
        self.get(SHARDS, shard_id)
    }

    fn get_all_shards(&self) -> StateResult<Vec<Shard>> {
        self.scan(SHARDS)
    }

    fn update_shard(
        &self,
        shard_id: &str,
        apply: &mut dyn FnMut(&mut Shard),
    ) -> StateResult<Option<Shard>> {
        // Read and write in one write transaction; redb serializes writers.
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let updated = {
            let mut table = txn.open_table(SHARDS).map_err(map_err!(Table))?;
            let current: Option<Shard> = match table.get(shard_id).map_err(map_err!(Read))? {
                Some(guard) => {
                    Some(serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?)
                }
                None => None,
            };
            match current {
                Some(mut shard) => {
                    apply(&mut shard);
                    let bytes = serde_json::to_vec(&shard).map_err(map_err!(Serialize))?;
                    table
                        .insert(shard_id, bytes.as_slice())
                        .map_err(map_err!(Write))?;
                    Some(shard)
                }
                None => None,
            }
        };
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(updated)
    }

    fn delete_shard(&self, shard_id: &str) -> StateResult<bool> {
        self.remove(SHARDS, shard_id)
    }

    fn save_project(&self, project: &ProjectInfo) -> StateResult<()> {
        self.put(PROJECTS, &project.project_id, project)
    }

    fn get_project(&self, project_id: &str) -> StateResult<Option<ProjectInfo>> {
        self.get(PROJECTS, project_id)
    }

    fn get_all_projects(&self) -> StateResult<Vec<ProjectInfo>> {
        self.scan(PROJECTS)
    }

    fn delete_project(&self, project_id: &str) -> StateResult<bool> {
        self.remove(PROJECTS, project_id)
    }

    fn save_audit_event(&self, event: &AuditEvent) -> StateResult<()> {
        let bytes = serde_json::to_vec(event).map_err(map_err!(Serialize))?;
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut table = txn.open_table(AUDIT_EVENTS).map_err(map_err!(Table))?;
            // Next sequence = last key + 1, read inside the same write transaction.
            let next = match table.last().map_err(map_err!(Read))? {
                Some((key, _)) => key.value().parse::<u64>().unwrap_or(0) + 1,
                None => 0,
            };
            let key = audit_key(next);
            table
                .insert(key.as_str(), bytes.as_slice())
                .map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    fn get_audit_events(&self, limit: usize, offset: usize) -> StateResult<Vec<AuditEvent>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(AUDIT_EVENTS).map_err(map_err!(Table))?;
        let mut results = Vec::new();
        for entry in table.iter().map_err(map_err!(Read))?.rev().skip(offset).take(limit) {
            let (_, value) = entry.map_err(map_err!(Read))?;
            results.push(serde_json::from_slice(value.value()).map_err(map_err!(Deserialize))?);
        }
        Ok(results)
    }

    fn audit_event_count(&self) -> StateResult<usize> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(AUDIT_EVENTS).map_err(map_err!(Table))?;
        Ok(table.len().map_err(map_err!(Read))? as usize)
    }
}
