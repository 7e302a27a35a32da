//! redb table definitions for the durable metadata store.
//!
//! Each table uses `&str` keys and `&[u8]` values (JSON-serialized domain types).

use redb::TableDefinition;

/// Tenants keyed by `{tenant_id}`.
pub const TENANTS: TableDefinition<&str, &[u8]> = TableDefinition::new("tenants");

/// Shards keyed by `{shard_id}`.
pub const SHARDS: TableDefinition<&str, &[u8]> = TableDefinition::new("shards");

/// Projects keyed by `{project_id}`.
pub const PROJECTS: TableDefinition<&str, &[u8]> = TableDefinition::new("projects");

/// Audit events keyed by a zero-padded append sequence, so key order is
/// insertion order.
pub const AUDIT_EVENTS: TableDefinition<&str, &[u8]> = TableDefinition::new("audit_events");

/// Width of the zero-padded audit sequence key.
pub const AUDIT_KEY_WIDTH: usize = 20;

/// Build the audit table key for a sequence number.
pub fn audit_key(seq: u64) -> String {
    format!("{seq:0width$}", width = AUDIT_KEY_WIDTH)
}
