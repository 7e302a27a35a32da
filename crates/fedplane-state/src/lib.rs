//! fedplane-state — metadata store for the fedplane control plane.
//!
//! The store is the single source of truth for tenants, shards, projects,
//! and the audit trail. Routers and monitors keep caches of this state but
//! fall back to the store on a cache miss or restart.
//!
//! # Backends
//!
//! ```text
//! MetadataStore (trait)
//!   ├── MemoryStore  — RwLock-guarded maps, bounded audit ring
//!   └── RedbStore    — redb tables, JSON values, unbounded audit log
//! ```
//!
//! Backends are selected through [`StoreConfig`] and [`open_store`], so
//! callers only ever hold an `Arc<dyn MetadataStore>`.

pub mod error;
pub mod memory;
pub mod redb_store;
pub mod store;
pub mod tables;
pub mod types;

pub use error::{StateError, StateResult};
pub use memory::MemoryStore;
pub use redb_store::RedbStore;
pub use store::{MetadataStore, StoreConfig, StoreKind, StoreStats, open_store};
pub use types::*;
