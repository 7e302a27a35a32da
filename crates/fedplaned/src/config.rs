//! fedplane.toml configuration.
//!
//! Every section and field has a default, so an empty file is valid:
//!
//! ```toml
//! [server]
//! port = 8080
//!
//! [store]
//! kind = "redb"
//! path = "/var/lib/fedplane/fedplane.redb"
//!
//! [routing]
//! num_shards = 1000
//! rebalance_interval_secs = 3600
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use fedplane_health::{AlertConfig, CapacityConfig, HealthConfig};
use fedplane_lifecycle::LifecycleConfig;
use fedplane_router::RoutingConfig;
use fedplane_state::{StoreConfig, StoreKind};

/// File name of the redb database inside `--data-dir`.
pub const DATABASE_FILE: &str = "fedplane.redb";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FedplaneConfig {
    pub server: ServerConfig,
    pub store: StoreConfig,
    pub routing: RoutingConfig,
    pub health: HealthConfig,
    pub alerts: AlertConfig,
    pub lifecycle: LifecycleConfig,
    pub capacity: CapacityConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0".to_string(),
            port: 8080,
        }
    }
}

/// Command-line values that take precedence over the file.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub port: Option<u16>,
    pub store: Option<StoreKind>,
    pub data_dir: Option<PathBuf>,
    pub num_shards: Option<u32>,
}

impl FedplaneConfig {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(content)?)
    }

    pub fn to_toml_string(&self) -> anyhow::Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    pub fn apply(&mut self, overrides: &Overrides) {
        if let Some(port) = overrides.port {
            self.server.port = port;
        }
        if let Some(kind) = overrides.store {
            self.store.kind = kind;
        }
        if let Some(dir) = &overrides.data_dir {
            self.store.path = Some(dir.join(DATABASE_FILE));
        }
        if let Some(n) = overrides.num_shards {
            self.routing.num_shards = n;
        }
    }

    /// Reject values the components cannot work with.
    pub fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(self.routing.num_shards > 0, "routing.num_shards must be positive");
        anyhow::ensure!(
            self.routing.max_tenants_per_shard > 0,
            "routing.max_tenants_per_shard must be positive"
        );
        anyhow::ensure!(
            self.lifecycle.default_max_tenants > 0,
            "lifecycle.default_max_tenants must be positive"
        );
        anyhow::ensure!(self.health.interval_secs > 0, "health.interval_secs must be positive");
        if self.store.kind == StoreKind::Redb {
            anyhow::ensure!(
                self.store.path.is_some(),
                "store.path (or --data-dir) is required for the redb store"
            );
        }
        Ok(())
    }
}
