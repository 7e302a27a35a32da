//! The router, lifecycle manager, and health monitor wired over one
//! metadata store.
//!
//! Flows that span components live here so handlers stay thin.

use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;
use tracing::info;

use fedplane_health::{HealthError, HealthMonitor};
use fedplane_lifecycle::{LifecycleError, ShardLifecycleManager};
use fedplane_router::{RouterError, TenantRouter};
use fedplane_state::{Metadata, MetadataStore, Shard, StateError};

#[derive(Debug, Error)]
pub enum FederationError {
    #[error("no shard {shard_id} for tenant {tenant_id}")]
    RouteNotFound { tenant_id: String, shard_id: String },

    #[error(transparent)]
    Router(#[from] RouterError),

    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),

    #[error(transparent)]
    Health(#[from] HealthError),

    #[error("state store error: {0}")]
    State(#[from] StateError),
}

pub type FederationResult<T> = Result<T, FederationError>;

/// Where a tenant's traffic goes.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct TenantRoute {
    pub tenant_id: String,
    pub shard_id: String,
    pub project_id: String,
    pub control_plane_url: String,
    pub region: String,
    /// False when the route is only the hash placement of an unknown tenant.
    pub registered: bool,
}

impl TenantRoute {
    fn new(tenant_id: &str, shard: &Shard, registered: bool) -> Self {
        Self {
            tenant_id: tenant_id.to_string(),
            shard_id: shard.shard_id.clone(),
            project_id: shard.project_id.clone(),
            control_plane_url: shard.control_plane_url.clone(),
            region: shard.region.clone(),
            registered,
        }
    }
}

/// Result of a tenant creation request.
#[derive(Debug, Clone, Serialize)]
pub struct TenantPlacement {
    #[serde(flatten)]
    pub route: TenantRoute,
    /// False when the tenant was already registered.
    pub created: bool,
}

pub struct Federation {
    pub store: Arc<dyn MetadataStore>,
    pub router: Arc<TenantRouter>,
    pub lifecycle: Arc<ShardLifecycleManager>,
    pub monitor: Arc<HealthMonitor>,
}

impl Federation {
    pub fn new(
        store: Arc<dyn MetadataStore>,
        router: Arc<TenantRouter>,
        lifecycle: Arc<ShardLifecycleManager>,
        monitor: Arc<HealthMonitor>,
    ) -> Self {
        Self {
            store,
            router,
            lifecycle,
            monitor,
        }
    }

    /// Load router and lifecycle caches from the store.
    pub async fn initialize(&self) -> FederationResult<()> {
        self.lifecycle.initialize().await?;
        self.router.initialize().await?;
        Ok(())
    }

    // ── Tenants ────────────────────────────────────────────────────

    /// Place a new tenant on the least-loaded shard, provisioning a shard
    /// when every known one is full. Idempotent for registered tenants.
    pub async fn create_tenant(
        &self,
        tenant_id: &str,
        metadata: Metadata,
    ) -> FederationResult<TenantPlacement> {
        if let Some(shard_id) = self.router.lookup(tenant_id).await {
            let shard = self.lifecycle.ensure_shard_exists(&shard_id).await?;
            return Ok(TenantPlacement {
                route: TenantRoute::new(tenant_id, &shard, true),
                created: false,
            });
        }

        let shard_id = match self.router.optimal_shard().await {
            Ok(shard_id) => shard_id,
            Err(RouterError::CapacityExhausted) => self.router.find_available_shard().await,
            Err(e) => return Err(e.into()),
        };
        let shard = self.lifecycle.ensure_shard_exists(&shard_id).await?;
        self.router.add_shard(&shard.shard_id, shard.max_tenants).await;

        match self
            .router
            .register_tenant_with(tenant_id, &shard.shard_id, metadata)
            .await
        {
            Ok(_) => {
                info!(%tenant_id, shard_id = %shard.shard_id, "tenant created");
                Ok(TenantPlacement {
                    route: TenantRoute::new(tenant_id, &shard, true),
                    created: true,
                })
            }
            // Lost a race with a concurrent create of the same tenant.
            Err(RouterError::AlreadyRegistered { shard_id, .. }) => {
                let shard = self.lifecycle.ensure_shard_exists(&shard_id).await?;
                Ok(TenantPlacement {
                    route: TenantRoute::new(tenant_id, &shard, true),
                    created: false,
                })
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Route of a tenant. Unregistered tenants get their hash placement,
    /// which must name an existing shard.
    pub async fn route(&self, tenant_id: &str) -> FederationResult<TenantRoute> {
        let registered = self.router.lookup(tenant_id).await;
        let shard_id = match &registered {
            Some(shard_id) => shard_id.clone(),
            None => self.router.shard_for_tenant(tenant_id).await,
        };
        match self.lifecycle.get_shard_info(&shard_id).await? {
            Some(shard) => Ok(TenantRoute::new(tenant_id, &shard, registered.is_some())),
            None => Err(FederationError::RouteNotFound {
                tenant_id: tenant_id.to_string(),
                shard_id,
            }),
        }
    }

    pub async fn delete_tenant(&self, tenant_id: &str) -> FederationResult<bool> {
        Ok(self.router.unregister_tenant(tenant_id).await?)
    }

    pub async fn migrate_tenant(&self, tenant_id: &str, target_shard_id: &str) -> FederationResult<bool> {
        Ok(self.router.migrate_tenant(tenant_id, target_shard_id).await?)
    }

    // ── Shards ─────────────────────────────────────────────────────

    /// Provision a shard and make it routable.
    pub async fn create_shard(&self, shard_id: &str, region: Option<&str>) -> FederationResult<Shard> {
        let shard = self.lifecycle.create_shard_project(shard_id, region).await?;
        self.router.add_shard(&shard.shard_id, shard.max_tenants).await;
        Ok(shard)
    }

    /// Delete a project and take its shard out of the routing pool.
    /// Returns `Ok(false)` when the deletion did not go through.
    pub async fn delete_project(&self, project_id: &str) -> FederationResult<bool> {
        let project = self
            .lifecycle
            .get_project_info(project_id)?
            .ok_or_else(|| LifecycleError::ProjectNotFound(project_id.to_string()))?;
        if !self.lifecycle.delete_project(project_id).await {
            return Ok(false);
        }
        if let Some(shard_id) = project.shard_id {
            self.router.remove_shard(&shard_id).await;
        }
        Ok(true)
    }

    /// Change a shard's tenant capacity in the store and the router.
    pub async fn scale_shard(&self, shard_id: &str, max_tenants: u32) -> FederationResult<Shard> {
        let shard = self
            .lifecycle
            .scale_shard_resources(shard_id, max_tenants)
            .await?;
        self.router.add_shard(shard_id, max_tenants).await;
        Ok(shard)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use fedplane_health::HealthConfig;
    use fedplane_lifecycle::{LifecycleConfig, ProvisioningStep, SimulatedProvisioner};
    use fedplane_router::RoutingConfig;
    use fedplane_state::MemoryStore;

    pub(crate) fn federation_with(
        provisioner: SimulatedProvisioner,
        max_tenants: u32,
    ) -> Arc<Federation> {
        let store: Arc<dyn MetadataStore> = Arc::new(MemoryStore::new());
        let routing = RoutingConfig {
            max_tenants_per_shard: max_tenants,
            ..RoutingConfig::default()
        };
        let lifecycle_config = LifecycleConfig {
            default_max_tenants: max_tenants,
            ..LifecycleConfig::default()
        };
        Arc::new(Federation::new(
            store.clone(),
            Arc::new(TenantRouter::new(store.clone(), routing)),
            Arc::new(ShardLifecycleManager::new(
                store.clone(),
                Arc::new(provisioner),
                lifecycle_config,
            )),
            Arc::new(HealthMonitor::new(store, HealthConfig::default())),
        ))
    }

    pub(crate) fn federation(max_tenants: u32) -> Arc<Federation> {
        federation_with(SimulatedProvisioner::new(), max_tenants)
    }

    #[tokio::test]
    async fn first_tenant_provisions_first_shard() {
        let fed = federation(2);
        let placement = fed.create_tenant("acme", Metadata::new()).await.unwrap();
        assert!(placement.created);
        assert_eq!(placement.route.shard_id, "aipress-shard-001");
        assert_eq!(
            placement.route.control_plane_url,
            "https://aipress-shard-001-control-plane.run.app"
        );
        assert_eq!(fed.router.shard_tenant_count("aipress-shard-001").await, 1);
    }

    #[tokio::test]
    async fn create_is_idempotent() {
        let fed = federation(2);
        let first = fed.create_tenant("acme", Metadata::new()).await.unwrap();
        let second = fed.create_tenant("acme", Metadata::new()).await.unwrap();
        assert!(!second.created);
        assert_eq!(first.route, second.route);
        assert_eq!(fed.router.total_tenant_count().await, 1);
    }

    #[tokio::test]
    async fn full_shards_trigger_new_shard() {
        let fed = federation(2);
        for tenant in ["a", "b", "c", "d", "e"] {
            fed.create_tenant(tenant, Metadata::new()).await.unwrap();
        }
        assert_eq!(fed.router.shard_tenant_count("aipress-shard-001").await, 2);
        assert_eq!(fed.router.shard_tenant_count("aipress-shard-002").await, 2);
        assert_eq!(fed.router.shard_tenant_count("aipress-shard-003").await, 1);
        assert_eq!(fed.lifecycle.list_shards().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn provisioning_failure_propagates() {
        let fed = federation_with(
            SimulatedProvisioner::failing_at(ProvisioningStep::ConfigureIam),
            2,
        );
        let err = fed.create_tenant("acme", Metadata::new()).await.unwrap_err();
        assert!(matches!(
            err,
            FederationError::Lifecycle(LifecycleError::Provisioning { .. })
        ));
        assert!(fed.router.lookup("acme").await.is_none());
    }

    #[tokio::test]
    async fn route_of_unknown_tenant_needs_existing_shard() {
        let fed = federation(2);
        let err = fed.route("acme").await.unwrap_err();
        assert!(matches!(
            err,
            FederationError::RouteNotFound { ref shard_id, .. } if shard_id == "aipress-shard-358"
        ));

        fed.create_shard("aipress-shard-358", None).await.unwrap();
        let route = fed.route("acme").await.unwrap();
        assert!(!route.registered);
        assert_eq!(route.shard_id, "aipress-shard-358");
    }

    #[tokio::test]
    async fn deleted_project_leaves_routing_pool() {
        let fed = federation(2);
        let shard = fed.create_shard("aipress-shard-001", None).await.unwrap();
        assert!(fed.delete_project(&shard.project_id).await.unwrap());
        assert!(matches!(
            fed.router.optimal_shard().await,
            Err(RouterError::CapacityExhausted)
        ));
    }

    #[tokio::test]
    async fn scaling_updates_router_capacity() {
        let fed = federation(1);
        fed.create_tenant("a", Metadata::new()).await.unwrap();
        fed.scale_shard("aipress-shard-001", 3).await.unwrap();
        let placement = fed.create_tenant("b", Metadata::new()).await.unwrap();
        assert_eq!(placement.route.shard_id, "aipress-shard-001");
    }
}
