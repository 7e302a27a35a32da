//! ShardLifecycleManager — brings shards into existence and tracks their
//! backing projects.
//!
//! Shard records are cached in memory after first use. Creation is
//! serialized so two callers ensuring the same missing shard provision it
//! once.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, error, info, warn};

use fedplane_state::{
    AuditEvent, EventType, Metadata, MetadataStore, ProjectInfo, ProjectStatus, Shard,
    ShardHealth, epoch_secs, project_id_for_shard,
};

use crate::config::LifecycleConfig;
use crate::error::{LifecycleError, LifecycleResult};
use crate::provisioner::{ProjectRequest, ProvisioningStep, ShardProvisioner};

/// Placeholder monthly cost of a project.
#[derive(Debug, Clone, Serialize)]
pub struct ProjectCosts {
    pub project_id: String,
    pub timestamp: u64,
    pub current_month_cost: f64,
    pub projected_month_cost: f64,
    pub cost_breakdown: CostBreakdown,
    pub currency: &'static str,
}

#[derive(Debug, Clone, Serialize)]
pub struct CostBreakdown {
    pub compute: f64,
    pub database: f64,
    pub storage: f64,
    pub network: f64,
}

/// Shards, tenants, and capacity of one region.
#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct RegionSummary {
    pub shards: usize,
    pub tenants: u32,
    pub capacity: u32,
}

/// Aggregate snapshot of all shards and projects.
#[derive(Debug, Clone, Serialize)]
pub struct FederationStatus {
    pub timestamp: u64,
    pub total_projects: usize,
    pub active_projects: usize,
    pub total_shards: usize,
    pub healthy_shards: usize,
    pub unhealthy_shards: usize,
    /// Shard count per health status.
    pub health_distribution: BTreeMap<String, usize>,
    pub total_capacity: u32,
    pub used_capacity: u32,
    pub utilization_percent: f64,
    pub regional_distribution: BTreeMap<String, RegionSummary>,
    pub statistics: LifecycleStats,
}

/// Lifecycle counters since start.
#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct LifecycleStats {
    pub shards_created: u64,
    pub projects_deleted: u64,
    pub creation_failures: u64,
    pub active_projects: usize,
}

#[derive(Default)]
struct Counters {
    shards_created: AtomicU64,
    projects_deleted: AtomicU64,
    creation_failures: AtomicU64,
}

/// Creates and tears down shards and keeps their records current.
pub struct ShardLifecycleManager {
    store: Arc<dyn MetadataStore>,
    provisioner: Arc<dyn ShardProvisioner>,
    config: LifecycleConfig,
    shards: RwLock<HashMap<String, Shard>>,
    create_lock: Mutex<()>,
    counters: Counters,
}

impl ShardLifecycleManager {
    pub fn new(
        store: Arc<dyn MetadataStore>,
        provisioner: Arc<dyn ShardProvisioner>,
        config: LifecycleConfig,
    ) -> Self {
        Self {
            store,
            provisioner,
            config,
            shards: RwLock::new(HashMap::new()),
            create_lock: Mutex::new(()),
            counters: Counters::default(),
        }
    }

    pub fn config(&self) -> &LifecycleConfig {
        &self.config
    }

    /// Warm the shard cache from the store.
    pub async fn initialize(&self) -> LifecycleResult<()> {
        let shards = self.store.get_all_shards()?;
        let projects = self.store.get_all_projects()?;
        let mut cache = self.shards.write().await;
        cache.clear();
        for shard in shards {
            cache.insert(shard.shard_id.clone(), shard);
        }
        info!(
            shards = cache.len(),
            projects = projects.len(),
            "lifecycle manager initialized"
        );
        Ok(())
    }

    // ── Provisioning ───────────────────────────────────────────────

    /// Return the shard, creating it if neither the cache nor the store
    /// knows it. Idempotent.
    pub async fn ensure_shard_exists(&self, shard_id: &str) -> LifecycleResult<Shard> {
        if let Some(shard) = self.lookup(shard_id).await? {
            return Ok(shard);
        }

        let _guard = self.create_lock.lock().await;
        // Another caller may have created it while we waited.
        if let Some(shard) = self.lookup(shard_id).await? {
            return Ok(shard);
        }
        info!(%shard_id, "shard does not exist, creating");
        self.provision(shard_id, None).await
    }

    /// Provision a new shard and its backing project. Fails with
    /// `ShardExists` if the shard is already provisioned.
    ///
    /// A failure after the project record is written leaves it in `error`
    /// status; nothing is rolled back.
    pub async fn create_shard_project(
        &self,
        shard_id: &str,
        region: Option<&str>,
    ) -> LifecycleResult<Shard> {
        let _guard = self.create_lock.lock().await;
        if self.lookup(shard_id).await?.is_some() {
            return Err(LifecycleError::ShardExists(shard_id.to_string()));
        }
        self.provision(shard_id, region).await
    }

    async fn provision(&self, shard_id: &str, region: Option<&str>) -> LifecycleResult<Shard> {
        let project_id = self.project_id_for(shard_id);
        let region = region.unwrap_or(&self.config.default_region).to_string();
        let request = ProjectRequest {
            project_id: project_id.clone(),
            project_name: format!("Shard {shard_id}"),
            shard_id: shard_id.to_string(),
            region: region.clone(),
            billing_account: self.config.billing_account.clone(),
            organization_id: self.config.organization_id.clone(),
        };

        let mut project = ProjectInfo {
            project_id: project_id.clone(),
            project_name: request.project_name.clone(),
            shard_id: Some(shard_id.to_string()),
            status: ProjectStatus::Creating,
            region: region.clone(),
            billing_account: request.billing_account.clone(),
            organization_id: request.organization_id.clone(),
            created_at: epoch_secs(),
            resource_usage: Metadata::new(),
            cost_data: Metadata::new(),
        };
        self.store.save_project(&project)?;
        info!(%shard_id, %project_id, %region, "creating shard project");

        if let Err(e) = self.provisioner.create_project(&request).await {
            return Err(self.fail(&mut project, shard_id, ProvisioningStep::CreateProject, e));
        }

        let mut endpoint = None;
        for step in ProvisioningStep::CONFIGURATION {
            debug!(%project_id, %step, "configuring project");
            match self.provisioner.configure(&project_id, step).await {
                Ok(Some(url)) => endpoint = Some(url),
                Ok(None) => {}
                Err(e) => return Err(self.fail(&mut project, shard_id, step, e)),
            }
        }
        let endpoint =
            endpoint.unwrap_or_else(|| format!("https://{project_id}-control-plane.run.app"));

        project.status = ProjectStatus::Active;
        self.store.save_project(&project)?;

        let mut shard = Shard::new(shard_id, &project_id, &region, &endpoint);
        shard.max_tenants = self.config.default_max_tenants;
        self.store.save_shard(&shard)?;
        self.shards
            .write()
            .await
            .insert(shard_id.to_string(), shard.clone());

        self.counters.shards_created.fetch_add(1, Ordering::Relaxed);
        self.audit(
            AuditEvent::new(EventType::ShardCreated)
                .actor("lifecycle")
                .shard(shard_id)
                .project(&project_id)
                .detail("region", region.as_str()),
        );
        info!(%shard_id, %project_id, %endpoint, "shard created");
        Ok(shard)
    }

    /// Record a provisioning failure and build the error to return.
    fn fail(
        &self,
        project: &mut ProjectInfo,
        shard_id: &str,
        step: ProvisioningStep,
        cause: anyhow::Error,
    ) -> LifecycleError {
        project.status = ProjectStatus::Error;
        if let Err(e) = self.store.save_project(project) {
            warn!(project_id = %project.project_id, error = %e, "failed to mark project as errored");
        }
        self.counters.creation_failures.fetch_add(1, Ordering::Relaxed);
        self.audit(
            AuditEvent::new(EventType::ShardCreated)
                .actor("lifecycle")
                .shard(shard_id)
                .project(&project.project_id)
                .detail("step", step.as_str())
                .failed(&cause),
        );
        error!(%shard_id, %step, error = %cause, "shard provisioning failed");
        LifecycleError::Provisioning {
            shard_id: shard_id.to_string(),
            step: step.to_string(),
            reason: cause.to_string(),
        }
    }

    /// Project id for a shard: `<project_prefix>-<shard number suffix>`.
    pub fn project_id_for(&self, shard_id: &str) -> String {
        project_id_for_shard(&self.config.project_prefix, shard_id)
    }

    // ── Queries ────────────────────────────────────────────────────

    async fn lookup(&self, shard_id: &str) -> LifecycleResult<Option<Shard>> {
        if let Some(shard) = self.shards.read().await.get(shard_id) {
            return Ok(Some(shard.clone()));
        }
        match self.store.get_shard(shard_id)? {
            Some(shard) => {
                self.shards
                    .write()
                    .await
                    .insert(shard_id.to_string(), shard.clone());
                Ok(Some(shard))
            }
            None => Ok(None),
        }
    }

    /// Current shard record. The store copy wins over the cache since the
    /// router and the health monitor update it.
    pub async fn get_shard_info(&self, shard_id: &str) -> LifecycleResult<Option<Shard>> {
        match self.store.get_shard(shard_id)? {
            Some(shard) => {
                self.shards
                    .write()
                    .await
                    .insert(shard_id.to_string(), shard.clone());
                Ok(Some(shard))
            }
            None => Ok(self.shards.read().await.get(shard_id).cloned()),
        }
    }

    pub fn get_project_info(&self, project_id: &str) -> LifecycleResult<Option<ProjectInfo>> {
        Ok(self.store.get_project(project_id)?)
    }

    /// All projects, ordered by id.
    pub fn list_projects(&self) -> LifecycleResult<Vec<ProjectInfo>> {
        let mut projects = self.store.get_all_projects()?;
        projects.sort_by(|a, b| a.project_id.cmp(&b.project_id));
        Ok(projects)
    }

    /// All shards, ordered by id.
    pub fn list_shards(&self) -> LifecycleResult<Vec<Shard>> {
        let mut shards = self.store.get_all_shards()?;
        shards.sort_by(|a, b| a.shard_id.cmp(&b.shard_id));
        Ok(shards)
    }

    // ── Mutation ───────────────────────────────────────────────────

    pub fn update_project_status(
        &self,
        project_id: &str,
        status: ProjectStatus,
    ) -> LifecycleResult<ProjectInfo> {
        let mut project = self
            .store
            .get_project(project_id)?
            .ok_or_else(|| LifecycleError::ProjectNotFound(project_id.to_string()))?;
        project.status = status;
        self.store.save_project(&project)?;
        debug!(%project_id, ?status, "project status updated");
        Ok(project)
    }

    /// Set a shard's tenant capacity.
    pub async fn scale_shard_resources(
        &self,
        shard_id: &str,
        target_capacity: u32,
    ) -> LifecycleResult<Shard> {
        let mut previous = 0;
        let shard = self
            .store
            .update_shard(shard_id, &mut |shard| {
                previous = shard.max_tenants;
                shard.max_tenants = target_capacity;
            })?
            .ok_or_else(|| LifecycleError::ShardNotFound(shard_id.to_string()))?;
        self.shards
            .write()
            .await
            .insert(shard_id.to_string(), shard.clone());
        info!(%shard_id, previous, target_capacity, "shard capacity scaled");
        Ok(shard)
    }

    /// Delete a project, its backing resource, and its shard record.
    ///
    /// Best-effort: failures are logged and reported as `false`.
    pub async fn delete_project(&self, project_id: &str) -> bool {
        let project = match self.store.get_project(project_id) {
            Ok(Some(project)) => project,
            Ok(None) => {
                warn!(%project_id, "delete requested for unknown project");
                return false;
            }
            Err(e) => {
                error!(%project_id, error = %e, "failed to load project for deletion");
                return false;
            }
        };
        info!(%project_id, "deleting project");

        let mut deleting = project.clone();
        deleting.status = ProjectStatus::Deleting;
        if let Err(e) = self.store.save_project(&deleting) {
            warn!(%project_id, error = %e, "failed to mark project as deleting");
        }

        if let Err(e) = self.provisioner.delete_project(project_id).await {
            error!(%project_id, error = %e, "failed to delete backing project");
            deleting.status = ProjectStatus::Error;
            if let Err(e) = self.store.save_project(&deleting) {
                warn!(%project_id, error = %e, "failed to mark project as errored");
            }
            return false;
        }

        let shard_id = match project.shard_id.clone() {
            Some(id) => Some(id),
            None => self.shard_for_project(project_id).await,
        };

        if let Err(e) = self.store.delete_project(project_id) {
            error!(%project_id, error = %e, "failed to remove project record");
            return false;
        }
        if let Some(shard_id) = &shard_id {
            if let Err(e) = self.store.delete_shard(shard_id) {
                error!(%project_id, %shard_id, error = %e, "failed to remove shard record");
                return false;
            }
            self.shards.write().await.remove(shard_id);
        }

        self.counters.projects_deleted.fetch_add(1, Ordering::Relaxed);
        let mut event = AuditEvent::new(EventType::ShardDeleted)
            .actor("lifecycle")
            .project(project_id);
        if let Some(shard_id) = &shard_id {
            event = event.shard(shard_id);
        }
        self.audit(event);
        info!(%project_id, shard_id = ?shard_id, "project deleted");
        true
    }

    async fn shard_for_project(&self, project_id: &str) -> Option<String> {
        self.shards
            .read()
            .await
            .values()
            .find(|s| s.project_id == project_id)
            .map(|s| s.shard_id.clone())
    }

    /// Delete every project stuck in `error` or `suspended`. Returns how
    /// many were removed.
    pub async fn cleanup_failed_projects(&self) -> LifecycleResult<usize> {
        let failed: Vec<String> = self
            .store
            .get_all_projects()?
            .into_iter()
            .filter(|p| matches!(p.status, ProjectStatus::Error | ProjectStatus::Suspended))
            .map(|p| p.project_id)
            .collect();

        if failed.is_empty() {
            debug!("no failed projects to clean up");
            return Ok(0);
        }
        info!(count = failed.len(), "cleaning up failed projects");

        let mut removed = 0;
        for project_id in &failed {
            if self.delete_project(project_id).await {
                removed += 1;
            }
        }
        Ok(removed)
    }

    // ── Reporting ──────────────────────────────────────────────────

    /// Placeholder costs at the configured per-shard rate.
    pub fn project_costs(&self, project_id: &str) -> LifecycleResult<ProjectCosts> {
        if self.store.get_project(project_id)?.is_none() {
            return Err(LifecycleError::ProjectNotFound(project_id.to_string()));
        }
        let base = self.config.monthly_cost_per_shard;
        Ok(ProjectCosts {
            project_id: project_id.to_string(),
            timestamp: epoch_secs(),
            current_month_cost: base,
            projected_month_cost: base * 1.1,
            cost_breakdown: CostBreakdown {
                compute: base * 0.4,
                database: base * 0.3,
                storage: base * 0.2,
                network: base * 0.1,
            },
            currency: "USD",
        })
    }

    pub fn statistics(&self) -> LifecycleResult<LifecycleStats> {
        let active_projects = self
            .store
            .get_all_projects()?
            .iter()
            .filter(|p| p.status == ProjectStatus::Active)
            .count();
        Ok(LifecycleStats {
            shards_created: self.counters.shards_created.load(Ordering::Relaxed),
            projects_deleted: self.counters.projects_deleted.load(Ordering::Relaxed),
            creation_failures: self.counters.creation_failures.load(Ordering::Relaxed),
            active_projects,
        })
    }

    pub fn federation_status(&self) -> LifecycleResult<FederationStatus> {
        let shards = self.store.get_all_shards()?;
        let projects = self.store.get_all_projects()?;

        let mut health_distribution = BTreeMap::new();
        let mut regional_distribution: BTreeMap<String, RegionSummary> = BTreeMap::new();
        let mut total_capacity = 0;
        let mut used_capacity = 0;
        for shard in &shards {
            *health_distribution
                .entry(shard.health.as_str().to_string())
                .or_insert(0) += 1;
            let region = regional_distribution.entry(shard.region.clone()).or_default();
            region.shards += 1;
            region.tenants += shard.tenant_count;
            region.capacity += shard.max_tenants;
            total_capacity += shard.max_tenants;
            used_capacity += shard.tenant_count;
        }
        let healthy_shards = shards
            .iter()
            .filter(|s| s.health == ShardHealth::Healthy)
            .count();

        Ok(FederationStatus {
            timestamp: epoch_secs(),
            total_projects: projects.len(),
            active_projects: projects
                .iter()
                .filter(|p| p.status == ProjectStatus::Active)
                .count(),
            total_shards: shards.len(),
            healthy_shards,
            unhealthy_shards: shards.len() - healthy_shards,
            health_distribution,
            total_capacity,
            used_capacity,
            utilization_percent: f64::from(used_capacity) / f64::from(total_capacity.max(1))
                * 100.0,
            regional_distribution,
            statistics: self.statistics()?,
        })
    }

    fn audit(&self, event: AuditEvent) {
        if let Err(e) = self.store.save_audit_event(&event) {
            warn!(error = %e, event_type = ?event.event_type, "failed to record audit event");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provisioner::SimulatedProvisioner;
    use fedplane_state::MemoryStore;

    fn manager_with(provisioner: Arc<SimulatedProvisioner>) -> (ShardLifecycleManager, Arc<dyn MetadataStore>) {
        let store: Arc<dyn MetadataStore> = Arc::new(MemoryStore::new());
        let manager = ShardLifecycleManager::new(store.clone(), provisioner, LifecycleConfig::default());
        (manager, store)
    }

    #[tokio::test]
    async fn ensure_creates_once() {
        let provisioner = Arc::new(SimulatedProvisioner::new());
        let (manager, store) = manager_with(provisioner.clone());

        let shard = manager.ensure_shard_exists("aipress-shard-006").await.unwrap();
        assert_eq!(shard.project_id, "aipress-shard-006");
        assert_eq!(
            shard.control_plane_url,
            "https://aipress-shard-006-control-plane.run.app"
        );
        assert_eq!(shard.max_tenants, 50);
        assert_eq!(shard.region, "us-central1");

        let again = manager.ensure_shard_exists("aipress-shard-006").await.unwrap();
        assert_eq!(again.shard_id, shard.shard_id);
        assert_eq!(provisioner.created_count(), 1);

        let project = store.get_project("aipress-shard-006").unwrap().unwrap();
        assert_eq!(project.status, ProjectStatus::Active);
        assert_eq!(project.shard_id.as_deref(), Some("aipress-shard-006"));
    }

    #[tokio::test]
    async fn ensure_uses_existing_store_record() {
        let provisioner = Arc::new(SimulatedProvisioner::new());
        let (manager, store) = manager_with(provisioner.clone());
        store
            .save_shard(&Shard::new("aipress-shard-001", "p-1", "europe-west1", "http://x"))
            .unwrap();

        let shard = manager.ensure_shard_exists("aipress-shard-001").await.unwrap();
        assert_eq!(shard.region, "europe-west1");
        assert_eq!(provisioner.created_count(), 0);
    }

    #[tokio::test]
    async fn concurrent_ensure_provisions_once() {
        let provisioner = Arc::new(SimulatedProvisioner::new());
        let (manager, _store) = manager_with(provisioner.clone());
        let manager = Arc::new(manager);

        let mut handles = Vec::new();
        for _ in 0..8 {
            let manager = manager.clone();
            handles.push(tokio::spawn(async move {
                manager.ensure_shard_exists("aipress-shard-010").await.unwrap()
            }));
        }
        for h in handles {
            h.await.unwrap();
        }
        assert_eq!(provisioner.created_count(), 1);
    }

    #[tokio::test]
    async fn failure_mid_configuration_leaves_error_project() {
        let provisioner = Arc::new(SimulatedProvisioner::failing_at(ProvisioningStep::ConfigureIam));
        let (manager, store) = manager_with(provisioner);

        let err = manager
            .create_shard_project("aipress-shard-003", Some("asia-east1"))
            .await
            .unwrap_err();
        match err {
            LifecycleError::Provisioning { shard_id, step, .. } => {
                assert_eq!(shard_id, "aipress-shard-003");
                assert_eq!(step, "configure_iam");
            }
            other => panic!("unexpected error: {other}"),
        }

        let project = store.get_project("aipress-shard-003").unwrap().unwrap();
        assert_eq!(project.status, ProjectStatus::Error);
        assert!(store.get_shard("aipress-shard-003").unwrap().is_none());
        assert_eq!(manager.statistics().unwrap().creation_failures, 1);

        let events = store.get_audit_events(1, 0).unwrap();
        assert!(!events[0].success);
    }

    #[tokio::test]
    async fn cleanup_removes_failed_projects() {
        let provisioner = Arc::new(SimulatedProvisioner::failing_at(ProvisioningStep::EnableApis));
        let (manager, store) = manager_with(provisioner);
        manager.ensure_shard_exists("aipress-shard-001").await.unwrap_err();
        manager.ensure_shard_exists("aipress-shard-002").await.unwrap_err();

        assert_eq!(manager.cleanup_failed_projects().await.unwrap(), 2);
        assert!(store.get_all_projects().unwrap().is_empty());
        assert_eq!(manager.cleanup_failed_projects().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn delete_removes_project_and_shard() {
        let provisioner = Arc::new(SimulatedProvisioner::new());
        let (manager, store) = manager_with(provisioner.clone());
        manager.ensure_shard_exists("aipress-shard-004").await.unwrap();

        assert!(manager.delete_project("aipress-shard-004").await);
        assert!(store.get_shard("aipress-shard-004").unwrap().is_none());
        assert!(store.get_project("aipress-shard-004").unwrap().is_none());
        assert!(manager.get_shard_info("aipress-shard-004").await.unwrap().is_none());
        assert_eq!(provisioner.deleted_count(), 1);

        assert!(!manager.delete_project("aipress-shard-004").await);
    }

    #[tokio::test]
    async fn delete_failure_returns_false() {
        let provisioner = Arc::new(SimulatedProvisioner::failing_deletes());
        let (manager, store) = manager_with(provisioner);
        manager.ensure_shard_exists("aipress-shard-004").await.unwrap();

        assert!(!manager.delete_project("aipress-shard-004").await);
        let project = store.get_project("aipress-shard-004").unwrap().unwrap();
        assert_eq!(project.status, ProjectStatus::Error);
        assert!(store.get_shard("aipress-shard-004").unwrap().is_some());
    }

    #[tokio::test]
    async fn scale_updates_capacity() {
        let (manager, store) = manager_with(Arc::new(SimulatedProvisioner::new()));
        manager.ensure_shard_exists("aipress-shard-001").await.unwrap();

        let shard = manager.scale_shard_resources("aipress-shard-001", 80).await.unwrap();
        assert_eq!(shard.max_tenants, 80);
        assert_eq!(store.get_shard("aipress-shard-001").unwrap().unwrap().max_tenants, 80);

        assert!(matches!(
            manager.scale_shard_resources("aipress-shard-999", 10).await,
            Err(LifecycleError::ShardNotFound(_))
        ));
    }

    #[tokio::test]
    async fn create_existing_shard_conflicts() {
        let provisioner = Arc::new(SimulatedProvisioner::new());
        let (manager, store) = manager_with(provisioner.clone());
        manager.create_shard_project("aipress-shard-001", None).await.unwrap();
        store
            .update_shard("aipress-shard-001", &mut |s| {
                s.tenant_count = 7;
                s.health = ShardHealth::Healthy;
            })
            .unwrap();

        assert!(matches!(
            manager.create_shard_project("aipress-shard-001", None).await,
            Err(LifecycleError::ShardExists(ref id)) if id == "aipress-shard-001"
        ));
        let shard = store.get_shard("aipress-shard-001").unwrap().unwrap();
        assert_eq!(shard.tenant_count, 7);
        assert_eq!(shard.health, ShardHealth::Healthy);
        assert_eq!(provisioner.created_count(), 1);
    }

    #[tokio::test]
    async fn scale_keeps_other_shard_fields() {
        let (manager, store) = manager_with(Arc::new(SimulatedProvisioner::new()));
        manager.ensure_shard_exists("aipress-shard-001").await.unwrap();
        // Written by the router and monitor after the manager cached the shard.
        store
            .update_shard("aipress-shard-001", &mut |s| {
                s.tenant_count = 12;
                s.health = ShardHealth::Degraded;
            })
            .unwrap();

        let shard = manager.scale_shard_resources("aipress-shard-001", 80).await.unwrap();
        assert_eq!(shard.tenant_count, 12);
        assert_eq!(shard.health, ShardHealth::Degraded);
        let stored = store.get_shard("aipress-shard-001").unwrap().unwrap();
        assert_eq!(stored.max_tenants, 80);
        assert_eq!(stored.tenant_count, 12);
    }

    #[tokio::test]
    async fn project_status_and_costs() {
        let (manager, _store) = manager_with(Arc::new(SimulatedProvisioner::new()));
        manager.ensure_shard_exists("aipress-shard-001").await.unwrap();

        let project = manager
            .update_project_status("aipress-shard-001", ProjectStatus::Suspended)
            .unwrap();
        assert_eq!(project.status, ProjectStatus::Suspended);
        assert!(matches!(
            manager.update_project_status("nope", ProjectStatus::Active),
            Err(LifecycleError::ProjectNotFound(_))
        ));

        let costs = manager.project_costs("aipress-shard-001").unwrap();
        assert_eq!(costs.current_month_cost, 150.0);
        assert!((costs.projected_month_cost - 165.0).abs() < 1e-9);
        assert!((costs.cost_breakdown.compute - 60.0).abs() < 1e-9);
        assert!(manager.project_costs("nope").is_err());
    }

    #[tokio::test]
    async fn federation_status_aggregates_regions() {
        let (manager, store) = manager_with(Arc::new(SimulatedProvisioner::new()));
        manager.create_shard_project("aipress-shard-001", None).await.unwrap();
        manager
            .create_shard_project("aipress-shard-002", Some("europe-west1"))
            .await
            .unwrap();
        let mut shard = store.get_shard("aipress-shard-001").unwrap().unwrap();
        shard.tenant_count = 25;
        shard.health = ShardHealth::Healthy;
        store.save_shard(&shard).unwrap();

        let status = manager.federation_status().unwrap();
        assert_eq!(status.total_shards, 2);
        assert_eq!(status.healthy_shards, 1);
        assert_eq!(status.total_capacity, 100);
        assert_eq!(status.used_capacity, 25);
        assert!((status.utilization_percent - 25.0).abs() < 1e-9);
        assert_eq!(status.regional_distribution["europe-west1"].shards, 1);
        assert_eq!(status.health_distribution["unknown"], 1);
        assert_eq!(status.statistics.shards_created, 2);
        assert_eq!(status.active_projects, 2);
    }

    #[test]
    fn project_id_uses_shard_suffix() {
        let store: Arc<dyn MetadataStore> = Arc::new(MemoryStore::new());
        let config = LifecycleConfig {
            project_prefix: "fed-proj".to_string(),
            ..LifecycleConfig::default()
        };
        let manager =
            ShardLifecycleManager::new(store, Arc::new(SimulatedProvisioner::new()), config);
        assert_eq!(manager.project_id_for("aipress-shard-042"), "fed-proj-042");
    }
}
