//! Shard provisioning collaborator.
//!
//! The provisioner talks to whatever actually creates the backing project of
//! a shard. A simulated implementation is provided for development and tests.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use anyhow::{Result, bail};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// One step of bringing up a shard's backing project.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProvisioningStep {
    CreateProject,
    EnableApis,
    ConfigureBilling,
    ConfigureIam,
    ConfigureNetworking,
    DeployControlPlane,
}

impl ProvisioningStep {
    /// Configuration steps run after the project exists, in order.
    pub const CONFIGURATION: [Self; 5] = [
        Self::EnableApis,
        Self::ConfigureBilling,
        Self::ConfigureIam,
        Self::ConfigureNetworking,
        Self::DeployControlPlane,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CreateProject => "create_project",
            Self::EnableApis => "enable_apis",
            Self::ConfigureBilling => "configure_billing",
            Self::ConfigureIam => "configure_iam",
            Self::ConfigureNetworking => "configure_networking",
            Self::DeployControlPlane => "deploy_control_plane",
        }
    }
}

impl fmt::Display for ProvisioningStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parameters of a project to create.
#[derive(Debug, Clone)]
pub struct ProjectRequest {
    pub project_id: String,
    pub project_name: String,
    pub shard_id: String,
    pub region: String,
    pub billing_account: String,
    pub organization_id: String,
}

/// Creates, configures, and deletes shard backing projects.
#[async_trait]
pub trait ShardProvisioner: Send + Sync {
    /// Create the project.
    async fn create_project(&self, request: &ProjectRequest) -> Result<()>;

    /// Run one configuration step. `DeployControlPlane` returns the
    /// shard's control endpoint; other steps return `None`.
    async fn configure(&self, project_id: &str, step: ProvisioningStep) -> Result<Option<String>>;

    /// Delete the project and everything in it.
    async fn delete_project(&self, project_id: &str) -> Result<()>;
}

/// Provisioner that succeeds instantly and derives endpoints from the
/// project id. Can be told to fail a given step.
pub struct SimulatedProvisioner {
    fail_step: Option<ProvisioningStep>,
    fail_deletes: bool,
    created: AtomicU64,
    deleted: AtomicU64,
}

impl SimulatedProvisioner {
    pub fn new() -> Self {
        Self {
            fail_step: None,
            fail_deletes: false,
            created: AtomicU64::new(0),
            deleted: AtomicU64::new(0),
        }
    }

    /// A provisioner whose `step` always fails.
    pub fn failing_at(step: ProvisioningStep) -> Self {
        Self {
            fail_step: Some(step),
            ..Self::new()
        }
    }

    /// A provisioner whose deletes always fail.
    pub fn failing_deletes() -> Self {
        Self {
            fail_deletes: true,
            ..Self::new()
        }
    }

    /// Projects created so far.
    pub fn created_count(&self) -> u64 {
        self.created.load(Ordering::SeqCst)
    }

    /// Projects deleted so far.
    pub fn deleted_count(&self) -> u64 {
        self.deleted.load(Ordering::SeqCst)
    }

    fn check(&self, step: ProvisioningStep) -> Result<()> {
        if self.fail_step == Some(step) {
            bail!("simulated failure at {step}");
        }
        Ok(())
    }
}

impl Default for SimulatedProvisioner {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ShardProvisioner for SimulatedProvisioner {
    async fn create_project(&self, request: &ProjectRequest) -> Result<()> {
        self.check(ProvisioningStep::CreateProject)?;
        self.created.fetch_add(1, Ordering::SeqCst);
        debug!(project_id = %request.project_id, region = %request.region, "simulated project created");
        Ok(())
    }

    async fn configure(&self, project_id: &str, step: ProvisioningStep) -> Result<Option<String>> {
        self.check(step)?;
        debug!(%project_id, %step, "simulated configuration step");
        Ok(match step {
            ProvisioningStep::DeployControlPlane => {
                Some(format!("https://{project_id}-control-plane.run.app"))
            }
            _ => None,
        })
    }

    async fn delete_project(&self, project_id: &str) -> Result<()> {
        if self.fail_deletes {
            bail!("simulated delete failure for {project_id}");
        }
        self.deleted.fetch_add(1, Ordering::SeqCst);
        debug!(%project_id, "simulated project deleted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> ProjectRequest {
        ProjectRequest {
            project_id: "aipress-shard-007".to_string(),
            project_name: "Shard aipress-shard-007".to_string(),
            shard_id: "aipress-shard-007".to_string(),
            region: "us-central1".to_string(),
            billing_account: String::new(),
            organization_id: String::new(),
        }
    }

    #[tokio::test]
    async fn deploy_step_yields_endpoint() {
        let provisioner = SimulatedProvisioner::new();
        provisioner.create_project(&request()).await.unwrap();

        let url = provisioner
            .configure("aipress-shard-007", ProvisioningStep::DeployControlPlane)
            .await
            .unwrap();
        assert_eq!(
            url.as_deref(),
            Some("https://aipress-shard-007-control-plane.run.app")
        );
        let none = provisioner
            .configure("aipress-shard-007", ProvisioningStep::ConfigureIam)
            .await
            .unwrap();
        assert!(none.is_none());
        assert_eq!(provisioner.created_count(), 1);
    }

    #[tokio::test]
    async fn injected_failure_hits_only_that_step() {
        let provisioner = SimulatedProvisioner::failing_at(ProvisioningStep::ConfigureNetworking);
        provisioner.create_project(&request()).await.unwrap();
        assert!(provisioner
            .configure("p", ProvisioningStep::EnableApis)
            .await
            .is_ok());

        let err = provisioner
            .configure("p", ProvisioningStep::ConfigureNetworking)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("configure_networking"));
    }

    #[test]
    fn configuration_order() {
        assert_eq!(ProvisioningStep::CONFIGURATION.len(), 5);
        assert_eq!(
            ProvisioningStep::CONFIGURATION.last(),
            Some(&ProvisioningStep::DeployControlPlane)
        );
        assert_eq!(ProvisioningStep::ConfigureBilling.to_string(), "configure_billing");
    }
}
