//! Periodic background tasks driven by the daemon.
//!
//! Both loops sleep first, then act, and exit as soon as the shutdown
//! channel flips. Failures are logged and the next tick tries again.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{error, info};

use fedplane_lifecycle::ShardLifecycleManager;
use fedplane_router::TenantRouter;

/// Delete failed projects every `interval`.
pub async fn run_cleanup(
    lifecycle: Arc<ShardLifecycleManager>,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    info!(interval_secs = interval.as_secs(), "project cleanup started");
    loop {
        tokio::select! {
            _ = tokio::time::sleep(interval) => {
                match lifecycle.cleanup_failed_projects().await {
                    Ok(0) => {}
                    Ok(cleaned) => info!(cleaned, "failed projects cleaned up"),
                    Err(e) => error!(error = %e, "project cleanup failed"),
                }
            }
            _ = shutdown.changed() => {
                info!("project cleanup shutting down");
                break;
            }
        }
    }
}

/// Rebalance overloaded shards every `interval`.
pub async fn run_rebalance(
    router: Arc<TenantRouter>,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    info!(interval_secs = interval.as_secs(), "scheduled rebalancing started");
    loop {
        tokio::select! {
            _ = tokio::time::sleep(interval) => {
                match router.rebalance().await {
                    Ok(report) if report.migrations.is_empty() => {}
                    Ok(report) => info!(
                        migrations = report.migrations.len(),
                        "scheduled rebalance moved tenants"
                    ),
                    Err(e) => error!(error = %e, "scheduled rebalance failed"),
                }
            }
            _ = shutdown.changed() => {
                info!("scheduled rebalancing shutting down");
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fedplane_lifecycle::{LifecycleConfig, SimulatedProvisioner};
    use fedplane_router::RoutingConfig;
    use fedplane_state::{MemoryStore, MetadataStore, Shard};

    #[tokio::test]
    async fn loops_stop_on_shutdown() {
        let store: Arc<dyn MetadataStore> = Arc::new(MemoryStore::new());
        let lifecycle = Arc::new(ShardLifecycleManager::new(
            store.clone(),
            Arc::new(SimulatedProvisioner::new()),
            LifecycleConfig::default(),
        ));
        let router = Arc::new(TenantRouter::new(store, RoutingConfig::default()));

        let (tx, rx) = watch::channel(false);
        let cleanup = tokio::spawn(run_cleanup(lifecycle, Duration::from_secs(3600), rx.clone()));
        let rebalance = tokio::spawn(run_rebalance(router, Duration::from_secs(3600), rx));

        tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(5), cleanup)
            .await
            .unwrap()
            .unwrap();
        tokio::time::timeout(Duration::from_secs(5), rebalance)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn rebalance_loop_moves_tenants() {
        let store: Arc<dyn MetadataStore> = Arc::new(MemoryStore::new());
        for id in ["aipress-shard-001", "aipress-shard-002"] {
            let mut shard = Shard::new(id, id, "us-central1", "http://s");
            shard.max_tenants = 10;
            store.save_shard(&shard).unwrap();
        }
        let router = Arc::new(TenantRouter::new(store, RoutingConfig::default()));
        router.initialize().await.unwrap();
        for i in 0..10 {
            router
                .register_tenant(&format!("t{i:02}"), "aipress-shard-001")
                .await
                .unwrap();
        }

        let (tx, rx) = watch::channel(false);
        let handle = tokio::spawn(run_rebalance(
            router.clone(),
            Duration::from_millis(20),
            rx,
        ));
        for _ in 0..100 {
            if router.shard_tenant_count("aipress-shard-002").await > 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        tx.send(true).unwrap();
        handle.await.unwrap();

        assert_eq!(router.shard_tenant_count("aipress-shard-002").await, 5);
    }
}
