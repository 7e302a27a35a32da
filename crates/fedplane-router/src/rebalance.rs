//! Bounded load rebalancing.
//!
//! ```text
//!   overloaded (util > threshold)        underloaded (util <= threshold)
//!   sorted by utilization desc           least loaded first, id tie-break
//!   ┌──────────────┐   oldest tenant    ┌──────────────┐
//!   │ shard-007 96%│ ─────────────────▶ │ shard-002 10%│
//!   │ shard-003 84%│                    │ shard-009 40%│
//!   └──────────────┘                    └──────────────┘
//! ```
//!
//! At most `rebalance_batch_size` tenants move off each overloaded shard per
//! call, oldest registration first. A target leaves the pool as soon as it
//! crosses the threshold or refuses a migration, so a single call never
//! pushes a shard past its capacity. A migration the store rejects is
//! skipped; the report and audit event cover whatever did move.

use std::sync::atomic::Ordering;

use tracing::{info, warn};

use fedplane_state::{AuditEvent, EventType, epoch_secs};

use crate::error::RouterResult;
use crate::report::{Migration, RebalanceReport, ShardLoad};
use crate::router::TenantRouter;

impl TenantRouter {
    /// Move tenants off shards above the rebalance threshold.
    pub async fn rebalance(&self) -> RouterResult<RebalanceReport> {
        let threshold = self.config.rebalance_threshold();
        let batch = self.config.rebalance_batch_size;
        let mut table = self.table.lock().await;

        let loads = table.known_loads();
        let total_tenants: u32 = loads.iter().map(|l| l.tenant_count).sum();
        let total_shards = loads.len();
        let average_utilization = if loads.is_empty() {
            0.0
        } else {
            loads.iter().map(|l| l.utilization).sum::<f64>() / loads.len() as f64
        };

        let mut overloaded: Vec<ShardLoad> = loads
            .iter()
            .filter(|l| l.utilization > threshold)
            .cloned()
            .collect();
        overloaded.sort_by(|a, b| b.utilization.total_cmp(&a.utilization));
        let overloaded_count = overloaded.len();

        let mut targets: Vec<ShardLoad> = loads
            .into_iter()
            .filter(|l| l.utilization <= threshold && l.has_capacity())
            .collect();

        let mut migrations = Vec::new();
        let mut failed = 0usize;
        'sources: for source in &overloaded {
            for tenant_id in table.tenants_on(&source.shard_id).into_iter().take(batch) {
                targets.sort_by(|a, b| a.utilization.total_cmp(&b.utilization));
                let Some(target) = targets.first().map(|t| t.shard_id.clone()) else {
                    break 'sources;
                };

                let moved = match self.migrate_locked(&mut table, &tenant_id, &target) {
                    Ok(moved) => moved,
                    Err(e) => {
                        warn!(
                            %tenant_id,
                            from = %source.shard_id,
                            to = %target,
                            error = %e,
                            "rebalance migration failed, skipping tenant"
                        );
                        failed += 1;
                        continue;
                    }
                };
                if !moved {
                    targets.retain(|t| t.shard_id != target);
                    continue;
                }
                migrations.push(Migration {
                    tenant_id,
                    from: source.shard_id.clone(),
                    to: target.clone(),
                });

                match table.load(&target) {
                    Some(load) if load.utilization <= threshold && load.has_capacity() => {
                        if let Some(slot) = targets.iter_mut().find(|t| t.shard_id == target) {
                            *slot = load;
                        }
                    }
                    _ => targets.retain(|t| t.shard_id != target),
                }
            }
        }
        drop(table);

        self.counters
            .rebalance_operations
            .fetch_add(1, Ordering::Relaxed);

        if overloaded_count > 0 && migrations.is_empty() {
            warn!(overloaded = overloaded_count, "rebalance found no eligible targets");
        }
        if !migrations.is_empty() || failed > 0 {
            let mut event = AuditEvent::new(EventType::RebalancingTriggered)
                .actor("router")
                .detail("migrations", migrations.len())
                .detail("migrations_failed", failed)
                .detail("overloaded_shards", overloaded_count);
            if failed > 0 {
                event = event.failed(format!("{failed} migrations failed"));
            }
            self.audit(event);
        }
        info!(
            migrations = migrations.len(),
            failed,
            overloaded = overloaded_count,
            underloaded = targets.len(),
            "rebalance complete"
        );

        Ok(RebalanceReport {
            timestamp: epoch_secs(),
            migrations_performed: migrations.len(),
            migrations,
            migrations_failed: failed,
            total_tenants,
            total_shards,
            average_utilization,
            overloaded_shards: overloaded_count,
            underloaded_shards: targets.len(),
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use fedplane_state::{EventType, MemoryStore, MetadataStore, Shard};

    use crate::config::RoutingConfig;
    use crate::router::TenantRouter;
    use crate::router::tests::{FlakyTenantStore, fill, router_with_shards};

    #[tokio::test]
    async fn nothing_to_do_below_threshold() {
        let router = router_with_shards(3, 10).await;
        fill(&router, "aipress-shard-001", 8).await;
        fill(&router, "aipress-shard-002", 2).await;

        let report = router.rebalance().await.unwrap();
        assert_eq!(report.migrations_performed, 0);
        assert_eq!(report.overloaded_shards, 0);
        assert_eq!(report.total_tenants, 10);
        assert_eq!(router.statistics().await.rebalance_operations, 1);
    }

    #[tokio::test]
    async fn moves_oldest_tenants_up_to_batch() {
        let router = router_with_shards(2, 10).await;
        fill(&router, "aipress-shard-001", 10).await;

        let report = router.rebalance().await.unwrap();
        assert_eq!(report.migrations_performed, 5);
        assert_eq!(report.overloaded_shards, 1);

        let moved: Vec<_> = report.migrations.iter().map(|m| m.tenant_id.as_str()).collect();
        assert_eq!(
            moved,
            vec![
                "aipress-shard-001-t000",
                "aipress-shard-001-t001",
                "aipress-shard-001-t002",
                "aipress-shard-001-t003",
                "aipress-shard-001-t004",
            ]
        );
        assert!(report.migrations.iter().all(|m| m.to == "aipress-shard-002"));
        assert_eq!(router.shard_tenant_count("aipress-shard-001").await, 5);
        assert_eq!(router.shard_tenant_count("aipress-shard-002").await, 5);
        assert_eq!(
            router.lookup("aipress-shard-001-t000").await.as_deref(),
            Some("aipress-shard-002")
        );
    }

    #[tokio::test]
    async fn batch_applies_per_overloaded_shard() {
        let router = router_with_shards(4, 20).await;
        fill(&router, "aipress-shard-001", 20).await;
        fill(&router, "aipress-shard-002", 18).await;

        let report = router.rebalance().await.unwrap();
        assert_eq!(report.overloaded_shards, 2);
        assert_eq!(report.migrations_performed, 10);
        assert_eq!(router.shard_tenant_count("aipress-shard-001").await, 15);
        assert_eq!(router.shard_tenant_count("aipress-shard-002").await, 13);
        // Least loaded target first: 003 and 004 alternate.
        assert_eq!(router.shard_tenant_count("aipress-shard-003").await, 5);
        assert_eq!(router.shard_tenant_count("aipress-shard-004").await, 5);
    }

    #[tokio::test]
    async fn target_leaves_pool_once_above_threshold() {
        let router = router_with_shards(2, 10).await;
        fill(&router, "aipress-shard-001", 10).await;
        fill(&router, "aipress-shard-002", 7).await;

        let report = router.rebalance().await.unwrap();
        // 7 → 8 (80%, still eligible) → 9 (90%, removed).
        assert_eq!(report.migrations_performed, 2);
        assert_eq!(report.underloaded_shards, 0);
        assert_eq!(router.shard_tenant_count("aipress-shard-002").await, 9);
    }

    #[tokio::test]
    async fn rebalance_never_worsens_overload() {
        let router = router_with_shards(4, 10).await;
        fill(&router, "aipress-shard-001", 10).await;
        fill(&router, "aipress-shard-002", 9).await;
        fill(&router, "aipress-shard-003", 6).await;
        fill(&router, "aipress-shard-004", 1).await;

        let before = router.shard_loads().await;
        router.rebalance().await.unwrap();
        let after = router.shard_loads().await;

        for (b, a) in before.iter().zip(after.iter()) {
            assert!(a.tenant_count <= a.max_tenants);
            if b.utilization > 0.8 {
                assert!(a.utilization <= b.utilization);
            }
        }
        let total_before: u32 = before.iter().map(|l| l.tenant_count).sum();
        let total_after: u32 = after.iter().map(|l| l.tenant_count).sum();
        assert_eq!(total_before, total_after);
    }

    #[tokio::test]
    async fn no_targets_means_no_moves() {
        let router = router_with_shards(2, 10).await;
        fill(&router, "aipress-shard-001", 10).await;
        fill(&router, "aipress-shard-002", 9).await;

        let report = router.rebalance().await.unwrap();
        assert_eq!(report.migrations_performed, 0);
        assert_eq!(report.overloaded_shards, 2);
    }

    #[tokio::test]
    async fn store_failure_skips_one_migration_and_reports_the_rest() {
        let inner = MemoryStore::new();
        for id in ["aipress-shard-001", "aipress-shard-002"] {
            let mut shard = Shard::new(id, id, "us-central1", "http://s");
            shard.max_tenants = 10;
            inner.save_shard(&shard).unwrap();
        }
        let store = Arc::new(FlakyTenantStore::new(inner));
        let router = TenantRouter::new(store.clone(), RoutingConfig::default());
        router.initialize().await.unwrap();
        fill(&router, "aipress-shard-001", 10).await;

        store.fail_nth_tenant_save(3);
        let report = router.rebalance().await.unwrap();

        let moved: Vec<_> = report.migrations.iter().map(|m| m.tenant_id.as_str()).collect();
        assert_eq!(
            moved,
            vec![
                "aipress-shard-001-t000",
                "aipress-shard-001-t001",
                "aipress-shard-001-t003",
                "aipress-shard-001-t004",
            ]
        );
        assert_eq!(report.migrations_performed, 4);
        assert_eq!(report.migrations_failed, 1);
        assert_eq!(router.statistics().await.rebalance_operations, 1);

        // The skipped tenant stays where it was, in the cache and the store.
        assert_eq!(
            router.lookup("aipress-shard-001-t002").await.as_deref(),
            Some("aipress-shard-001")
        );
        let tenant = store.inner.get_tenant("aipress-shard-001-t002").unwrap().unwrap();
        assert_eq!(tenant.shard_id, "aipress-shard-001");
        assert_eq!(router.shard_tenant_count("aipress-shard-001").await, 6);
        assert_eq!(router.shard_tenant_count("aipress-shard-002").await, 4);
        let source = store.inner.get_shard("aipress-shard-001").unwrap().unwrap();
        assert_eq!(source.tenant_count, 6);
        assert_eq!(router.validate_routing_consistency().await.total_issues, 0);

        let event = &store.inner.get_audit_events(1, 0).unwrap()[0];
        assert_eq!(event.event_type, EventType::RebalancingTriggered);
        assert!(!event.success);
        assert_eq!(event.details["migrations"], 4);
        assert_eq!(event.details["migrations_failed"], 1);
    }
}
