//! The health monitor: background loop, on-demand checks, and reports.
//!
//! One task drives every cycle: check all shards with bounded concurrency,
//! sample resource metrics, then evaluate alerts. A failed cycle is logged
//! and retried after a shorter delay; the loop only ends on stop.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use tokio::sync::{Mutex, RwLock, Semaphore, watch};
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, error, info, warn};

use fedplane_state::{AuditEvent, EventType, MetadataStore, Shard, ShardHealth, epoch_secs};

use crate::alerts::{Alert, AlertInput, AlertKind, AlertTracker};
use crate::checker::{
    DependencyProbe, EndpointCheck, HealthCheckResult, HttpProbe, ProbeResult, StaticProbe,
    derive_health,
};
use crate::config::{AlertConfig, CapacityConfig, HealthConfig};
use crate::error::{HealthError, HealthResult};
use crate::metrics::{MetricsHistory, MetricsSource, NullMetricsSource};
use crate::reports::{self, CapacityReport, GlobalMetrics, MonitoringStats, ShardStatus};

/// Monitor-side state of one shard.
#[derive(Debug, Clone, Default)]
struct ShardRuntime {
    health: ShardHealth,
    consecutive_errors: u32,
    last_check: Option<u64>,
    last_result: Option<HealthCheckResult>,
}

struct MonitorTask {
    handle: JoinHandle<()>,
    shutdown_tx: watch::Sender<bool>,
}

/// Polls shard health and produces health and capacity reports.
pub struct HealthMonitor {
    store: Arc<dyn MetadataStore>,
    config: HealthConfig,
    capacity: CapacityConfig,
    dependencies: Arc<dyn DependencyProbe>,
    metrics_source: Arc<dyn MetricsSource>,
    /// Dropped on stop so pooled connections are released.
    http: RwLock<Option<HttpProbe>>,
    shards: RwLock<HashMap<String, ShardRuntime>>,
    history: RwLock<MetricsHistory>,
    alerts: Mutex<AlertTracker>,
    task: Mutex<Option<MonitorTask>>,
    total_checks: AtomicU64,
    failed_checks: AtomicU64,
    active: AtomicBool,
}

impl HealthMonitor {
    pub fn new(store: Arc<dyn MetadataStore>, config: HealthConfig) -> Self {
        let http = build_probe(&config);
        Self {
            store,
            config,
            capacity: CapacityConfig::default(),
            dependencies: Arc::new(StaticProbe::default()),
            metrics_source: Arc::new(NullMetricsSource),
            http: RwLock::new(http),
            shards: RwLock::new(HashMap::new()),
            history: RwLock::new(MetricsHistory::default()),
            alerts: Mutex::new(AlertTracker::new(AlertConfig::default())),
            task: Mutex::new(None),
            total_checks: AtomicU64::new(0),
            failed_checks: AtomicU64::new(0),
            active: AtomicBool::new(false),
        }
    }

    pub fn with_alert_config(mut self, config: AlertConfig) -> Self {
        self.alerts = Mutex::new(AlertTracker::new(config));
        self
    }

    pub fn with_capacity_config(mut self, config: CapacityConfig) -> Self {
        self.capacity = config;
        self
    }

    pub fn with_dependency_probe(mut self, probe: Arc<dyn DependencyProbe>) -> Self {
        self.dependencies = probe;
        self
    }

    pub fn with_metrics_source(mut self, source: Arc<dyn MetricsSource>) -> Self {
        self.metrics_source = source;
        self
    }

    // ── Loop control ───────────────────────────────────────────────

    /// Start the monitoring loop. Does nothing if it is already running.
    pub async fn start(self: &Arc<Self>) {
        let mut task = self.task.lock().await;
        if task.is_some() {
            debug!("health monitoring already running");
            return;
        }

        {
            let mut http = self.http.write().await;
            if http.is_none() {
                *http = build_probe(&self.config);
            }
        }

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let monitor = Arc::clone(self);
        let handle = tokio::spawn(async move {
            monitor.run_loop(shutdown_rx).await;
        });
        *task = Some(MonitorTask {
            handle,
            shutdown_tx,
        });
        self.active.store(true, Ordering::SeqCst);
        info!(
            interval_secs = self.config.interval_secs,
            max_concurrent = self.config.max_concurrent_checks,
            "health monitoring started"
        );
    }

    /// Stop the loop, wait for it to exit, and release the HTTP client.
    pub async fn stop(&self) {
        let task = self.task.lock().await.take();
        if let Some(task) = task {
            let _ = task.shutdown_tx.send(true);
            if let Err(e) = task.handle.await {
                warn!(error = %e, "health monitoring task ended abnormally");
            }
        }
        self.http.write().await.take();
        self.active.store(false, Ordering::SeqCst);
        info!("health monitoring stopped");
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    async fn run_loop(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        loop {
            let delay = match self.run_cycle().await {
                Ok(checked) => {
                    debug!(shards = checked, "health cycle complete");
                    self.config.interval()
                }
                Err(e) => {
                    error!(error = %e, "health cycle failed");
                    self.config.retry_delay()
                }
            };

            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = shutdown.changed() => {
                    debug!("health loop shutting down");
                    break;
                }
            }
        }
    }

    /// One monitoring cycle. Returns the number of shards checked.
    pub async fn run_cycle(self: &Arc<Self>) -> HealthResult<usize> {
        let shards = self.store.get_all_shards()?;
        self.forget_removed(&shards).await;
        self.check_all(&shards).await;
        self.collect_metrics(&shards).await;
        self.evaluate_alerts(&shards, epoch_secs()).await;
        Ok(shards.len())
    }

    /// Check every shard concurrently, at most `max_concurrent_checks` at a
    /// time. Each check's failure stays with that shard.
    async fn check_all(self: &Arc<Self>, shards: &[Shard]) {
        let permits = Arc::new(Semaphore::new(self.config.max_concurrent_checks.max(1)));
        let mut set = JoinSet::new();

        for shard in shards {
            let monitor = Arc::clone(self);
            let permits = Arc::clone(&permits);
            let shard_id = shard.shard_id.clone();
            set.spawn(async move {
                let Ok(_permit) = permits.acquire_owned().await else {
                    return;
                };
                if let Err(e) = monitor.check_shard_health(&shard_id).await {
                    warn!(%shard_id, error = %e, "health check skipped");
                }
            });
        }

        while let Some(joined) = set.join_next().await {
            if let Err(e) = joined {
                error!(error = %e, "health check task panicked");
            }
        }
    }

    async fn forget_removed(&self, shards: &[Shard]) {
        let mut runtime = self.shards.write().await;
        let removed: Vec<String> = runtime
            .keys()
            .filter(|id| !shards.iter().any(|s| &s.shard_id == *id))
            .cloned()
            .collect();
        if removed.is_empty() {
            return;
        }
        let mut history = self.history.write().await;
        let mut alerts = self.alerts.lock().await;
        for id in &removed {
            runtime.remove(id);
            history.remove(id);
            alerts.forget(id);
        }
        debug!(count = removed.len(), "dropped state of removed shards");
    }

    // ── Checks ─────────────────────────────────────────────────────

    /// Check one shard and persist its health.
    ///
    /// Only an unknown shard is an error; failures while checking are
    /// captured in the returned result.
    pub async fn check_shard_health(&self, shard_id: &str) -> HealthResult<HealthCheckResult> {
        self.total_checks.fetch_add(1, Ordering::Relaxed);

        let shard = match self.store.get_shard(shard_id) {
            Ok(Some(shard)) => shard,
            Ok(None) => return Err(HealthError::ShardNotFound(shard_id.to_string())),
            Err(e) => return Ok(self.record_exception(shard_id, e.to_string()).await),
        };

        let endpoint = self.probe_endpoint(&shard).await;
        let database = self.dependencies.database_healthy(&shard).await;
        let storage = self.dependencies.storage_healthy(&shard).await;
        let (database, storage) = match (database, storage) {
            (Ok(db), Ok(st)) => (db, st),
            (Err(e), _) | (_, Err(e)) => {
                return Ok(self.record_exception(shard_id, e.to_string()).await);
            }
        };

        let health = derive_health(endpoint.is_healthy(), database, storage);
        let now = epoch_secs();

        let result = {
            let mut runtime = self.shards.write().await;
            let entry = runtime.entry(shard_id.to_string()).or_default();
            if endpoint.is_healthy() {
                entry.consecutive_errors = 0;
            } else {
                entry.consecutive_errors += 1;
            }
            let result = HealthCheckResult {
                shard_id: shard_id.to_string(),
                health,
                control_plane_healthy: endpoint.is_healthy(),
                database_healthy: database,
                storage_healthy: storage,
                probe: Some(endpoint.result),
                response_time_ms: Some(endpoint.response_time_ms),
                consecutive_errors: entry.consecutive_errors,
                timestamp: now,
                error: None,
            };
            entry.health = health;
            entry.last_check = Some(now);
            entry.last_result = Some(result.clone());
            result
        };

        if !endpoint.is_healthy() {
            self.failed_checks.fetch_add(1, Ordering::Relaxed);
            self.audit(
                AuditEvent::new(EventType::HealthCheckFailed)
                    .actor("health-monitor")
                    .shard(shard_id)
                    .detail("probe", format!("{:?}", endpoint.result))
                    .detail("consecutive_errors", result.consecutive_errors)
                    .failed(format!("control endpoint {:?}", endpoint.result)),
            );
        }
        self.persist_health(shard_id, health, now);

        debug!(
            %shard_id,
            health = health.as_str(),
            response_ms = endpoint.response_time_ms,
            "health check completed"
        );
        Ok(result)
    }

    async fn probe_endpoint(&self, shard: &Shard) -> EndpointCheck {
        let http = self.http.read().await;
        match http.as_ref() {
            Some(probe) => probe.check(&shard.control_plane_url).await,
            None => EndpointCheck {
                result: ProbeResult::Failed,
                response_time_ms: 0.0,
            },
        }
    }

    /// The check itself failed: the shard counts as unhealthy.
    async fn record_exception(&self, shard_id: &str, cause: String) -> HealthCheckResult {
        error!(%shard_id, error = %cause, "health check failed");
        self.failed_checks.fetch_add(1, Ordering::Relaxed);
        let now = epoch_secs();

        let consecutive_errors = {
            let mut runtime = self.shards.write().await;
            let entry = runtime.entry(shard_id.to_string()).or_default();
            entry.consecutive_errors += 1;
            entry.health = ShardHealth::Unhealthy;
            entry.last_check = Some(now);
            entry.consecutive_errors
        };

        self.audit(
            AuditEvent::new(EventType::HealthCheckFailed)
                .actor("health-monitor")
                .shard(shard_id)
                .detail("consecutive_errors", consecutive_errors)
                .failed(&cause),
        );
        self.persist_health(shard_id, ShardHealth::Unhealthy, now);

        HealthCheckResult {
            shard_id: shard_id.to_string(),
            health: ShardHealth::Unhealthy,
            control_plane_healthy: false,
            database_healthy: false,
            storage_healthy: false,
            probe: None,
            response_time_ms: None,
            consecutive_errors,
            timestamp: now,
            error: Some(cause),
        }
    }

    /// Write the health fields onto the stored shard record in one atomic
    /// update, leaving the rest of it untouched.
    fn persist_health(&self, shard_id: &str, health: ShardHealth, now: u64) {
        let result = self.store.update_shard(shard_id, &mut |shard| {
            shard.health = health;
            shard.last_health_check = Some(now);
        });
        match result {
            Ok(Some(_)) => {}
            Ok(None) => debug!(%shard_id, "shard removed before health was persisted"),
            Err(e) => warn!(%shard_id, error = %e, "failed to persist shard health"),
        }
    }

    // ── Metrics and alerts ─────────────────────────────────────────

    async fn collect_metrics(&self, shards: &[Shard]) {
        let mut samples = Vec::new();
        for shard in shards {
            match self.metrics_source.sample(shard).await {
                Ok(Some(sample)) => samples.push(sample),
                Ok(None) => {}
                Err(e) => warn!(shard_id = %shard.shard_id, error = %e, "metrics collection failed"),
            }
        }

        let cutoff = epoch_secs().saturating_sub(self.config.metrics_retention_secs);
        let mut history = self.history.write().await;
        for sample in samples {
            history.record(sample);
        }
        history.prune(cutoff);
    }

    async fn evaluate_alerts(&self, shards: &[Shard], now: u64) -> Vec<Alert> {
        let runtime = self.shards.read().await;
        let mut tracker = self.alerts.lock().await;
        let mut fired = Vec::new();

        for shard in shards {
            let state = runtime.get(&shard.shard_id).cloned().unwrap_or_default();
            let input = AlertInput {
                shard_id: &shard.shard_id,
                health: state.health,
                consecutive_errors: state.consecutive_errors,
                utilization_percent: shard.utilization() * 100.0,
            };
            fired.extend(tracker.evaluate(&input, now));
        }
        drop(tracker);
        drop(runtime);

        for alert in &fired {
            if alert.kind == AlertKind::CapacityWarning {
                self.audit(
                    AuditEvent::new(EventType::CapacityWarning)
                        .actor("health-monitor")
                        .shard(&alert.shard_id)
                        .detail("message", alert.message.as_str()),
                );
            }
        }
        fired
    }

    /// Most recent alerts, newest first.
    pub async fn recent_alerts(&self, limit: usize) -> Vec<Alert> {
        self.alerts.lock().await.recent(limit)
    }

    fn audit(&self, event: AuditEvent) {
        if let Err(e) = self.store.save_audit_event(&event) {
            warn!(error = %e, event_type = ?event.event_type, "failed to record audit event");
        }
    }

    // ── Reports ────────────────────────────────────────────────────

    /// Shards the monitor last saw healthy.
    pub async fn active_shard_count(&self) -> usize {
        self.shards
            .read()
            .await
            .values()
            .filter(|s| s.health == ShardHealth::Healthy)
            .count()
    }

    pub async fn shard_status(&self, shard_id: &str) -> HealthResult<Option<ShardStatus>> {
        let Some(shard) = self.store.get_shard(shard_id)? else {
            return Ok(None);
        };
        Ok(Some(self.status_of(shard).await))
    }

    /// Status of every shard, ordered by shard id.
    pub async fn all_shard_status(&self) -> HealthResult<Vec<ShardStatus>> {
        let mut shards = self.store.get_all_shards()?;
        shards.sort_by(|a, b| a.shard_id.cmp(&b.shard_id));
        let mut statuses = Vec::with_capacity(shards.len());
        for shard in shards {
            statuses.push(self.status_of(shard).await);
        }
        Ok(statuses)
    }

    async fn status_of(&self, shard: Shard) -> ShardStatus {
        let runtime = self.shards.read().await.get(&shard.shard_id).cloned();
        let resource_usage = self.history.read().await.latest(&shard.shard_id).cloned();
        let last = runtime.as_ref().and_then(|r| r.last_result.as_ref());

        ShardStatus {
            health: runtime.as_ref().map_or(shard.health, |r| r.health),
            utilization_percent: shard.utilization() * 100.0,
            control_plane_healthy: last.is_some_and(|r| r.control_plane_healthy),
            database_healthy: last.is_some_and(|r| r.database_healthy),
            storage_healthy: last.is_some_and(|r| r.storage_healthy),
            last_health_check: runtime
                .as_ref()
                .and_then(|r| r.last_check)
                .or(shard.last_health_check),
            response_time_ms: last.and_then(|r| r.response_time_ms),
            consecutive_errors: runtime.as_ref().map_or(0, |r| r.consecutive_errors),
            resource_usage,
            shard_id: shard.shard_id,
            project_id: shard.project_id,
            region: shard.region,
            tenant_count: shard.tenant_count,
            max_tenants: shard.max_tenants,
            control_plane_url: shard.control_plane_url,
        }
    }

    pub async fn global_metrics(&self) -> HealthResult<GlobalMetrics> {
        let shards = self.store.get_all_shards()?;
        let projects = self.store.get_all_projects()?;
        let tenants = self.store.get_all_tenants()?.len();
        let runtime = self.shards.read().await;

        let health_of = |shard: &Shard| runtime.get(&shard.shard_id).map_or(shard.health, |r| r.health);
        let count = |h: ShardHealth| shards.iter().filter(|s| health_of(s) == h).count();

        let response_times: Vec<f64> = runtime
            .values()
            .filter_map(|r| r.last_result.as_ref().and_then(|l| l.response_time_ms))
            .collect();
        let avg_response_time_ms = if response_times.is_empty() {
            0.0
        } else {
            response_times.iter().sum::<f64>() / response_times.len() as f64
        };
        let max_response_time_ms = response_times.iter().copied().fold(0.0, f64::max);

        let total_checks = self.total_checks.load(Ordering::Relaxed);
        let failed_checks = self.failed_checks.load(Ordering::Relaxed);
        let total_capacity: u64 = shards.iter().map(|s| u64::from(s.max_tenants)).sum();
        let estimated_monthly_cost = shards.len() as f64 * self.capacity.monthly_cost_per_shard;

        let mut regional_distribution = std::collections::BTreeMap::new();
        for shard in &shards {
            *regional_distribution.entry(shard.region.clone()).or_insert(0) += 1;
        }

        Ok(GlobalMetrics {
            timestamp: epoch_secs(),
            total_projects: projects.len(),
            total_shards: shards.len(),
            total_tenants: tenants,
            avg_response_time_ms,
            max_response_time_ms,
            global_error_rate_percent: failed_checks as f64 / total_checks.max(1) as f64 * 100.0,
            total_capacity,
            used_capacity: tenants,
            utilization_percent: tenants as f64 / total_capacity.max(1) as f64 * 100.0,
            healthy_shards: count(ShardHealth::Healthy),
            degraded_shards: count(ShardHealth::Degraded),
            unhealthy_shards: count(ShardHealth::Unhealthy),
            unknown_shards: count(ShardHealth::Unknown),
            estimated_monthly_cost,
            cost_per_tenant: estimated_monthly_cost / tenants.max(1) as f64,
            regional_distribution,
        })
    }

    pub fn capacity_report(&self) -> HealthResult<CapacityReport> {
        let shards = self.store.get_all_shards()?;
        let stats = self.store.stats()?;
        Ok(reports::capacity_report(
            &shards,
            &stats.tenants_by_shard,
            stats.tenants,
            &self.capacity,
            epoch_secs(),
        ))
    }

    pub async fn monitoring_stats(&self) -> MonitoringStats {
        let runtime = self.shards.read().await;
        let total = self.total_checks.load(Ordering::Relaxed);
        let failed = self.failed_checks.load(Ordering::Relaxed);
        MonitoringStats {
            total_health_checks: total,
            failed_health_checks: failed,
            alerts_triggered: self.alerts.lock().await.total(),
            shards_monitored: runtime.len(),
            shards_with_errors: runtime.values().filter(|r| r.consecutive_errors > 0).count(),
            success_rate_percent: total.saturating_sub(failed) as f64 / total.max(1) as f64 * 100.0,
            monitoring_active: self.is_active(),
            health_check_interval_secs: self.config.interval_secs,
        }
    }
}

/// Without a client every endpoint probe reports `Failed`.
fn build_probe(config: &HealthConfig) -> Option<HttpProbe> {
    match HttpProbe::new(&config.health_path, config.probe_timeout()) {
        Ok(probe) => Some(probe),
        Err(e) => {
            error!(error = %e, "failed to build health probe client");
            None
        }
    }
}
