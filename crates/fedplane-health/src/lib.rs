//! fedplane-health — shard health monitoring and capacity planning.
//!
//! A single background task polls every shard known to the metadata store,
//! derives its health from three sub-checks, persists the result, samples
//! resource metrics, and raises alerts.
//!
//! # Architecture
//!
//! ```text
//! HealthMonitor
//!   ├── monitoring loop (one task)
//!   │   ├── check_all ── Semaphore-bounded JoinSet of check_shard_health
//!   │   │                 ├── HttpProbe       GET <control_plane_url>/health
//!   │   │                 ├── DependencyProbe database + storage
//!   │   │                 └── update_shard { health, last_health_check }
//!   │   ├── collect_metrics ── MetricsSource → MetricsHistory (24h)
//!   │   └── evaluate_alerts ── AlertTracker (per shard/kind cooldown)
//!   └── reports: shard_status, global_metrics, capacity_report
//! ```
//!
//! # Health derivation
//!
//! | control endpoint | database | storage | health    |
//! |------------------|----------|---------|-----------|
//! | ok               | ok       | ok      | healthy   |
//! | ok               | fail     | *       | degraded  |
//! | ok               | *        | fail    | degraded  |
//! | fail             | *        | *       | unhealthy |
//!
//! A failed or timed-out control-endpoint probe, or any error while checking,
//! increments the shard's consecutive-error counter; a reachable control
//! endpoint resets it.

pub mod alerts;
pub mod checker;
pub mod config;
pub mod error;
pub mod metrics;
pub mod monitor;
pub mod reports;

pub use alerts::{Alert, AlertKind, AlertTracker};
pub use checker::{
    DependencyProbe, EndpointCheck, HealthCheckResult, HttpProbe, ProbeResult, StaticProbe,
    derive_health, webpki_tls_config,
};
pub use config::{AlertConfig, CapacityConfig, HealthConfig};
pub use error::{HealthError, HealthResult};
pub use metrics::{MetricsHistory, MetricsSource, NullMetricsSource, ShardResourceUsage};
pub use monitor::HealthMonitor;
pub use reports::{CapacityReport, GlobalMetrics, MonitoringStats, RegionCapacity, ShardStatus};
