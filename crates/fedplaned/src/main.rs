//! fedplaned — the fedplane daemon.
//!
//! Single binary that assembles the control plane:
//! - Metadata store (memory or redb)
//! - Tenant router
//! - Shard lifecycle manager
//! - Health monitor
//! - REST API
//!
//! # Usage
//!
//! ```text
//! fedplaned serve --config /etc/fedplane/fedplane.toml --port 8080
//! fedplaned route acme --num-shards 1000
//! fedplaned config > fedplane.toml
//! ```

mod config;
mod tasks;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand, ValueEnum};
use tokio::sync::watch;
use tracing::{error, info};

use fedplane_api::{Federation, build_router};
use fedplane_health::HealthMonitor;
use fedplane_lifecycle::{ShardLifecycleManager, SimulatedProvisioner};
use fedplane_router::{TenantRouter, shard_for_tenant, tenant_hash};
use fedplane_state::{StoreKind, open_store};

use crate::config::{FedplaneConfig, Overrides};

const DEFAULT_FILTER: &str = "info,fedplaned=debug,fedplane=debug";

#[derive(Parser)]
#[command(name = "fedplaned", about = "fedplane multi-tenant shard control plane")]
struct Cli {
    /// Log output format.
    #[arg(long, global = true, value_enum, default_value = "text", env = "FEDPLANE_LOG_FORMAT")]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Clone, Copy, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
enum Command {
    /// Run the control plane: API server plus background loops.
    Serve {
        /// Path to fedplane.toml.
        #[arg(long, env = "FEDPLANE_CONFIG")]
        config: Option<PathBuf>,

        /// Port to listen on.
        #[arg(long, env = "FEDPLANE_PORT")]
        port: Option<u16>,

        /// Metadata store backend.
        #[arg(long, value_enum, env = "FEDPLANE_STORE")]
        store: Option<StoreArg>,

        /// Data directory for the redb store.
        #[arg(long, env = "FEDPLANE_DATA_DIR")]
        data_dir: Option<PathBuf>,

        /// Shard count used by hash placement.
        #[arg(long, env = "FEDPLANE_NUM_SHARDS")]
        num_shards: Option<u32>,
    },

    /// Print the hash placement of a tenant.
    Route {
        tenant_id: String,

        #[arg(long, default_value = "1000", env = "FEDPLANE_NUM_SHARDS")]
        num_shards: u32,

        #[arg(long, default_value = "aipress-shard")]
        prefix: String,
    },

    /// Print the default configuration as TOML.
    Config,
}

#[derive(Clone, Copy, ValueEnum)]
enum StoreArg {
    Memory,
    Redb,
}

impl From<StoreArg> for StoreKind {
    fn from(arg: StoreArg) -> Self {
        match arg {
            StoreArg::Memory => StoreKind::Memory,
            StoreArg::Redb => StoreKind::Redb,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_format);

    match cli.command {
        Command::Serve {
            config,
            port,
            store,
            data_dir,
            num_shards,
        } => {
            let mut file_config = match &config {
                Some(path) => FedplaneConfig::from_file(path)?,
                None => FedplaneConfig::default(),
            };
            file_config.apply(&Overrides {
                port,
                store: store.map(StoreKind::from),
                data_dir,
                num_shards,
            });
            file_config.validate()?;
            run_serve(file_config).await
        }
        Command::Route {
            tenant_id,
            num_shards,
            prefix,
        } => {
            anyhow::ensure!(num_shards > 0, "--num-shards must be positive");
            println!("tenant:    {tenant_id}");
            println!("hash:      {}", tenant_hash(&tenant_id));
            println!("shard:     {}", shard_for_tenant(&tenant_id, num_shards, &prefix));
            println!("algorithm: consistent_hashing (N = {num_shards})");
            Ok(())
        }
        Command::Config => {
            print!("{}", FedplaneConfig::default().to_toml_string()?);
            Ok(())
        }
    }
}

fn init_tracing(format: LogFormat) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(DEFAULT_FILTER));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

async fn run_serve(config: FedplaneConfig) -> anyhow::Result<()> {
    info!(
        store = ?config.store.kind,
        num_shards = config.routing.num_shards,
        "fedplane daemon starting"
    );

    if let Some(parent) = config.store.path.as_deref().and_then(|p| p.parent()) {
        std::fs::create_dir_all(parent)?;
    }

    // ── Initialize components ──────────────────────────────────

    let store = open_store(&config.store)?;

    let router = Arc::new(
        TenantRouter::new(store.clone(), config.routing.clone())
            .with_project_prefix(&config.lifecycle.project_prefix),
    );

    let lifecycle = Arc::new(ShardLifecycleManager::new(
        store.clone(),
        Arc::new(SimulatedProvisioner::new()),
        config.lifecycle.clone(),
    ));

    let monitor = Arc::new(
        HealthMonitor::new(store.clone(), config.health.clone())
            .with_alert_config(config.alerts.clone())
            .with_capacity_config(config.capacity.clone()),
    );

    let federation = Arc::new(Federation::new(
        store,
        router.clone(),
        lifecycle.clone(),
        monitor.clone(),
    ));
    federation.initialize().await?;
    info!("federation initialized");

    // ── Start background tasks ─────────────────────────────────

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    monitor.start().await;

    let cleanup_handle = tokio::spawn(tasks::run_cleanup(
        lifecycle,
        Duration::from_secs(config.lifecycle.cleanup_interval_secs.max(1)),
        shutdown_rx.clone(),
    ));

    let rebalance_handle = config.routing.rebalance_interval_secs.map(|secs| {
        tokio::spawn(tasks::run_rebalance(
            router,
            Duration::from_secs(secs.max(1)),
            shutdown_rx,
        ))
    });

    // ── Start API server ───────────────────────────────────────

    let app = build_router(federation);
    let addr: SocketAddr = format!("{}:{}", config.server.bind, config.server.port).parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "API server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!(error = %e, "failed to listen for Ctrl-C");
            }
            info!("shutdown signal received");
            let _ = shutdown_tx.send(true);
        })
        .await?;

    // ── Shutdown ───────────────────────────────────────────────

    monitor.stop().await;
    if let Err(e) = cleanup_handle.await {
        error!(error = %e, "cleanup task ended abnormally");
    }
    if let Some(handle) = rebalance_handle {
        if let Err(e) = handle.await {
            error!(error = %e, "rebalance task ended abnormally");
        }
    }

    info!("fedplane daemon stopped");
    Ok(())
}
