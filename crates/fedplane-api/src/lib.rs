//! fedplane-api — REST API for the fedplane control plane.
//!
//! Provides axum route handlers over a [`Federation`]: tenant routing and
//! creation, shard projects, health status, and administrative operations.
//!
//! # API Routes
//!
//! | Method | Path | Description |
//! |---|---|---|
//! | GET | `/health` | Control-plane status |
//! | GET | `/metrics` | Global metrics |
//! | POST | `/tenants` | Create a tenant on the best shard |
//! | GET | `/tenants/{id}/route` | Route lookup |
//! | DELETE | `/tenants/{id}` | Unregister a tenant |
//! | POST | `/tenants/{id}/migrate` | Move a tenant to another shard |
//! | GET | `/projects` | List projects |
//! | GET | `/projects/{id}` | Project details |
//! | POST | `/projects/{shard_id}` | Provision a shard project |
//! | DELETE | `/projects/{id}` | Delete a project |
//! | GET | `/projects/{id}/costs` | Cost estimate |
//! | GET | `/shards` | Status of every shard |
//! | GET | `/shards/{id}` | Status of one shard |
//! | POST | `/shards/{id}/health-check` | Run a health check now |
//! | POST | `/shards/{id}/scale` | Change tenant capacity |
//! | POST | `/admin/rebalance` | Rebalance overloaded shards |
//! | GET | `/admin/capacity` | Capacity projection |
//! | GET | `/admin/consistency` | Routing consistency report |
//! | GET | `/admin/federation` | Federation status |
//! | GET | `/admin/stats` | Routing, lifecycle, and monitor counters |
//! | GET | `/admin/alerts` | Recent alerts |
//! | GET | `/admin/audit` | Recent audit events |
//! | POST | `/admin/cleanup` | Delete failed projects |
//! | GET | `/debug/routing/{id}` | Routing explanation |

pub mod federation;
pub mod handlers;

use std::sync::Arc;

use axum::Router;
use axum::routing::{delete, get, post};

pub use federation::{
    Federation, FederationError, FederationResult, TenantPlacement, TenantRoute,
};

/// Shared state for API handlers.
#[derive(Clone)]
pub struct ApiState {
    pub federation: Arc<Federation>,
}

/// Build the complete API router.
pub fn build_router(federation: Arc<Federation>) -> Router {
    let state = ApiState { federation };

    Router::new()
        .route("/health", get(handlers::health))
        .route("/metrics", get(handlers::global_metrics))
        .route("/tenants", post(handlers::create_tenant))
        .route("/tenants/{id}", delete(handlers::delete_tenant))
        .route("/tenants/{id}/route", get(handlers::tenant_route))
        .route("/tenants/{id}/migrate", post(handlers::migrate_tenant))
        .route("/projects", get(handlers::list_projects))
        .route(
            "/projects/{id}",
            get(handlers::get_project)
                .post(handlers::create_shard_project)
                .delete(handlers::delete_project),
        )
        .route("/projects/{id}/costs", get(handlers::project_costs))
        .route("/shards", get(handlers::list_shards))
        .route("/shards/{id}", get(handlers::get_shard))
        .route("/shards/{id}/health-check", post(handlers::check_shard))
        .route("/shards/{id}/scale", post(handlers::scale_shard))
        .route("/admin/rebalance", post(handlers::rebalance))
        .route("/admin/capacity", get(handlers::capacity_report))
        .route("/admin/consistency", get(handlers::consistency))
        .route("/admin/federation", get(handlers::federation_status))
        .route("/admin/stats", get(handlers::stats))
        .route("/admin/alerts", get(handlers::recent_alerts))
        .route("/admin/audit", get(handlers::audit_events))
        .route("/admin/cleanup", post(handlers::cleanup))
        .route("/debug/routing/{id}", get(handlers::debug_routing))
        .with_state(state)
}
