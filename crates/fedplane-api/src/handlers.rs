//! REST API handlers.
//!
//! Handlers call into the [`Federation`](crate::Federation) and wrap results
//! in a `{success, data, error}` envelope.

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};
use tracing::error;

use fedplane_health::{HealthError, MonitoringStats};
use fedplane_lifecycle::{LifecycleError, LifecycleStats};
use fedplane_router::{RouterError, RoutingStats};
use fedplane_state::{Metadata, ShardHealth, epoch_secs};

use crate::ApiState;
use crate::federation::FederationError;

/// Response wrapper for consistent API format.
#[derive(Serialize)]
struct ApiResponse<T: Serialize> {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    code: Option<&'static str>,
}

impl<T: Serialize> ApiResponse<T> {
    fn ok(data: T) -> Json<Self> {
        Json(Self {
            success: true,
            data: Some(data),
            error: None,
            code: None,
        })
    }
}

fn error_response(msg: &str, status: StatusCode, code: &'static str) -> Response {
    (
        status,
        Json(ApiResponse::<()> {
            success: false,
            data: None,
            error: Some(msg.to_string()),
            code: Some(code),
        }),
    )
        .into_response()
}

fn not_found(msg: &str) -> Response {
    error_response(msg, StatusCode::NOT_FOUND, "not_found")
}

/// Status and machine-readable code for a federation error.
fn classify(err: &FederationError) -> (StatusCode, &'static str) {
    use FederationError as F;
    match err {
        F::RouteNotFound { .. }
        | F::Router(RouterError::TenantNotFound(_) | RouterError::ShardNotFound(_))
        | F::Lifecycle(LifecycleError::ShardNotFound(_) | LifecycleError::ProjectNotFound(_))
        | F::Health(HealthError::ShardNotFound(_)) => (StatusCode::NOT_FOUND, "not_found"),
        F::Router(RouterError::AlreadyRegistered { .. }) => (StatusCode::CONFLICT, "already_registered"),
        F::Lifecycle(LifecycleError::ShardExists(_)) => (StatusCode::CONFLICT, "shard_exists"),
        F::Router(RouterError::CapacityExhausted) => {
            (StatusCode::SERVICE_UNAVAILABLE, "capacity_exhausted")
        }
        F::Lifecycle(LifecycleError::Provisioning { .. }) => {
            (StatusCode::BAD_GATEWAY, "provisioning_failed")
        }
        _ => (StatusCode::INTERNAL_SERVER_ERROR, "internal"),
    }
}

fn federation_error(err: impl Into<FederationError>) -> Response {
    let err = err.into();
    let (status, code) = classify(&err);
    if status.is_server_error() {
        error!(error = %err, code, "request failed");
    }
    error_response(&err.to_string(), status, code)
}

// ── Status ─────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
pub struct HealthStatus {
    pub status: &'static str,
    pub timestamp: u64,
    pub active_shards: usize,
    pub total_tenants: usize,
    pub healthy_shards: usize,
    pub degraded_shards: usize,
    pub unhealthy_shards: usize,
    pub monitoring_active: bool,
}

/// GET /health
pub async fn health(State(state): State<ApiState>) -> impl IntoResponse {
    let fed = &state.federation;
    let statuses = match fed.monitor.all_shard_status().await {
        Ok(statuses) => statuses,
        Err(e) => return federation_error(e),
    };
    let count = |h: ShardHealth| statuses.iter().filter(|s| s.health == h).count();

    ApiResponse::ok(HealthStatus {
        status: "healthy",
        timestamp: epoch_secs(),
        active_shards: fed.monitor.active_shard_count().await,
        total_tenants: fed.router.total_tenant_count().await,
        healthy_shards: count(ShardHealth::Healthy),
        degraded_shards: count(ShardHealth::Degraded),
        unhealthy_shards: count(ShardHealth::Unhealthy),
        monitoring_active: fed.monitor.is_active(),
    })
    .into_response()
}

/// GET /metrics
pub async fn global_metrics(State(state): State<ApiState>) -> impl IntoResponse {
    match state.federation.monitor.global_metrics().await {
        Ok(metrics) => ApiResponse::ok(metrics).into_response(),
        Err(e) => federation_error(e),
    }
}

// ── Tenants ────────────────────────────────────────────────────

/// Tenant creation request body.
#[derive(Debug, Deserialize)]
pub struct CreateTenantRequest {
    pub tenant_id: String,
    #[serde(default)]
    pub metadata: Metadata,
}

/// POST /tenants
pub async fn create_tenant(
    State(state): State<ApiState>,
    Json(req): Json<CreateTenantRequest>,
) -> impl IntoResponse {
    if req.tenant_id.trim().is_empty() {
        return error_response("tenant_id must not be empty", StatusCode::BAD_REQUEST, "invalid");
    }
    match state
        .federation
        .create_tenant(&req.tenant_id, req.metadata)
        .await
    {
        Ok(placement) if placement.created => {
            (StatusCode::CREATED, ApiResponse::ok(placement)).into_response()
        }
        Ok(placement) => ApiResponse::ok(placement).into_response(),
        Err(e) => federation_error(e),
    }
}

/// GET /tenants/:id/route
pub async fn tenant_route(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    match state.federation.route(&id).await {
        Ok(route) => ApiResponse::ok(route).into_response(),
        Err(e) => federation_error(e),
    }
}

/// DELETE /tenants/:id
pub async fn delete_tenant(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    match state.federation.delete_tenant(&id).await {
        Ok(true) => ApiResponse::ok("deleted").into_response(),
        Ok(false) => not_found("tenant not found"),
        Err(e) => federation_error(e),
    }
}

/// Migration request body.
#[derive(Debug, Deserialize)]
pub struct MigrateRequest {
    pub target_shard_id: String,
}

/// POST /tenants/:id/migrate
pub async fn migrate_tenant(
    State(state): State<ApiState>,
    Path(id): Path<String>,
    Json(req): Json<MigrateRequest>,
) -> impl IntoResponse {
    match state
        .federation
        .migrate_tenant(&id, &req.target_shard_id)
        .await
    {
        Ok(true) => ApiResponse::ok(serde_json::json!({
            "tenant_id": id,
            "shard_id": req.target_shard_id,
            "migrated": true,
        }))
        .into_response(),
        Ok(false) => error_response(
            &format!("shard {} is at capacity", req.target_shard_id),
            StatusCode::CONFLICT,
            "target_full",
        ),
        Err(e) => federation_error(e),
    }
}

// ── Projects ───────────────────────────────────────────────────

/// GET /projects
pub async fn list_projects(State(state): State<ApiState>) -> impl IntoResponse {
    match state.federation.lifecycle.list_projects() {
        Ok(projects) => ApiResponse::ok(projects).into_response(),
        Err(e) => federation_error(e),
    }
}

/// GET /projects/:id
pub async fn get_project(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    match state.federation.lifecycle.get_project_info(&id) {
        Ok(Some(project)) => ApiResponse::ok(project).into_response(),
        Ok(None) => not_found("project not found"),
        Err(e) => federation_error(e),
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct CreateProjectParams {
    pub region: Option<String>,
}

/// POST /projects/:shard_id
pub async fn create_shard_project(
    State(state): State<ApiState>,
    Path(shard_id): Path<String>,
    Query(params): Query<CreateProjectParams>,
) -> impl IntoResponse {
    match state
        .federation
        .create_shard(&shard_id, params.region.as_deref())
        .await
    {
        Ok(shard) => (StatusCode::CREATED, ApiResponse::ok(shard)).into_response(),
        Err(e) => federation_error(e),
    }
}

/// DELETE /projects/:id
pub async fn delete_project(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    match state.federation.delete_project(&id).await {
        Ok(true) => ApiResponse::ok("deleted").into_response(),
        Ok(false) => error_response(
            "project deletion failed",
            StatusCode::BAD_GATEWAY,
            "deletion_failed",
        ),
        Err(e) => federation_error(e),
    }
}

/// GET /projects/:id/costs
pub async fn project_costs(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    match state.federation.lifecycle.project_costs(&id) {
        Ok(costs) => ApiResponse::ok(costs).into_response(),
        Err(e) => federation_error(e),
    }
}

// ── Shards ─────────────────────────────────────────────────────

/// GET /shards
pub async fn list_shards(State(state): State<ApiState>) -> impl IntoResponse {
    match state.federation.monitor.all_shard_status().await {
        Ok(statuses) => ApiResponse::ok(statuses).into_response(),
        Err(e) => federation_error(e),
    }
}

/// GET /shards/:id
pub async fn get_shard(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    match state.federation.monitor.shard_status(&id).await {
        Ok(Some(status)) => ApiResponse::ok(status).into_response(),
        Ok(None) => not_found("shard not found"),
        Err(e) => federation_error(e),
    }
}

/// POST /shards/:id/health-check
pub async fn check_shard(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    match state.federation.monitor.check_shard_health(&id).await {
        Ok(result) => ApiResponse::ok(result).into_response(),
        Err(e) => federation_error(e),
    }
}

/// Scale request body.
#[derive(Debug, Deserialize)]
pub struct ScaleRequest {
    pub max_tenants: u32,
}

/// POST /shards/:id/scale
pub async fn scale_shard(
    State(state): State<ApiState>,
    Path(id): Path<String>,
    Json(req): Json<ScaleRequest>,
) -> impl IntoResponse {
    if req.max_tenants == 0 {
        return error_response("max_tenants must be positive", StatusCode::BAD_REQUEST, "invalid");
    }
    match state.federation.scale_shard(&id, req.max_tenants).await {
        Ok(shard) => ApiResponse::ok(shard).into_response(),
        Err(e) => federation_error(e),
    }
}

// ── Admin ──────────────────────────────────────────────────────

/// POST /admin/rebalance
pub async fn rebalance(State(state): State<ApiState>) -> impl IntoResponse {
    match state.federation.router.rebalance().await {
        Ok(report) => ApiResponse::ok(report).into_response(),
        Err(e) => federation_error(e),
    }
}

/// GET /admin/capacity
pub async fn capacity_report(State(state): State<ApiState>) -> impl IntoResponse {
    match state.federation.monitor.capacity_report() {
        Ok(report) => ApiResponse::ok(report).into_response(),
        Err(e) => federation_error(e),
    }
}

/// GET /admin/consistency
pub async fn consistency(State(state): State<ApiState>) -> impl IntoResponse {
    ApiResponse::ok(state.federation.router.validate_routing_consistency().await)
}

/// GET /admin/federation
pub async fn federation_status(State(state): State<ApiState>) -> impl IntoResponse {
    match state.federation.lifecycle.federation_status() {
        Ok(status) => ApiResponse::ok(status).into_response(),
        Err(e) => federation_error(e),
    }
}

#[derive(Debug, Serialize)]
pub struct Stats {
    pub routing: RoutingStats,
    pub lifecycle: LifecycleStats,
    pub monitoring: MonitoringStats,
}

/// GET /admin/stats
pub async fn stats(State(state): State<ApiState>) -> impl IntoResponse {
    let fed = &state.federation;
    let lifecycle = match fed.lifecycle.statistics() {
        Ok(stats) => stats,
        Err(e) => return federation_error(e),
    };
    ApiResponse::ok(Stats {
        routing: fed.router.statistics().await,
        lifecycle,
        monitoring: fed.monitor.monitoring_stats().await,
    })
    .into_response()
}

#[derive(Debug, Default, Deserialize)]
pub struct PageParams {
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

/// GET /admin/alerts
pub async fn recent_alerts(
    State(state): State<ApiState>,
    Query(page): Query<PageParams>,
) -> impl IntoResponse {
    let limit = page.limit.unwrap_or(50);
    ApiResponse::ok(state.federation.monitor.recent_alerts(limit).await)
}

/// GET /admin/audit
pub async fn audit_events(
    State(state): State<ApiState>,
    Query(page): Query<PageParams>,
) -> impl IntoResponse {
    let limit = page.limit.unwrap_or(100);
    let offset = page.offset.unwrap_or(0);
    match state.federation.store.get_audit_events(limit, offset) {
        Ok(events) => ApiResponse::ok(events).into_response(),
        Err(e) => federation_error(e),
    }
}

/// POST /admin/cleanup
pub async fn cleanup(State(state): State<ApiState>) -> impl IntoResponse {
    match state.federation.lifecycle.cleanup_failed_projects().await {
        Ok(cleaned) => ApiResponse::ok(serde_json::json!({ "cleaned": cleaned })).into_response(),
        Err(e) => federation_error(e),
    }
}

// ── Debug ──────────────────────────────────────────────────────

/// GET /debug/routing/:id
pub async fn debug_routing(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    ApiResponse::ok(state.federation.router.debug_routing(&id).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::federation::tests::federation;
    use fedplane_state::Shard;

    fn test_state(max_tenants: u32) -> ApiState {
        ApiState {
            federation: federation(max_tenants),
        }
    }

    fn create_request(tenant_id: &str) -> Json<CreateTenantRequest> {
        Json(CreateTenantRequest {
            tenant_id: tenant_id.to_string(),
            metadata: Metadata::new(),
        })
    }

    #[tokio::test]
    async fn create_tenant_then_conflict_free_repeat() {
        let state = test_state(10);
        let resp = create_tenant(State(state.clone()), create_request("acme"))
            .await
            .into_response();
        assert_eq!(resp.status(), StatusCode::CREATED);

        let resp = create_tenant(State(state), create_request("acme"))
            .await
            .into_response();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn empty_tenant_id_is_rejected() {
        let resp = create_tenant(State(test_state(10)), create_request("  "))
            .await
            .into_response();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn route_for_missing_shard_is_404() {
        let resp = tenant_route(State(test_state(10)), Path("acme".to_string()))
            .await
            .into_response();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn migrate_unknown_tenant_is_404() {
        let resp = migrate_tenant(
            State(test_state(10)),
            Path("ghost".to_string()),
            Json(MigrateRequest {
                target_shard_id: "aipress-shard-001".to_string(),
            }),
        )
        .await
        .into_response();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn migrate_to_full_shard_conflicts() {
        let state = test_state(1);
        state.federation.create_tenant("a", Metadata::new()).await.unwrap();
        state.federation.create_tenant("b", Metadata::new()).await.unwrap();

        let resp = migrate_tenant(
            State(state),
            Path("b".to_string()),
            Json(MigrateRequest {
                target_shard_id: "aipress-shard-001".to_string(),
            }),
        )
        .await
        .into_response();
        assert_eq!(resp.status(), StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn delete_missing_tenant_is_404() {
        let resp = delete_tenant(State(test_state(10)), Path("ghost".to_string()))
            .await
            .into_response();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn unknown_shard_health_check_is_404() {
        let resp = check_shard(State(test_state(10)), Path("nope".to_string()))
            .await
            .into_response();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn scale_rejects_zero() {
        let resp = scale_shard(
            State(test_state(10)),
            Path("aipress-shard-001".to_string()),
            Json(ScaleRequest { max_tenants: 0 }),
        )
        .await
        .into_response();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn project_routes() {
        let state = test_state(10);
        let resp = create_shard_project(
            State(state.clone()),
            Path("aipress-shard-007".to_string()),
            Query(CreateProjectParams {
                region: Some("europe-west1".to_string()),
            }),
        )
        .await
        .into_response();
        assert_eq!(resp.status(), StatusCode::CREATED);

        let shard: Shard = state
            .federation
            .store
            .get_shard("aipress-shard-007")
            .unwrap()
            .unwrap();
        assert_eq!(shard.region, "europe-west1");

        let resp = create_shard_project(
            State(state.clone()),
            Path("aipress-shard-007".to_string()),
            Query(CreateProjectParams { region: None }),
        )
        .await
        .into_response();
        assert_eq!(resp.status(), StatusCode::CONFLICT);

        let resp = get_project(State(state.clone()), Path(shard.project_id.clone()))
            .await
            .into_response();
        assert_eq!(resp.status(), StatusCode::OK);

        let resp = delete_project(State(state.clone()), Path(shard.project_id.clone()))
            .await
            .into_response();
        assert_eq!(resp.status(), StatusCode::OK);

        let resp = get_project(State(state), Path(shard.project_id))
            .await
            .into_response();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn error_classification() {
        let cases = [
            (
                FederationError::Router(RouterError::CapacityExhausted),
                StatusCode::SERVICE_UNAVAILABLE,
                "capacity_exhausted",
            ),
            (
                FederationError::Lifecycle(LifecycleError::Provisioning {
                    shard_id: "s".into(),
                    step: "create_project".into(),
                    reason: "quota".into(),
                }),
                StatusCode::BAD_GATEWAY,
                "provisioning_failed",
            ),
            (
                FederationError::Router(RouterError::AlreadyRegistered {
                    tenant_id: "t".into(),
                    shard_id: "s".into(),
                }),
                StatusCode::CONFLICT,
                "already_registered",
            ),
            (
                FederationError::Lifecycle(LifecycleError::ShardExists("s".into())),
                StatusCode::CONFLICT,
                "shard_exists",
            ),
            (
                FederationError::Health(HealthError::ShardNotFound("s".into())),
                StatusCode::NOT_FOUND,
                "not_found",
            ),
        ];
        for (err, status, code) in cases {
            assert_eq!(classify(&err), (status, code), "{err}");
        }
    }
}
