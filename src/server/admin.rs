//! 管理接口
//!
//! 注册中心、路由器和负载均衡器操作的薄封装，成功时返回 `{success:true, data}`。

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::balancer::BalancerStats;
use crate::discovery::ServiceDiscoveryConfig;
use crate::error::{ErrorResponse, GatewayError, Result};
use crate::forwarder::headers::correlation_id_from;
use crate::metrics::MetricsSnapshot;
use crate::registry::{
    PathRewriteRule, RegistryStats, ServiceConfig, ServiceInstance, ServiceVersionConfig,
};
use crate::router::{RouterStats, RoutingRule};
use crate::server::AppState;

/// 管理接口成功响应
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: T,
}

fn ok<T: Serialize>(status: StatusCode, data: T) -> Response {
    (status, Json(ApiResponse { success: true, data })).into_response()
}

fn respond<T: Serialize>(headers: &HeaderMap, status: StatusCode, result: Result<T>) -> Response {
    match result {
        Ok(data) => ok(status, data),
        Err(error) => ErrorResponse::new(error, correlation_id_from(headers)).into_response(),
    }
}

fn parse_json<T: DeserializeOwned>(body: &Bytes) -> Result<T> {
    Ok(serde_json::from_slice(body)?)
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceDetails {
    pub config: ServiceConfig,
    pub instances: Vec<ServiceInstance>,
    pub versions: Vec<ServiceVersionConfig>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayStats {
    pub registry: RegistryStats,
    pub router: RouterStats,
    pub balancer: BalancerStats,
    pub metrics: MetricsSnapshot,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VersionRequest {
    version: String,
    #[serde(default)]
    is_default: bool,
    #[serde(default = "default_true")]
    is_active: bool,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Deserialize)]
struct RewriteRuleRequest {
    pattern: String,
    replacement: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct PatternQuery {
    pattern: String,
}

#[derive(Debug, Deserialize)]
struct ToggleRequest {
    enabled: bool,
}

#[derive(Debug, Serialize)]
struct Removed {
    removed: bool,
}

pub(crate) async fn health() -> Response {
    ok(StatusCode::OK, serde_json::json!({ "status": "ok" }))
}

pub(crate) async fn list_services(State(state): State<AppState>) -> Response {
    let mut services = Vec::new();
    for config in state.registry.get_all_services().await {
        let instances = state.registry.get_all_instances(&config.id).await;
        let versions = state.registry.get_service_versions(&config.id).await;
        services.push(ServiceDetails {
            config,
            instances,
            versions,
        });
    }
    ok(StatusCode::OK, services)
}

pub(crate) async fn get_service(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Response {
    let result = match state.registry.get_service_config(&id).await {
        Some(config) => Ok(ServiceDetails {
            instances: state.registry.get_all_instances(&id).await,
            versions: state.registry.get_service_versions(&id).await,
            config,
        }),
        None => Err(GatewayError::not_found("service", id)),
    };
    respond(&headers, StatusCode::OK, result)
}

pub(crate) async fn register_version(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let result = async {
        let request: VersionRequest = parse_json(&body)?;
        let mut version = ServiceVersionConfig::new(&id, request.version);
        version.is_default = request.is_default;
        version.is_active = request.is_active;
        state.registry.register_service_version(&id, version).await?;
        Ok::<_, GatewayError>(state.registry.get_service_versions(&id).await)
    }
    .await;
    respond(&headers, StatusCode::CREATED, result)
}

pub(crate) async fn add_rewrite_rule(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let result = async {
        let request: RewriteRuleRequest = parse_json(&body)?;
        let rule = PathRewriteRule::new(request.pattern, request.replacement)?;
        state.registry.add_path_rewrite_rule(&id, rule.clone()).await?;
        Ok::<_, GatewayError>(rule)
    }
    .await;
    respond(&headers, StatusCode::CREATED, result)
}

pub(crate) async fn remove_rewrite_rule(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<PatternQuery>,
) -> Response {
    let removed = state
        .registry
        .remove_path_rewrite_rule(&id, &query.pattern)
        .await;
    ok(StatusCode::OK, Removed { removed })
}

pub(crate) async fn list_routing_rules(State(state): State<AppState>) -> Response {
    ok(StatusCode::OK, state.router.get_all_routing_rules().await)
}

pub(crate) async fn add_routing_rule(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let result = async {
        let rule: RoutingRule = parse_json(&body)?;
        state.router.add_dynamic_routing_rule(rule.clone()).await?;
        Ok::<_, GatewayError>(rule)
    }
    .await;
    respond(&headers, StatusCode::CREATED, result)
}

pub(crate) async fn toggle_routing_rule(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let result = async {
        let request: ToggleRequest = parse_json(&body)?;
        state.router.toggle_routing_rule(&id, request.enabled).await
    }
    .await;
    respond(&headers, StatusCode::OK, result)
}

pub(crate) async fn stats(State(state): State<AppState>) -> Response {
    ok(
        StatusCode::OK,
        GatewayStats {
            registry: state.registry.get_stats().await,
            router: state.router.get_stats().await,
            balancer: state.balancer.get_stats().await,
            metrics: state.forwarder.metrics().snapshot().await,
        },
    )
}

pub(crate) async fn configure_discovery(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let result = async {
        let config: ServiceDiscoveryConfig = parse_json(&body)?;
        state.registry.configure_discovery(config.clone()).await?;
        Ok::<_, GatewayError>(config)
    }
    .await;
    respond(&headers, StatusCode::OK, result)
}

pub(crate) async fn run_discovery(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let result = state.registry.discover_services().await;
    respond(&headers, StatusCode::OK, result)
}
