//! HTTP 服务端模块
//!
//! 基于 axum：API 前缀下的请求全部交给代理处理器，另提供管理接口和健康检查。

pub mod admin;
mod proxy;

use axum::Router;
use axum::routing::{get, patch, post};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::balancer::LoadBalancer;
use crate::forwarder::FailoverForwarder;
use crate::registry::ServiceRegistry;
use crate::router::RequestRouter;

/// 处理器共享状态
#[derive(Clone)]
pub struct AppState {
    pub registry: ServiceRegistry,
    pub router: Arc<RequestRouter>,
    pub balancer: Arc<LoadBalancer>,
    pub forwarder: Arc<FailoverForwarder>,
    pub api_prefix: String,
    pub body_limit: usize,
}

/// 构建完整的 HTTP 路由
pub fn build_router(state: AppState) -> Router {
    let admin = Router::new()
        .route("/services", get(admin::list_services))
        .route("/services/{id}", get(admin::get_service))
        .route("/services/{id}/versions", post(admin::register_version))
        .route(
            "/services/{id}/rewrite-rules",
            post(admin::add_rewrite_rule).delete(admin::remove_rewrite_rule),
        )
        .route(
            "/routing-rules",
            get(admin::list_routing_rules).post(admin::add_routing_rule),
        )
        .route("/routing-rules/{id}", patch(admin::toggle_routing_rule))
        .route("/stats", get(admin::stats))
        .route("/discovery", axum::routing::put(admin::configure_discovery))
        .route("/discovery/run", post(admin::run_discovery));

    Router::new()
        .route("/health", get(admin::health))
        .nest("/admin", admin)
        .fallback(proxy::proxy_handler)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
