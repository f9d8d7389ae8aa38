//! 代理入口：API 前缀下的所有请求都走 路由 -> 转发

use axum::extract::{ConnectInfo, Request, State};
use axum::response::{IntoResponse, Response};
use std::net::SocketAddr;
use tracing::debug;

use crate::error::{ErrorResponse, GatewayError, Result};
use crate::forwarder::headers::correlation_id_from;
use crate::forwarder::{GatewayRequest, GatewayResponse};
use crate::router::RouteRequest;
use crate::server::AppState;

pub(crate) async fn proxy_handler(State(state): State<AppState>, request: Request) -> Response {
    let correlation_id = correlation_id_from(request.headers());
    match proxy(&state, request, &correlation_id).await {
        Ok(response) => response.into_response(),
        Err(error) => ErrorResponse::new(error, correlation_id).into_response(),
    }
}

async fn proxy(state: &AppState, request: Request, correlation_id: &str) -> Result<GatewayResponse> {
    let client_addr = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|info| info.0);
    let (parts, body) = request.into_parts();

    let path = strip_api_prefix(&state.api_prefix, parts.uri.path())
        .ok_or_else(|| GatewayError::route_not_found(parts.method.as_str(), parts.uri.path()))?;

    let route_request = RouteRequest::new(parts.method.clone(), path.clone()).with_headers(parts.headers.clone());
    let route = state.router.resolve(&route_request).await?;

    let body = axum::body::to_bytes(body, state.body_limit)
        .await
        .map_err(|e| GatewayError::validation(format!("failed to read request body: {}", e)))?;

    debug!(
        method = %parts.method,
        path = %path,
        service_id = %route.service_config.id,
        correlation_id = %correlation_id,
        "Proxying request"
    );

    let gateway_request = GatewayRequest::new(parts.method, path)
        .with_headers(parts.headers)
        .with_correlation_id(correlation_id)
        .with_query(parts.uri.query().map(str::to_string))
        .with_body(body)
        .with_client_addr(client_addr);

    state.forwarder.forward(&route, gateway_request).await
}

/// 去掉 API 前缀，前缀必须落在路径段边界上
pub(crate) fn strip_api_prefix(prefix: &str, path: &str) -> Option<String> {
    let prefix = prefix.trim_end_matches('/');
    if prefix.is_empty() {
        return Some(path.to_string());
    }
    let rest = path.strip_prefix(prefix)?;
    if rest.is_empty() {
        Some("/".to_string())
    } else if rest.starts_with('/') {
        Some(rest.to_string())
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::strip_api_prefix;

    #[test]
    fn test_strip_api_prefix() {
        assert_eq!(strip_api_prefix("/api/v1", "/api/v1/orders/1").as_deref(), Some("/orders/1"));
        assert_eq!(strip_api_prefix("/api/v1", "/api/v1").as_deref(), Some("/"));
        assert_eq!(strip_api_prefix("/api/v1", "/api/v10/orders"), None);
        assert_eq!(strip_api_prefix("/api/v1", "/other"), None);
        assert_eq!(strip_api_prefix("/", "/orders").as_deref(), Some("/orders"));
    }
}
