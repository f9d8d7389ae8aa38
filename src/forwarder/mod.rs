//! 故障转移转发模块
//!
//! 负责一次入站请求的完整生命周期：选择实例、转发、失败分类、
//! 标记不健康实例、指数退避重试，并保证每次尝试都释放连接计数。

pub mod headers;

use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use http::header::CONTENT_TYPE;
use http::{HeaderMap, Method, StatusCode};
use std::error::Error as StdError;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::balancer::{LoadBalancer, session_key_from_request};
use crate::error::{GatewayError, Result, UpstreamError, UpstreamErrorKind};
use crate::metrics::MetricsCollector;
use crate::registry::{ServiceConfig, ServiceInstance, ServiceRegistry};
use crate::retry::{ExponentialBackoffPolicy, RetryPolicy};
use crate::router::RouteMatch;

use headers::{
    X_CORRELATION_ID, X_INSTANCE_ID, X_RESPONSE_TIME, X_RETRY_COUNT, X_SERVICE_NAME, insert_str,
};

/// 待转发的入站请求
#[derive(Debug, Clone)]
pub struct GatewayRequest {
    pub method: Method,
    /// 入站路径（去掉 API 前缀后）
    pub path: String,
    pub query: Option<String>,
    pub headers: HeaderMap,
    pub body: Bytes,
    pub client_addr: Option<SocketAddr>,
    pub correlation_id: String,
}

impl GatewayRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: None,
            headers: HeaderMap::new(),
            body: Bytes::new(),
            client_addr: None,
            correlation_id: uuid::Uuid::new_v4().to_string(),
        }
    }

    /// 设置请求头；携带关联 ID 时沿用客户端的值
    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        if let Some(id) = headers::incoming_correlation_id(&headers) {
            self.correlation_id = id;
        }
        self.headers = headers;
        self
    }

    /// 使用调用方已确定的关联 ID
    pub fn with_correlation_id(mut self, correlation_id: impl Into<String>) -> Self {
        self.correlation_id = correlation_id.into();
        self
    }

    pub fn with_query(mut self, query: Option<String>) -> Self {
        self.query = query.filter(|q| !q.is_empty());
        self
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    pub fn with_client_addr(mut self, addr: Option<SocketAddr>) -> Self {
        self.client_addr = addr;
        self
    }
}

/// 转发后的响应
#[derive(Debug, Clone)]
pub struct GatewayResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl GatewayResponse {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }
}

impl IntoResponse for GatewayResponse {
    fn into_response(self) -> Response {
        let mut response = (self.status, self.body).into_response();
        *response.headers_mut() = self.headers;
        response
    }
}

/// 一次尝试拿到的上游响应
struct UpstreamReply {
    status: StatusCode,
    headers: HeaderMap,
    body: Bytes,
}

/// 故障转移转发器
pub struct FailoverForwarder {
    registry: ServiceRegistry,
    balancer: Arc<LoadBalancer>,
    metrics: MetricsCollector,
    http_client: reqwest::Client,
    gateway_version: String,
}

impl FailoverForwarder {
    pub fn new(
        registry: ServiceRegistry,
        balancer: Arc<LoadBalancer>,
        metrics: MetricsCollector,
        http_client: reqwest::Client,
        gateway_version: impl Into<String>,
    ) -> Self {
        Self {
            registry,
            balancer,
            metrics,
            http_client,
            gateway_version: gateway_version.into(),
        }
    }

    pub fn metrics(&self) -> &MetricsCollector {
        &self.metrics
    }

    /// 转发请求，必要时换实例重试
    pub async fn forward(&self, route: &RouteMatch, request: GatewayRequest) -> Result<GatewayResponse> {
        let started = Instant::now();
        let config = &route.service_config;

        let healthy = self.registry.get_healthy_instances(&config.id).await;
        if healthy.is_empty() {
            warn!(
                service_id = %config.id,
                correlation_id = %request.correlation_id,
                "No healthy instances available"
            );
            self.metrics.record_request(false, started.elapsed(), 0).await;
            return Err(GatewayError::service_unavailable(
                &config.id,
                "no healthy instances available",
            ));
        }

        let policy = ExponentialBackoffPolicy::for_service(config);
        let session_key = if config.load_balancing.sticky_sessions {
            session_key_from_request(&request.headers, request.client_addr, &config.load_balancing)
        } else {
            None
        };
        let outbound = headers::outbound_headers(
            &request.headers,
            request.client_addr,
            &request.correlation_id,
            &self.gateway_version,
        );
        let path_and_query = match &request.query {
            Some(query) => format!("{}?{}", route.transformed_path, query),
            None => route.transformed_path.clone(),
        };

        let mut candidates = healthy;
        let mut attempt: u32 = 0;
        loop {
            let Some(instance) = self
                .balancer
                .select_instance_with_sticky_session(
                    &config.id,
                    &config.load_balancing,
                    &candidates,
                    session_key.as_deref(),
                )
                .await
            else {
                warn!(
                    service_id = %config.id,
                    correlation_id = %request.correlation_id,
                    attempts = attempt,
                    "No healthy instances for failover"
                );
                self.metrics.record_request(false, started.elapsed(), attempt).await;
                return Err(GatewayError::service_unavailable(
                    &config.id,
                    "no healthy instances for failover",
                ));
            };

            let attempt_started = Instant::now();
            let outcome = {
                let _reservation = self.balancer.reserve(&instance);
                self.send_once(&instance, config, &request, &outbound, &path_and_query)
                    .await
            };
            let elapsed = attempt_started.elapsed();

            let instance_metrics = self
                .metrics
                .record_attempt(&instance.id, outcome.is_ok(), elapsed)
                .await;
            self.registry
                .update_instance_metrics(&config.id, &instance.id, instance_metrics)
                .await;

            match outcome {
                Ok(reply) => {
                    let total = started.elapsed();
                    self.metrics.record_request(true, total, attempt).await;
                    debug!(
                        service_id = %config.id,
                        instance_id = %instance.id,
                        status = reply.status.as_u16(),
                        retries = attempt,
                        elapsed_ms = total.as_millis() as u64,
                        correlation_id = %request.correlation_id,
                        "Request forwarded"
                    );
                    return Ok(self.finish(reply, config, &instance, &request, attempt, total));
                }
                Err(error) => {
                    warn!(
                        service_id = %config.id,
                        instance_id = %instance.id,
                        attempt,
                        kind = ?error.kind,
                        error = %error.message,
                        correlation_id = %request.correlation_id,
                        "Forwarding attempt failed"
                    );
                    if error.kind.marks_unhealthy() {
                        self.registry
                            .update_instance_health(&config.id, &instance.id, false)
                            .await;
                    }

                    if !policy.should_retry(attempt, &error) {
                        let attempts = attempt + 1;
                        self.metrics.record_request(false, started.elapsed(), attempt).await;
                        info!(
                            service_id = %config.id,
                            attempts,
                            last_error = %error.message,
                            correlation_id = %request.correlation_id,
                            "All forwarding attempts failed"
                        );
                        return Err(GatewayError::Forwarding {
                            service: config.id.clone(),
                            attempts,
                            last_error: error,
                        });
                    }

                    tokio::time::sleep(policy.backoff_duration(attempt)).await;
                    attempt += 1;
                    candidates = self.registry.get_healthy_instances(&config.id).await;
                }
            }
        }
    }

    async fn send_once(
        &self,
        instance: &ServiceInstance,
        config: &ServiceConfig,
        request: &GatewayRequest,
        outbound: &HeaderMap,
        path_and_query: &str,
    ) -> std::result::Result<UpstreamReply, UpstreamError> {
        let url = format!("{}{}", instance.url, path_and_query);

        let mut builder = self
            .http_client
            .request(request.method.clone(), &url)
            .headers(outbound.clone())
            .timeout(config.timeout());
        if !request.body.is_empty() {
            builder = builder.body(request.body.clone());
        }

        let response = builder
            .send()
            .await
            .map_err(|e| classify(&e, &instance.id))?;
        let status = response.status();
        let headers = response.headers().clone();
        let body = response
            .bytes()
            .await
            .map_err(|e| classify(&e, &instance.id))?;

        if matches!(
            status,
            StatusCode::BAD_GATEWAY | StatusCode::SERVICE_UNAVAILABLE | StatusCode::GATEWAY_TIMEOUT
        ) {
            return Err(UpstreamError::new(
                UpstreamErrorKind::BadStatus,
                &instance.id,
                format!("upstream responded with {}", status),
            ));
        }

        Ok(UpstreamReply {
            status,
            headers,
            body,
        })
    }

    fn finish(
        &self,
        reply: UpstreamReply,
        config: &ServiceConfig,
        instance: &ServiceInstance,
        request: &GatewayRequest,
        retries: u32,
        elapsed: Duration,
    ) -> GatewayResponse {
        let mut response_headers = headers::response_headers(&reply.headers);
        let body = normalize_body(&reply.headers, reply.body);

        insert_str(&mut response_headers, X_CORRELATION_ID, &request.correlation_id);
        insert_str(
            &mut response_headers,
            X_RESPONSE_TIME,
            &format!("{}ms", elapsed.as_millis()),
        );
        insert_str(&mut response_headers, X_INSTANCE_ID, &instance.id);
        insert_str(&mut response_headers, X_SERVICE_NAME, &config.name);
        insert_str(&mut response_headers, X_RETRY_COUNT, &retries.to_string());

        GatewayResponse {
            status: reply.status,
            headers: response_headers,
            body,
        }
    }
}

/// JSON 响应解析后重新序列化，其他内容原样透传
fn normalize_body(headers: &HeaderMap, body: Bytes) -> Bytes {
    let is_json = headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| ct.contains("json"));
    if !is_json || body.is_empty() {
        return body;
    }
    match serde_json::from_slice::<serde_json::Value>(&body) {
        Ok(value) => serde_json::to_vec(&value).map(Bytes::from).unwrap_or(body),
        Err(_) => body,
    }
}

/// 对单次失败分类
fn classify(error: &reqwest::Error, instance_id: &str) -> UpstreamError {
    let kind = if error.is_timeout() {
        UpstreamErrorKind::Timeout
    } else if error.is_connect() {
        if chain_mentions(error, &["dns", "resolve", "lookup"]) {
            UpstreamErrorKind::DnsFailure
        } else {
            UpstreamErrorKind::ConnectionRefused
        }
    } else {
        UpstreamErrorKind::Other
    };
    UpstreamError::new(kind, instance_id, error_chain(error))
}

fn error_chain(error: &reqwest::Error) -> String {
    let mut message = error.to_string();
    let mut source = error.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}

fn chain_mentions(error: &reqwest::Error, needles: &[&str]) -> bool {
    let chain = error_chain(error).to_lowercase();
    needles.iter().any(|n| chain.contains(n))
}
