//! 集成测试公共工具
//!
//! 在 127.0.0.1 的随机端口上启动回环上游服务，记录健康检查和业务请求次数。

#![allow(dead_code)]

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::TcpListener;

use flare_gateway::registry::{FailoverConfig, LoadBalancingAlgorithm, LoadBalancingConfig, ServiceConfigUpdate};
use flare_gateway::{HealthCheckPolicy, ServiceDefinition, ServiceRegistry};

/// 回环上游
pub struct Upstream {
    pub url: String,
    pub name: String,
    health_hits: Arc<AtomicUsize>,
    request_hits: Arc<AtomicUsize>,
    correlation_ids: Arc<Mutex<Vec<String>>>,
}

impl Upstream {
    /// 业务请求中收到的 x-correlation-id
    pub fn correlation_ids(&self) -> Vec<String> {
        self.correlation_ids.lock().expect("Lock poisoned").clone()
    }

    pub fn health_hits(&self) -> usize {
        self.health_hits.load(Ordering::SeqCst)
    }

    pub fn request_hits(&self) -> usize {
        self.request_hits.load(Ordering::SeqCst)
    }
}

/// 上游对业务请求的行为
#[derive(Clone, Copy)]
pub enum Behavior {
    /// 回显实例名、路径和查询字符串
    Echo,
    /// 等待一段时间后再回显
    Delay(Duration),
    /// 直接返回指定状态码
    Status(StatusCode),
}

#[derive(Clone)]
struct UpstreamState {
    name: String,
    behavior: Behavior,
    health_hits: Arc<AtomicUsize>,
    request_hits: Arc<AtomicUsize>,
    correlation_ids: Arc<Mutex<Vec<String>>>,
}

async fn handle(State(state): State<UpstreamState>, headers: HeaderMap, uri: Uri) -> Response {
    state.request_hits.fetch_add(1, Ordering::SeqCst);
    if let Some(id) = headers.get("x-correlation-id").and_then(|v| v.to_str().ok()) {
        state
            .correlation_ids
            .lock()
            .expect("Lock poisoned")
            .push(id.to_string());
    }

    match state.behavior {
        Behavior::Status(status) => return status.into_response(),
        Behavior::Delay(delay) => tokio::time::sleep(delay).await,
        Behavior::Echo => {}
    }
    Json(serde_json::json!({
        "instance": state.name,
        "path": uri.path(),
        "query": uri.query(),
    }))
    .into_response()
}

/// 启动一个上游：`/health` 返回 200，其余路径回显实例名和路径
pub async fn spawn_upstream(name: &str) -> Upstream {
    spawn_upstream_with(name, Behavior::Echo).await
}

/// 启动一个指定业务行为的上游，`/health` 始终返回 200
pub async fn spawn_upstream_with(name: &str, behavior: Behavior) -> Upstream {
    let state = UpstreamState {
        name: name.to_string(),
        behavior,
        health_hits: Arc::new(AtomicUsize::new(0)),
        request_hits: Arc::new(AtomicUsize::new(0)),
        correlation_ids: Arc::new(Mutex::new(Vec::new())),
    };

    let app = Router::new()
        .route(
            "/health",
            get(|State(state): State<UpstreamState>| async move {
                state.health_hits.fetch_add(1, Ordering::SeqCst);
                "ok"
            }),
        )
        .fallback(handle)
        .with_state(state.clone());

    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind upstream listener");
    let addr = listener.local_addr().expect("Failed to read upstream address");
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });

    Upstream {
        url: format!("http://{}", addr),
        name: name.to_string(),
        health_hits: state.health_hits,
        request_hits: state.request_hits,
        correlation_ids: state.correlation_ids,
    }
}

/// 一个没有进程监听的地址（绑定后立即释放）
pub async fn dead_url() -> String {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind probe listener");
    let addr = listener.local_addr().expect("Failed to read probe address");
    drop(listener);
    format!("http://{}", addr)
}

/// 关闭健康检查的服务定义
pub fn definition<S: AsRef<str>>(id: &str, urls: &[S]) -> ServiceDefinition {
    let mut definition = ServiceDefinition::new(id, id).with_health_check(HealthCheckPolicy::disabled());
    for url in urls {
        definition = definition.with_endpoint(url.as_ref());
    }
    definition
}

/// 设置负载均衡算法，并把重试延迟压到毫秒级
pub async fn tune_service(registry: &ServiceRegistry, id: &str, algorithm: LoadBalancingAlgorithm) {
    registry
        .update_service_config(
            id,
            ServiceConfigUpdate {
                load_balancing: Some(LoadBalancingConfig::default().with_algorithm(algorithm)),
                failover: Some(FailoverConfig {
                    enabled: true,
                    max_retries: 3,
                    retry_delay_ms: 5,
                    backoff_multiplier: 1.0,
                }),
                timeout_ms: Some(2_000),
                ..Default::default()
            },
        )
        .await
        .expect("Failed to update service config");
}
