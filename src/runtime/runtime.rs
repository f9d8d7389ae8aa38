//! 网关运行时实现

use async_broadcast::{Receiver, RecvError};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::balancer::LoadBalancer;
use crate::config::GatewayConfig;
use crate::error::{GatewayError, Result};
use crate::forwarder::FailoverForwarder;
use crate::metrics::MetricsCollector;
use crate::observability::EventLogger;
use crate::registry::{RegistryEvent, ServiceRegistry};
use crate::router::RequestRouter;
use crate::runtime::config::RuntimeConfig;
use crate::server::{AppState, build_router};

/// 网关运行时
///
/// 持有全部组件，`run()` 阻塞直到收到 Ctrl+C 或关闭信号，
/// 随后停止 HTTP 服务并销毁注册中心（停止所有后台任务）。
pub struct GatewayRuntime {
    config: GatewayConfig,
    runtime_config: RuntimeConfig,
    registry: ServiceRegistry,
    router: Arc<RequestRouter>,
    balancer: Arc<LoadBalancer>,
    forwarder: Arc<FailoverForwarder>,
    event_logger: EventLogger,
    topology_sync: JoinHandle<()>,
    shutdown_tx: Option<oneshot::Sender<()>>,
    shutdown_rx: oneshot::Receiver<()>,
}

impl GatewayRuntime {
    /// 按配置构建全部组件并加载初始拓扑
    pub async fn from_config(config: GatewayConfig) -> Result<Self> {
        config.validate()?;

        let http_client = reqwest::Client::builder().build()?;
        let registry = ServiceRegistry::with_http_client(http_client.clone());
        // 先订阅，初始注册产生的事件也会被记录
        let event_logger = EventLogger::spawn(&registry);

        let balancer = Arc::new(LoadBalancer::new());
        let metrics = MetricsCollector::new();
        let topology_sync = spawn_topology_sync(registry.subscribe(), balancer.clone(), metrics.clone());

        let router = Arc::new(RequestRouter::new(registry.clone()));
        let forwarder = Arc::new(FailoverForwarder::new(
            registry.clone(),
            balancer.clone(),
            metrics,
            http_client,
            config.server.gateway_version.clone(),
        ));

        for definition in config.services.iter().cloned() {
            registry.register_service(definition).await?;
        }
        for rule in config.routing_rules.iter().cloned() {
            router.add_dynamic_routing_rule(rule).await?;
        }
        if config.discovery.enabled {
            registry.configure_discovery(config.discovery.clone()).await?;
        }

        info!(
            services = config.services.len(),
            routing_rules = config.routing_rules.len(),
            discovery = config.discovery.enabled,
            "Gateway runtime initialized"
        );

        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        Ok(Self {
            config,
            runtime_config: RuntimeConfig::default(),
            registry,
            router,
            balancer,
            forwarder,
            event_logger,
            topology_sync,
            shutdown_tx: Some(shutdown_tx),
            shutdown_rx,
        })
    }

    /// 设置运行时配置
    pub fn with_runtime_config(mut self, runtime_config: RuntimeConfig) -> Self {
        self.runtime_config = runtime_config;
        self
    }

    pub fn registry(&self) -> &ServiceRegistry {
        &self.registry
    }

    pub fn router(&self) -> &Arc<RequestRouter> {
        &self.router
    }

    /// 取出关闭信号发送端（只能取一次）
    pub fn shutdown_handle(&mut self) -> Option<oneshot::Sender<()>> {
        self.shutdown_tx.take()
    }

    /// 处理器共享状态
    pub fn app_state(&self) -> AppState {
        AppState {
            registry: self.registry.clone(),
            router: self.router.clone(),
            balancer: self.balancer.clone(),
            forwarder: self.forwarder.clone(),
            api_prefix: self.config.server.api_prefix.clone(),
            body_limit: self.config.server.body_limit_bytes,
        }
    }

    /// 完整的 HTTP 路由
    pub fn http_router(&self) -> axum::Router {
        build_router(self.app_state())
    }

    /// 绑定配置中的地址并运行
    pub async fn run(self) -> Result<()> {
        let addr = self.config.server.socket_addr()?;
        let listener = TcpListener::bind(addr).await?;
        self.serve(listener).await
    }

    /// 在给定监听器上运行，直到收到关闭信号
    pub async fn serve(self, listener: TcpListener) -> Result<()> {
        let local_addr = listener.local_addr()?;
        info!(
            address = %local_addr,
            api_prefix = %self.config.server.api_prefix,
            "🚀 Starting gateway"
        );

        let app = self.http_router();
        let (stop_tx, stop_rx) = oneshot::channel::<()>();
        let mut server = tokio::spawn(async move {
            axum::serve(
                listener,
                app.into_make_service_with_connect_info::<SocketAddr>(),
            )
            .with_graceful_shutdown(async move {
                let _ = stop_rx.await;
            })
            .await
        });

        let Self {
            runtime_config,
            registry,
            event_logger,
            topology_sync,
            shutdown_tx: _shutdown_tx,
            shutdown_rx,
            ..
        } = self;
        // 发送端被丢弃不算关闭信号
        let shutdown_signal = async move {
            if shutdown_rx.await.is_err() {
                std::future::pending::<()>().await;
            }
        };

        let mut server_finished = false;
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Shutdown signal received (Ctrl+C)");
            }
            _ = shutdown_signal => {
                info!("Shutdown signal received");
            }
            result = &mut server => {
                server_finished = true;
                log_server_exit(result);
            }
        }

        if !server_finished {
            let _ = stop_tx.send(());
            match tokio::time::timeout(runtime_config.shutdown_timeout, &mut server).await {
                Ok(result) => log_server_exit(result),
                Err(_) => {
                    warn!("HTTP server shutdown timeout, forcing exit");
                    server.abort();
                }
            }
        }

        registry.destroy().await;
        match tokio::time::timeout(runtime_config.shutdown_timeout, event_logger.join()).await {
            Ok(logged) => debug!(logged, "Event logger stopped"),
            Err(_) => warn!("Event logger did not stop in time"),
        }
        topology_sync.abort();

        info!("Gateway stopped");
        Ok(())
    }
}

fn log_server_exit(result: std::result::Result<std::io::Result<()>, tokio::task::JoinError>) {
    match result {
        Ok(Ok(())) => info!("HTTP server stopped"),
        Ok(Err(e)) => error!(error = %GatewayError::from(e), "HTTP server failed"),
        Err(e) => error!(error = %e, "HTTP server task failed"),
    }
}

/// 服务被注销、覆盖或端点被替换时，丢弃负载均衡器和指标中的旧状态
fn spawn_topology_sync(
    mut events: Receiver<RegistryEvent>,
    balancer: Arc<LoadBalancer>,
    metrics: MetricsCollector,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(RegistryEvent::ServiceRegistered { service_id, .. })
                | Ok(RegistryEvent::ServiceDeregistered { service_id })
                | Ok(RegistryEvent::EndpointsUpdated { service_id, .. }) => {
                    balancer.forget_service(&service_id).await;
                    metrics.forget_instances(&service_id).await;
                }
                Ok(_) => {}
                Err(RecvError::Overflowed(skipped)) => {
                    warn!(skipped, "Topology sync lagging, events dropped");
                }
                Err(RecvError::Closed) => break,
            }
        }
    })
}
