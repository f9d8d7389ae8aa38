//! 服务注册中心
//!
//! 拓扑的唯一数据源：服务配置、实例、健康状态、版本和路径重写规则。
//! 注册中心拥有全部后台任务（每个服务一个健康检查任务，加上一个服务发现轮询任务），
//! 每个任务都挂在根取消令牌下，可以单独取消，也可以在 `destroy()` 时统一取消。

use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::time::Duration;

use serde::Serialize;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::discovery::{DiscoveryFactory, ServiceDiscoveryConfig};
use crate::error::{GatewayError, Result};
use crate::registry::config::{
    DEFAULT_RETRIES, DEFAULT_TIMEOUT_MS, FailoverConfig, HealthCheckConfig, LoadBalancingConfig,
    PathRewriteRule, ServiceConfig, ServiceConfigUpdate, ServiceVersionConfig, VersioningConfig,
};
use crate::registry::events::{EventBus, RegistryEvent};
use crate::registry::health::HealthChecker;
use crate::registry::instance::{InstanceMetrics, ServiceInstance};
use crate::types::{EndpointDefinition, ServiceDefinition};

/// 后台任务句柄
struct BackgroundTask {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

impl BackgroundTask {
    /// 取消并等待任务退出
    async fn stop(self) {
        self.cancel.cancel();
        if let Err(e) = self.handle.await {
            if !e.is_cancelled() {
                warn!(error = %e, "Background task terminated abnormally");
            }
        }
    }
}

struct ServiceEntry {
    config: ServiceConfig,
    instances: Vec<ServiceInstance>,
    versions: Vec<ServiceVersionConfig>,
}

#[derive(Default)]
struct DiscoveryState {
    config: Option<ServiceDiscoveryConfig>,
    task: Option<BackgroundTask>,
}

struct RegistryInner {
    services: RwLock<HashMap<String, ServiceEntry>>,
    health_tasks: Mutex<HashMap<String, BackgroundTask>>,
    discovery: Mutex<DiscoveryState>,
    events: EventBus,
    checker: HealthChecker,
    http_client: reqwest::Client,
    shutdown: CancellationToken,
}

impl Drop for RegistryInner {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

/// 一次服务发现的结果
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscoveryReport {
    pub provider: String,
    pub discovered: usize,
    pub changed: usize,
}

/// 单个服务的统计
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceStats {
    pub id: String,
    pub name: String,
    pub total_instances: usize,
    pub healthy_instances: usize,
    pub unhealthy_instances: usize,
}

/// 注册中心聚合统计
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistryStats {
    pub total_services: usize,
    pub total_instances: usize,
    pub healthy_instances: usize,
    pub unhealthy_instances: usize,
    pub health_check_tasks: usize,
    pub discovery_enabled: bool,
    pub services: Vec<ServiceStats>,
}

impl RegistryStats {
    pub fn service(&self, id: &str) -> Option<&ServiceStats> {
        self.services.iter().find(|s| s.id == id)
    }
}

/// 服务注册中心
///
/// 由组合根显式构造并注入到路由器、转发器中；克隆共享同一份状态。
#[derive(Clone)]
pub struct ServiceRegistry {
    inner: Arc<RegistryInner>,
}

impl ServiceRegistry {
    pub fn new() -> Self {
        Self::with_http_client(reqwest::Client::new())
    }

    /// 使用指定的 HTTP 客户端（健康检查与服务发现共用）
    pub fn with_http_client(http_client: reqwest::Client) -> Self {
        Self {
            inner: Arc::new(RegistryInner {
                services: RwLock::new(HashMap::new()),
                health_tasks: Mutex::new(HashMap::new()),
                discovery: Mutex::new(DiscoveryState::default()),
                events: EventBus::default(),
                checker: HealthChecker::new(http_client.clone()),
                http_client,
                shutdown: CancellationToken::new(),
            }),
        }
    }

    /// 订阅注册中心事件
    pub fn subscribe(&self) -> async_broadcast::Receiver<RegistryEvent> {
        self.inner.events.subscribe()
    }

    fn emit(&self, event: RegistryEvent) {
        self.inner.events.publish(event);
    }

    // ============================================================
    // 服务注册 / 注销
    // ============================================================

    /// 注册服务
    ///
    /// 使用默认策略构建 `ServiceConfig`，每个端点生成一个实例；
    /// 相同 ID 的服务会被覆盖。
    pub async fn register_service(&self, definition: ServiceDefinition) -> Result<()> {
        validate_definition(&definition)?;

        let config = build_config(&definition);
        let instances = build_instances(&definition.id, &definition.endpoints);
        let health_check = config.health_check.clone();
        let service_id = definition.id.clone();
        let instance_count = instances.len();

        let entry = ServiceEntry {
            versions: vec![ServiceVersionConfig::new(&service_id, &config.version).as_default()],
            config,
            instances,
        };

        let replaced = {
            let mut services = self.inner.services.write().await;
            services.insert(service_id.clone(), entry).is_some()
        };

        self.restart_health_task(&service_id, &health_check).await;

        info!(
            service_id = %service_id,
            instances = instance_count,
            replaced,
            "Service registered"
        );
        self.emit(RegistryEvent::ServiceRegistered {
            service_id,
            instances: instance_count,
        });
        Ok(())
    }

    /// 注销服务，停止其健康检查任务并删除全部状态
    pub async fn deregister_service(&self, service_id: &str) -> Result<()> {
        let removed = self.inner.services.write().await.remove(service_id);
        if removed.is_none() {
            return Err(GatewayError::not_found("service", service_id));
        }

        self.stop_health_task(service_id).await;

        info!(service_id = %service_id, "Service deregistered");
        self.emit(RegistryEvent::ServiceDeregistered {
            service_id: service_id.to_string(),
        });
        Ok(())
    }

    /// 注册或更新服务（服务发现使用）
    ///
    /// 未知服务直接注册；已知服务只在端点 URL 集合变化时重建实例。
    /// 返回是否发生了变化。
    pub async fn register_or_update_service(&self, definition: ServiceDefinition) -> Result<bool> {
        let existing = {
            let services = self.inner.services.read().await;
            services.get(&definition.id).map(|e| e.config.upstreams.clone())
        };

        match existing {
            None => {
                self.register_service(definition).await?;
                Ok(true)
            }
            Some(current) => {
                let incoming: Vec<String> = definition
                    .endpoints
                    .iter()
                    .map(|e| normalize_url(&e.url))
                    .collect();
                if same_url_set(&current, &incoming) {
                    debug!(service_id = %definition.id, "Endpoints unchanged, skipping update");
                    return Ok(false);
                }
                self.update_service_endpoints(&definition.id, definition.endpoints)
                    .await?;
                Ok(true)
            }
        }
    }

    /// 替换服务端点，实例被重建（连接计数归零）
    pub async fn update_service_endpoints(
        &self,
        service_id: &str,
        endpoints: Vec<EndpointDefinition>,
    ) -> Result<()> {
        validate_endpoints(service_id, &endpoints)?;

        let (health_check, count) = {
            let mut services = self.inner.services.write().await;
            let entry = services
                .get_mut(service_id)
                .ok_or_else(|| GatewayError::not_found("service", service_id))?;
            entry.instances = build_instances(service_id, &endpoints);
            entry.config.upstreams = entry.instances.iter().map(|i| i.url.clone()).collect();
            (entry.config.health_check.clone(), entry.instances.len())
        };

        self.restart_health_task(service_id, &health_check).await;

        info!(service_id = %service_id, instances = count, "Service endpoints updated");
        self.emit(RegistryEvent::EndpointsUpdated {
            service_id: service_id.to_string(),
            instances: count,
        });
        Ok(())
    }

    /// 部分更新服务配置
    pub async fn update_service_config(
        &self,
        service_id: &str,
        update: ServiceConfigUpdate,
    ) -> Result<ServiceConfig> {
        if let Some(prefix) = &update.route_prefix {
            validate_route_prefix(prefix)?;
        }
        if let Some(health_check) = &update.health_check {
            validate_health_check(health_check)?;
        }

        let (config, health_changed) = {
            let mut services = self.inner.services.write().await;
            let entry = services
                .get_mut(service_id)
                .ok_or_else(|| GatewayError::not_found("service", service_id))?;
            let config = &mut entry.config;

            let mut health_changed = false;
            if let Some(version) = update.version {
                config.version = version;
            }
            if let Some(prefix) = update.route_prefix {
                config.route_prefix = prefix;
            }
            if let Some(timeout_ms) = update.timeout_ms {
                config.timeout_ms = timeout_ms;
            }
            if let Some(retries) = update.retries {
                config.retries = retries;
            }
            if let Some(health_check) = update.health_check {
                health_changed = health_check != config.health_check;
                config.health_check = health_check;
            }
            if let Some(load_balancing) = update.load_balancing {
                config.load_balancing = load_balancing;
            }
            if let Some(failover) = update.failover {
                config.failover = failover;
            }
            if let Some(versioning) = update.versioning {
                config.versioning = versioning;
            }
            if let Some(metadata) = update.metadata {
                config.metadata = metadata;
            }
            (config.clone(), health_changed)
        };

        if health_changed {
            self.restart_health_task(service_id, &config.health_check).await;
        }

        debug!(service_id = %service_id, health_changed, "Service config updated");
        self.emit(RegistryEvent::ServiceConfigUpdated {
            service_id: service_id.to_string(),
        });
        Ok(config)
    }

    // ============================================================
    // 只读查询
    // ============================================================

    pub async fn has_service(&self, service_id: &str) -> bool {
        self.inner.services.read().await.contains_key(service_id)
    }

    pub async fn get_service_config(&self, service_id: &str) -> Option<ServiceConfig> {
        let services = self.inner.services.read().await;
        services.get(service_id).map(|e| e.config.clone())
    }

    /// 全部服务配置，按 ID 排序
    pub async fn get_all_services(&self) -> Vec<ServiceConfig> {
        let services = self.inner.services.read().await;
        let mut configs: Vec<ServiceConfig> = services.values().map(|e| e.config.clone()).collect();
        configs.sort_by(|a, b| a.id.cmp(&b.id));
        configs
    }

    /// 健康实例，未知服务返回空列表
    pub async fn get_healthy_instances(&self, service_id: &str) -> Vec<ServiceInstance> {
        let services = self.inner.services.read().await;
        services
            .get(service_id)
            .map(|e| e.instances.iter().filter(|i| i.is_healthy).cloned().collect())
            .unwrap_or_default()
    }

    /// 全部实例，未知服务返回空列表
    pub async fn get_all_instances(&self, service_id: &str) -> Vec<ServiceInstance> {
        let services = self.inner.services.read().await;
        services
            .get(service_id)
            .map(|e| e.instances.clone())
            .unwrap_or_default()
    }

    // ============================================================
    // 健康与指标
    // ============================================================

    /// 更新实例健康状态
    ///
    /// 服务或实例不存在时什么也不做。只有状态真正变化时才发布事件，
    /// 返回值表示是否发生了变化。
    pub async fn update_instance_health(
        &self,
        service_id: &str,
        instance_id: &str,
        healthy: bool,
    ) -> bool {
        let changed = {
            let mut services = self.inner.services.write().await;
            let Some(instance) = services
                .get_mut(service_id)
                .and_then(|e| e.instances.iter_mut().find(|i| i.id == instance_id))
            else {
                return false;
            };
            instance.last_health_check = Some(chrono::Utc::now());
            let changed = instance.is_healthy != healthy;
            instance.is_healthy = healthy;
            changed
        };

        if changed {
            if healthy {
                info!(service_id = %service_id, instance_id = %instance_id, "Instance became healthy");
            } else {
                warn!(service_id = %service_id, instance_id = %instance_id, "Instance became unhealthy");
            }
            self.emit(RegistryEvent::InstanceHealthChanged {
                service_id: service_id.to_string(),
                instance_id: instance_id.to_string(),
                healthy,
            });
        }
        changed
    }

    /// 更新实例指标，未知 ID 静默忽略
    pub async fn update_instance_metrics(
        &self,
        service_id: &str,
        instance_id: &str,
        metrics: InstanceMetrics,
    ) {
        let mut services = self.inner.services.write().await;
        if let Some(instance) = services
            .get_mut(service_id)
            .and_then(|e| e.instances.iter_mut().find(|i| i.id == instance_id))
        {
            instance.apply_metrics(&metrics);
        }
    }

    /// 立即对一个服务执行一轮健康检查
    pub async fn run_health_check(&self, service_id: &str) {
        let snapshot = {
            let services = self.inner.services.read().await;
            services
                .get(service_id)
                .map(|e| (e.config.health_check.clone(), e.instances.clone()))
        };
        let Some((policy, instances)) = snapshot else {
            return;
        };

        let results = self.inner.checker.check_all(&instances, &policy).await;
        for result in results {
            if let crate::registry::health::HealthStatus::Unhealthy(reason) = &result.status {
                debug!(
                    service_id = %service_id,
                    instance_id = %result.instance_id,
                    reason = %reason,
                    "Health check failed"
                );
                self.emit(RegistryEvent::HealthCheckFailed {
                    service_id: service_id.to_string(),
                    instance_id: result.instance_id.clone(),
                    reason: reason.clone(),
                });
            }
            self.update_instance_health(service_id, &result.instance_id, result.status.is_healthy())
                .await;
        }
    }

    async fn restart_health_task(&self, service_id: &str, policy: &HealthCheckConfig) {
        let mut tasks = self.inner.health_tasks.lock().await;
        if let Some(previous) = tasks.remove(service_id) {
            previous.stop().await;
        }
        // 并发注销先删服务再取任务锁，这里在锁内确认服务仍在
        if !policy.enabled || !self.inner.services.read().await.contains_key(service_id) {
            return;
        }

        let cancel = self.inner.shutdown.child_token();
        let handle = tokio::spawn(health_check_loop(
            Arc::downgrade(&self.inner),
            service_id.to_string(),
            policy.interval(),
            cancel.clone(),
        ));
        tasks.insert(service_id.to_string(), BackgroundTask { cancel, handle });
        debug!(service_id = %service_id, interval_ms = policy.interval_ms, "Health check task started");
    }

    async fn stop_health_task(&self, service_id: &str) {
        let task = self.inner.health_tasks.lock().await.remove(service_id);
        if let Some(task) = task {
            task.stop().await;
            debug!(service_id = %service_id, "Health check task stopped");
        }
    }

    // ============================================================
    // 版本管理
    // ============================================================

    /// 注册服务版本
    ///
    /// 同名版本被替换；若新版本为默认版本，先清除其他版本的默认标记。
    pub async fn register_service_version(
        &self,
        service_id: &str,
        mut version: ServiceVersionConfig,
    ) -> Result<()> {
        if version.version.trim().is_empty() {
            return Err(GatewayError::validation("version must not be empty"));
        }
        version.service_id = service_id.to_string();

        {
            let mut services = self.inner.services.write().await;
            let entry = services
                .get_mut(service_id)
                .ok_or_else(|| GatewayError::not_found("service", service_id))?;

            if version.is_default {
                for existing in entry.versions.iter_mut() {
                    existing.is_default = false;
                }
            }
            entry.versions.retain(|v| v.version != version.version);
            entry.versions.push(version.clone());
        }

        info!(
            service_id = %service_id,
            version = %version.version,
            is_default = version.is_default,
            "Service version registered"
        );
        self.emit(RegistryEvent::VersionRegistered {
            service_id: service_id.to_string(),
            version: version.version,
            is_default: version.is_default,
        });
        Ok(())
    }

    /// 标记版本废弃，缺省日期为当前时间
    pub async fn deprecate_service_version(
        &self,
        service_id: &str,
        version: &str,
        date: Option<chrono::DateTime<chrono::Utc>>,
    ) -> Result<()> {
        let deprecation_date = date.unwrap_or_else(chrono::Utc::now);
        {
            let mut services = self.inner.services.write().await;
            let entry = services
                .get_mut(service_id)
                .ok_or_else(|| GatewayError::not_found("service", service_id))?;
            let existing = entry
                .versions
                .iter_mut()
                .find(|v| v.version == version)
                .ok_or_else(|| {
                    GatewayError::not_found("version", format!("{}@{}", service_id, version))
                })?;
            existing.deprecation_date = Some(deprecation_date);
        }

        info!(service_id = %service_id, version = %version, "Service version deprecated");
        self.emit(RegistryEvent::VersionDeprecated {
            service_id: service_id.to_string(),
            version: version.to_string(),
            deprecation_date,
        });
        Ok(())
    }

    pub async fn get_service_versions(&self, service_id: &str) -> Vec<ServiceVersionConfig> {
        let services = self.inner.services.read().await;
        services
            .get(service_id)
            .map(|e| e.versions.clone())
            .unwrap_or_default()
    }

    /// 当前默认且启用的版本
    pub async fn get_default_version(&self, service_id: &str) -> Option<ServiceVersionConfig> {
        let services = self.inner.services.read().await;
        services
            .get(service_id)
            .and_then(|e| e.versions.iter().find(|v| v.is_default && v.is_active).cloned())
    }

    // ============================================================
    // 路径重写规则
    // ============================================================

    /// 追加重写规则
    pub async fn add_path_rewrite_rule(&self, service_id: &str, rule: PathRewriteRule) -> Result<()> {
        let pattern = rule.pattern().to_string();
        {
            let mut services = self.inner.services.write().await;
            let entry = services
                .get_mut(service_id)
                .ok_or_else(|| GatewayError::not_found("service", service_id))?;
            entry.config.rewrite_rules.push(rule);
        }

        debug!(service_id = %service_id, pattern = %pattern, "Rewrite rule added");
        self.emit(RegistryEvent::RewriteRuleAdded {
            service_id: service_id.to_string(),
            pattern,
        });
        Ok(())
    }

    /// 按模式删除重写规则，返回是否删除了规则
    pub async fn remove_path_rewrite_rule(&self, service_id: &str, pattern: &str) -> bool {
        let removed = {
            let mut services = self.inner.services.write().await;
            match services.get_mut(service_id) {
                Some(entry) => {
                    let before = entry.config.rewrite_rules.len();
                    entry.config.rewrite_rules.retain(|r| r.pattern() != pattern);
                    entry.config.rewrite_rules.len() != before
                }
                None => false,
            }
        };

        if removed {
            debug!(service_id = %service_id, pattern = %pattern, "Rewrite rule removed");
            self.emit(RegistryEvent::RewriteRuleRemoved {
                service_id: service_id.to_string(),
                pattern: pattern.to_string(),
            });
        }
        removed
    }

    // ============================================================
    // 服务发现
    // ============================================================

    /// 保存发现配置，并根据 `enabled` 启动或停止轮询任务
    pub async fn configure_discovery(&self, config: ServiceDiscoveryConfig) -> Result<()> {
        config.validate()?;

        let mut state = self.inner.discovery.lock().await;
        if let Some(task) = state.task.take() {
            task.stop().await;
        }
        state.config = Some(config.clone());

        if config.enabled {
            let cancel = self.inner.shutdown.child_token();
            let handle = tokio::spawn(discovery_loop(
                Arc::downgrade(&self.inner),
                config.polling_interval(),
                cancel.clone(),
            ));
            state.task = Some(BackgroundTask { cancel, handle });
            info!(
                provider = %config.provider,
                interval_ms = config.polling_interval_ms,
                "Service discovery enabled"
            );
        } else {
            info!(provider = %config.provider, "Service discovery disabled");
        }
        Ok(())
    }

    pub async fn discovery_config(&self) -> Option<ServiceDiscoveryConfig> {
        self.inner.discovery.lock().await.config.clone()
    }

    /// 执行一次服务发现并合并结果
    pub async fn discover_services(&self) -> Result<DiscoveryReport> {
        let config = self
            .discovery_config()
            .await
            .ok_or_else(|| GatewayError::validation("service discovery is not configured"))?;
        let provider_name = config.provider.to_string();

        let provider = DiscoveryFactory::create_provider(&config, self.inner.http_client.clone());
        let definitions = match provider.discover().await {
            Ok(definitions) => definitions,
            Err(e) => {
                warn!(provider = %provider_name, error = %e, "Service discovery failed");
                self.emit(RegistryEvent::DiscoveryFailed {
                    provider: provider_name,
                    error: e.to_string(),
                });
                return Err(e);
            }
        };

        let mut report = DiscoveryReport {
            provider: provider_name.clone(),
            discovered: definitions.len(),
            changed: 0,
        };
        for definition in definitions {
            let service_id = definition.id.clone();
            match self.register_or_update_service(definition).await {
                Ok(true) => report.changed += 1,
                Ok(false) => {}
                Err(e) => {
                    warn!(service_id = %service_id, error = %e, "Discovered service rejected");
                }
            }
        }

        debug!(
            provider = %provider_name,
            discovered = report.discovered,
            changed = report.changed,
            "Service discovery completed"
        );
        self.emit(RegistryEvent::DiscoveryCompleted {
            provider: provider_name,
            discovered: report.discovered,
            changed: report.changed,
        });
        Ok(report)
    }

    // ============================================================
    // 统计与销毁
    // ============================================================

    pub async fn get_stats(&self) -> RegistryStats {
        let services = self.inner.services.read().await;
        let mut per_service: Vec<ServiceStats> = services
            .values()
            .map(|e| {
                let healthy = e.instances.iter().filter(|i| i.is_healthy).count();
                ServiceStats {
                    id: e.config.id.clone(),
                    name: e.config.name.clone(),
                    total_instances: e.instances.len(),
                    healthy_instances: healthy,
                    unhealthy_instances: e.instances.len() - healthy,
                }
            })
            .collect();
        drop(services);
        per_service.sort_by(|a, b| a.id.cmp(&b.id));

        let health_check_tasks = self.inner.health_tasks.lock().await.len();
        let discovery_enabled = self
            .inner
            .discovery
            .lock()
            .await
            .config
            .as_ref()
            .is_some_and(|c| c.enabled);

        RegistryStats {
            total_services: per_service.len(),
            total_instances: per_service.iter().map(|s| s.total_instances).sum(),
            healthy_instances: per_service.iter().map(|s| s.healthy_instances).sum(),
            unhealthy_instances: per_service.iter().map(|s| s.unhealthy_instances).sum(),
            health_check_tasks,
            discovery_enabled,
            services: per_service,
        }
    }

    /// 停止全部后台任务，清空状态并关闭事件通道
    pub async fn destroy(&self) {
        self.inner.shutdown.cancel();

        let discovery_task = {
            let mut state = self.inner.discovery.lock().await;
            state.config = None;
            state.task.take()
        };
        if let Some(task) = discovery_task {
            task.stop().await;
        }

        let health_tasks: Vec<BackgroundTask> = {
            let mut tasks = self.inner.health_tasks.lock().await;
            tasks.drain().map(|(_, task)| task).collect()
        };
        for task in health_tasks {
            task.stop().await;
        }

        self.inner.services.write().await.clear();
        self.inner.events.close();
        info!("Service registry destroyed");
    }
}

impl Default for ServiceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

async fn health_check_loop(
    registry: Weak<RegistryInner>,
    service_id: String,
    interval: Duration,
    cancel: CancellationToken,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }
        let Some(inner) = registry.upgrade() else {
            break;
        };
        let registry = ServiceRegistry { inner };
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = registry.run_health_check(&service_id) => {}
        }
    }
}

async fn discovery_loop(registry: Weak<RegistryInner>, interval: Duration, cancel: CancellationToken) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }
        let Some(inner) = registry.upgrade() else {
            break;
        };
        let registry = ServiceRegistry { inner };
        tokio::select! {
            _ = cancel.cancelled() => break,
            // 失败已记录并发布事件，循环继续
            _ = registry.discover_services() => {}
        }
    }
}

fn build_config(definition: &ServiceDefinition) -> ServiceConfig {
    ServiceConfig {
        id: definition.id.clone(),
        name: definition.name.clone(),
        version: definition.version.clone(),
        upstreams: definition.endpoints.iter().map(|e| normalize_url(&e.url)).collect(),
        route_prefix: definition
            .route_prefix
            .clone()
            .unwrap_or_else(|| format!("/{}", definition.name)),
        rewrite_rules: Vec::new(),
        timeout_ms: DEFAULT_TIMEOUT_MS,
        retries: DEFAULT_RETRIES,
        health_check: definition.health_check.clone(),
        load_balancing: LoadBalancingConfig::default(),
        failover: FailoverConfig::default(),
        versioning: VersioningConfig::default(),
        metadata: definition.metadata.clone(),
    }
}

fn build_instances(service_id: &str, endpoints: &[EndpointDefinition]) -> Vec<ServiceInstance> {
    endpoints
        .iter()
        .enumerate()
        .map(|(ordinal, endpoint)| ServiceInstance::from_endpoint(service_id, ordinal, endpoint))
        .collect()
}

fn normalize_url(url: &str) -> String {
    url.trim_end_matches('/').to_string()
}

fn same_url_set(current: &[String], incoming: &[String]) -> bool {
    let mut a = current.to_vec();
    let mut b = incoming.to_vec();
    a.sort();
    b.sort();
    a == b
}

fn validate_definition(definition: &ServiceDefinition) -> Result<()> {
    if definition.id.trim().is_empty() {
        return Err(GatewayError::validation("service id must not be empty"));
    }
    if definition.name.trim().is_empty() {
        return Err(GatewayError::validation(format!(
            "service '{}' must have a name",
            definition.id
        )));
    }
    if let Some(prefix) = &definition.route_prefix {
        validate_route_prefix(prefix)?;
    }
    validate_health_check(&definition.health_check)?;
    validate_endpoints(&definition.id, &definition.endpoints)
}

fn validate_endpoints(service_id: &str, endpoints: &[EndpointDefinition]) -> Result<()> {
    if endpoints.is_empty() {
        return Err(GatewayError::validation(format!(
            "service '{}' must declare at least one endpoint",
            service_id
        )));
    }
    for endpoint in endpoints {
        let url = reqwest::Url::parse(&endpoint.url).map_err(|e| {
            GatewayError::validation(format!("invalid endpoint url '{}': {}", endpoint.url, e))
        })?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(GatewayError::validation(format!(
                "endpoint url '{}' must use http or https",
                endpoint.url
            )));
        }
        if endpoint.weight == 0 {
            return Err(GatewayError::validation(format!(
                "endpoint '{}' must have a positive weight",
                endpoint.url
            )));
        }
    }
    Ok(())
}

fn validate_route_prefix(prefix: &str) -> Result<()> {
    if !prefix.starts_with('/') {
        return Err(GatewayError::validation(format!(
            "route prefix '{}' must start with '/'",
            prefix
        )));
    }
    Ok(())
}

fn validate_health_check(policy: &HealthCheckConfig) -> Result<()> {
    if !policy.path.starts_with('/') {
        return Err(GatewayError::validation(format!(
            "health check path '{}' must start with '/'",
            policy.path
        )));
    }
    if policy.enabled && policy.expected_status.is_empty() {
        return Err(GatewayError::validation(
            "health check must expect at least one status code",
        ));
    }
    if policy.enabled && policy.interval_ms == 0 {
        return Err(GatewayError::validation(
            "health check interval must be greater than zero",
        ));
    }
    Ok(())
}
