//! 请求路由模块
//!
//! 将 `(method, path)` 映射到唯一的已注册服务：先按优先级匹配启用的动态规则，
//! 再按服务路由前缀做最长前缀匹配；命中后对路径应用该服务的重写规则。

mod rule;

pub use rule::{RouteConditions, RoutingRule};

use http::{HeaderMap, Method};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::error::{GatewayError, Result};
use crate::registry::{ServiceConfig, ServiceRegistry};
use rule::CompiledRule;

/// 路由输入
#[derive(Debug, Clone)]
pub struct RouteRequest {
    pub method: Method,
    /// 不含查询串的请求路径
    pub path: String,
    pub headers: HeaderMap,
}

impl RouteRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            headers: HeaderMap::new(),
        }
    }

    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.headers = headers;
        self
    }
}

/// 路由结果
#[derive(Debug, Clone)]
pub struct RouteMatch {
    pub service_config: ServiceConfig,
    /// 应用重写规则之后的路径
    pub transformed_path: String,
    /// 命中的动态规则 ID，前缀匹配时为 None
    pub matched_rule: Option<String>,
}

/// 路由统计
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RouterStats {
    pub total_rules: usize,
    pub enabled_rules: usize,
    pub total_requests: u64,
    pub matched_requests: u64,
    pub unmatched_requests: u64,
    pub rule_hits: HashMap<String, u64>,
}

/// 请求路由器
pub struct RequestRouter {
    registry: ServiceRegistry,
    /// 按 (priority desc, sequence asc) 排序
    rules: RwLock<Vec<CompiledRule>>,
    sequence: AtomicU64,
    total_requests: AtomicU64,
    matched_requests: AtomicU64,
}

impl RequestRouter {
    pub fn new(registry: ServiceRegistry) -> Self {
        Self {
            registry,
            rules: RwLock::new(Vec::new()),
            sequence: AtomicU64::new(0),
            total_requests: AtomicU64::new(0),
            matched_requests: AtomicU64::new(0),
        }
    }

    /// 解析路由，未匹配时返回 None
    pub async fn resolve_route(&self, request: &RouteRequest) -> Option<RouteMatch> {
        self.total_requests.fetch_add(1, Ordering::Relaxed);

        let resolved = match self.match_dynamic_rule(request).await {
            Some((config, rule_id)) => Some((config, Some(rule_id))),
            None => self
                .match_prefix(&request.path)
                .await
                .map(|config| (config, None)),
        };

        let (service_config, matched_rule) = resolved?;
        self.matched_requests.fetch_add(1, Ordering::Relaxed);

        let transformed_path = service_config.rewrite_path(&request.path);
        debug!(
            method = %request.method,
            path = %request.path,
            service_id = %service_config.id,
            transformed_path = %transformed_path,
            rule = ?matched_rule,
            "Route resolved"
        );
        Some(RouteMatch {
            service_config,
            transformed_path,
            matched_rule,
        })
    }

    /// 解析路由，未匹配时返回 `RouteNotFound`
    pub async fn resolve(&self, request: &RouteRequest) -> Result<RouteMatch> {
        self.resolve_route(request)
            .await
            .ok_or_else(|| GatewayError::route_not_found(request.method.as_str(), &request.path))
    }

    async fn match_dynamic_rule(&self, request: &RouteRequest) -> Option<(ServiceConfig, String)> {
        let candidates: Vec<(String, String)> = {
            let rules = self.rules.read().await;
            rules
                .iter()
                .filter(|r| r.matches(&request.method, &request.path, &request.headers))
                .map(|r| (r.rule.id.clone(), r.rule.target_service.clone()))
                .collect()
        };

        for (rule_id, target) in candidates {
            match self.registry.get_service_config(&target).await {
                Some(config) => {
                    let mut rules = self.rules.write().await;
                    if let Some(rule) = rules.iter_mut().find(|r| r.rule.id == rule_id) {
                        rule.hits += 1;
                    }
                    return Some((config, rule_id));
                }
                None => {
                    debug!(rule_id = %rule_id, target = %target, "Routing rule target is not registered, skipping");
                }
            }
        }
        None
    }

    /// 最长前缀匹配；长度相同时取服务 ID 较小者
    async fn match_prefix(&self, path: &str) -> Option<ServiceConfig> {
        let mut best: Option<ServiceConfig> = None;
        for config in self.registry.get_all_services().await {
            if !config.matches_prefix(path) {
                continue;
            }
            let len = config.route_prefix.trim_end_matches('/').len();
            let better = match &best {
                Some(current) => len > current.route_prefix.trim_end_matches('/').len(),
                None => true,
            };
            if better {
                best = Some(config);
            }
        }
        best
    }

    /// 添加动态路由规则，重复 ID 返回 `Conflict`
    pub async fn add_dynamic_routing_rule(&self, rule: RoutingRule) -> Result<()> {
        let sequence = self.sequence.fetch_add(1, Ordering::Relaxed);
        let compiled = CompiledRule::compile(rule, sequence)?;

        let mut rules = self.rules.write().await;
        if rules.iter().any(|r| r.rule.id == compiled.rule.id) {
            return Err(GatewayError::conflict(format!(
                "routing rule '{}' already exists",
                compiled.rule.id
            )));
        }

        info!(
            rule_id = %compiled.rule.id,
            target = %compiled.rule.target_service,
            priority = compiled.rule.priority,
            "Routing rule added"
        );
        rules.push(compiled);
        rules.sort_by(|a, b| {
            b.rule
                .priority
                .cmp(&a.rule.priority)
                .then(a.sequence.cmp(&b.sequence))
        });
        Ok(())
    }

    /// 启用或停用规则
    pub async fn toggle_routing_rule(&self, id: &str, enabled: bool) -> Result<RoutingRule> {
        let mut rules = self.rules.write().await;
        let rule = rules
            .iter_mut()
            .find(|r| r.rule.id == id)
            .ok_or_else(|| GatewayError::not_found("routing rule", id))?;
        rule.rule.enabled = enabled;
        info!(rule_id = %id, enabled, "Routing rule toggled");
        Ok(rule.rule.clone())
    }

    pub async fn remove_routing_rule(&self, id: &str) -> Result<RoutingRule> {
        let mut rules = self.rules.write().await;
        let index = rules
            .iter()
            .position(|r| r.rule.id == id)
            .ok_or_else(|| GatewayError::not_found("routing rule", id))?;
        let removed = rules.remove(index);
        info!(rule_id = %id, "Routing rule removed");
        Ok(removed.rule)
    }

    /// 全部规则，按求值顺序
    pub async fn get_all_routing_rules(&self) -> Vec<RoutingRule> {
        self.rules.read().await.iter().map(|r| r.rule.clone()).collect()
    }

    pub async fn get_stats(&self) -> RouterStats {
        let rules = self.rules.read().await;
        let total_requests = self.total_requests.load(Ordering::Relaxed);
        let matched_requests = self.matched_requests.load(Ordering::Relaxed);
        RouterStats {
            total_rules: rules.len(),
            enabled_rules: rules.iter().filter(|r| r.rule.enabled).count(),
            total_requests,
            matched_requests,
            unmatched_requests: total_requests.saturating_sub(matched_requests),
            rule_hits: rules
                .iter()
                .map(|r| (r.rule.id.clone(), r.hits))
                .collect(),
        }
    }
}
