//! 动态路由规则

use http::{HeaderMap, Method};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::error::{GatewayError, Result};

/// 路由规则的匹配条件，所有条件同时满足才算匹配
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct RouteConditions {
    /// 路径正则，缺省匹配任意路径
    pub path_pattern: Option<String>,
    /// 允许的方法，为空时匹配任意方法
    pub methods: Vec<String>,
    /// 必须携带且值相等的请求头
    pub headers: HashMap<String, String>,
}

/// 动态路由规则
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RoutingRule {
    pub id: String,
    #[serde(default)]
    pub name: String,
    /// 数值越大越先匹配
    #[serde(default)]
    pub priority: i32,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub conditions: RouteConditions,
    pub target_service: String,
}

fn default_enabled() -> bool {
    true
}

impl RoutingRule {
    pub fn new(id: impl Into<String>, target_service: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            priority: 0,
            enabled: true,
            conditions: RouteConditions::default(),
            target_service: target_service.into(),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_path_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.conditions.path_pattern = Some(pattern.into());
        self
    }

    pub fn with_method(mut self, method: impl Into<String>) -> Self {
        self.conditions.methods.push(method.into());
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.conditions.headers.insert(name.into(), value.into());
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }
}

/// 编译后的规则，`sequence` 记录插入顺序用于同优先级排序
#[derive(Debug)]
pub(crate) struct CompiledRule {
    pub(crate) rule: RoutingRule,
    pub(crate) sequence: u64,
    pub(crate) hits: u64,
    path: Option<Regex>,
}

impl CompiledRule {
    pub(crate) fn compile(rule: RoutingRule, sequence: u64) -> Result<Self> {
        if rule.id.trim().is_empty() {
            return Err(GatewayError::validation("routing rule id must not be empty"));
        }
        if rule.target_service.trim().is_empty() {
            return Err(GatewayError::validation(format!(
                "routing rule '{}' must name a target service",
                rule.id
            )));
        }
        for method in &rule.conditions.methods {
            Method::from_bytes(method.as_bytes()).map_err(|_| {
                GatewayError::validation(format!(
                    "routing rule '{}' has an invalid method '{}'",
                    rule.id, method
                ))
            })?;
        }
        let path = rule
            .conditions
            .path_pattern
            .as_deref()
            .map(Regex::new)
            .transpose()?;

        Ok(Self {
            rule,
            sequence,
            hits: 0,
            path,
        })
    }

    pub(crate) fn matches(&self, method: &Method, path: &str, headers: &HeaderMap) -> bool {
        if !self.rule.enabled {
            return false;
        }

        let conditions = &self.rule.conditions;
        if !conditions.methods.is_empty()
            && !conditions
                .methods
                .iter()
                .any(|m| m.eq_ignore_ascii_case(method.as_str()))
        {
            return false;
        }

        if let Some(path_regex) = &self.path {
            if !path_regex.is_match(path) {
                return false;
            }
        }

        conditions.headers.iter().all(|(name, expected)| {
            headers
                .get(name.as_str())
                .and_then(|v| v.to_str().ok())
                .is_some_and(|v| v == expected)
        })
    }
}
