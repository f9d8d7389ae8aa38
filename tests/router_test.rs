//! 请求路由集成测试

mod common;

use http::{HeaderMap, HeaderValue, Method};
use tokio_test::{assert_err, assert_ok};

use common::definition;
use flare_gateway::registry::PathRewriteRule;
use flare_gateway::{GatewayError, RequestRouter, RouteRequest, RoutingRule, ServiceRegistry};

async fn setup() -> (ServiceRegistry, RequestRouter) {
    let registry = ServiceRegistry::new();
    for (id, prefix) in [("users", "/users"), ("admin-users", "/users/admin"), ("old", "/old")] {
        registry
            .register_service(definition(id, &["http://10.0.0.1:80"]).with_route_prefix(prefix))
            .await
            .expect("Failed to register service");
    }
    let router = RequestRouter::new(registry.clone());
    (registry, router)
}

/// 测试：最长前缀优先，且只在路径段边界上匹配
#[tokio::test]
async fn test_longest_prefix_match() {
    let (registry, router) = setup().await;

    let matched = router
        .resolve(&RouteRequest::new(Method::GET, "/users/admin/7"))
        .await
        .expect("Route not found");
    assert_eq!(matched.service_config.id, "admin-users");
    assert!(matched.matched_rule.is_none());

    let matched = router
        .resolve(&RouteRequest::new(Method::GET, "/users/7"))
        .await
        .expect("Route not found");
    assert_eq!(matched.service_config.id, "users");
    assert_eq!(matched.transformed_path, "/users/7");

    let missing = assert_err!(router.resolve(&RouteRequest::new(Method::GET, "/usersx")).await);
    assert!(matches!(missing, GatewayError::RouteNotFound { .. }));

    registry.destroy().await;
}

/// 测试：/old -> /new 重写规则生效，删除后路径恢复原样
#[tokio::test]
async fn test_path_rewrite_add_and_remove() {
    let (registry, router) = setup().await;
    let request = RouteRequest::new(Method::GET, "/old/42");

    registry
        .add_path_rewrite_rule("old", PathRewriteRule::new("/old", "/new").expect("Invalid rule"))
        .await
        .expect("Failed to add rewrite rule");
    let matched = router.resolve(&request).await.expect("Route not found");
    assert_eq!(matched.transformed_path, "/new/42");

    assert!(registry.remove_path_rewrite_rule("old", "/old").await);
    let matched = router.resolve(&request).await.expect("Route not found");
    assert_eq!(matched.transformed_path, "/old/42");

    registry.destroy().await;
}

/// 测试：动态规则先于前缀匹配，按优先级求值
#[tokio::test]
async fn test_dynamic_rules_priority() {
    let (registry, router) = setup().await;

    router
        .add_dynamic_routing_rule(
            RoutingRule::new("low", "old")
                .with_priority(1)
                .with_path_pattern("^/users/"),
        )
        .await
        .expect("Failed to add rule");
    router
        .add_dynamic_routing_rule(
            RoutingRule::new("high", "admin-users")
                .with_priority(10)
                .with_path_pattern("^/users/")
                .with_method("POST"),
        )
        .await
        .expect("Failed to add rule");

    let post = router
        .resolve(&RouteRequest::new(Method::POST, "/users/1"))
        .await
        .expect("Route not found");
    assert_eq!(post.service_config.id, "admin-users");
    assert_eq!(post.matched_rule.as_deref(), Some("high"));

    let get = router
        .resolve(&RouteRequest::new(Method::GET, "/users/1"))
        .await
        .expect("Route not found");
    assert_eq!(get.service_config.id, "old");
    assert_eq!(get.matched_rule.as_deref(), Some("low"));

    let ids: Vec<String> = router
        .get_all_routing_rules()
        .await
        .into_iter()
        .map(|r| r.id)
        .collect();
    assert_eq!(ids, vec!["high", "low"]);

    let stats = router.get_stats().await;
    assert_eq!(stats.total_rules, 2);
    assert_eq!(stats.rule_hits.get("high"), Some(&1));
    assert_eq!(stats.rule_hits.get("low"), Some(&1));

    registry.destroy().await;
}

/// 测试：请求头条件
#[tokio::test]
async fn test_header_condition() {
    let (registry, router) = setup().await;
    router
        .add_dynamic_routing_rule(
            RoutingRule::new("canary", "old").with_header("x-canary", "true"),
        )
        .await
        .expect("Failed to add rule");

    let mut headers = HeaderMap::new();
    headers.insert("x-canary", HeaderValue::from_static("true"));
    let canary = router
        .resolve(&RouteRequest::new(Method::GET, "/users/1").with_headers(headers))
        .await
        .expect("Route not found");
    assert_eq!(canary.service_config.id, "old");

    let normal = router
        .resolve(&RouteRequest::new(Method::GET, "/users/1"))
        .await
        .expect("Route not found");
    assert_eq!(normal.service_config.id, "users");

    registry.destroy().await;
}

/// 测试：重复规则 ID 冲突，停用与删除规则
#[tokio::test]
async fn test_rule_management() {
    let (registry, router) = setup().await;
    let rule = RoutingRule::new("r1", "old").with_path_pattern("^/users/");

    assert_ok!(router.add_dynamic_routing_rule(rule.clone()).await);
    assert!(matches!(
        router.add_dynamic_routing_rule(rule).await,
        Err(GatewayError::Conflict(_))
    ));

    let toggled = router
        .toggle_routing_rule("r1", false)
        .await
        .expect("Failed to toggle rule");
    assert!(!toggled.enabled);
    let matched = router
        .resolve(&RouteRequest::new(Method::GET, "/users/1"))
        .await
        .expect("Route not found");
    assert_eq!(matched.service_config.id, "users");

    assert!(matches!(
        router.toggle_routing_rule("missing", true).await,
        Err(GatewayError::NotFound { .. })
    ));
    let removed = assert_ok!(router.remove_routing_rule("r1").await);
    assert_eq!(removed.id, "r1");
    assert!(matches!(
        router.remove_routing_rule("r1").await,
        Err(GatewayError::NotFound { .. })
    ));

    let invalid = RoutingRule::new("bad", "old").with_path_pattern("([");
    assert_err!(router.add_dynamic_routing_rule(invalid).await);

    registry.destroy().await;
}

/// 测试：规则目标未注册时回退到前缀匹配
#[tokio::test]
async fn test_rule_with_unknown_target_is_skipped() {
    let (registry, router) = setup().await;
    router
        .add_dynamic_routing_rule(RoutingRule::new("ghost", "not-registered"))
        .await
        .expect("Failed to add rule");

    let matched = router
        .resolve(&RouteRequest::new(Method::GET, "/users/1"))
        .await
        .expect("Route not found");
    assert_eq!(matched.service_config.id, "users");

    registry.destroy().await;
}
