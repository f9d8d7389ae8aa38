//! 服务注册中心集成测试

mod common;

use std::time::Duration;
use tokio::time::{sleep, timeout};

use common::{dead_url, definition, spawn_upstream};
use flare_gateway::discovery::{DiscoveryProviderKind, ServiceDiscoveryConfig};
use flare_gateway::registry::{PathRewriteRule, RegistryEvent, ServiceVersionConfig};
use flare_gateway::{GatewayError, HealthCheckPolicy, ServiceDefinition, ServiceRegistry};

fn fast_health_check() -> HealthCheckPolicy {
    HealthCheckPolicy {
        enabled: true,
        path: "/health".to_string(),
        interval_ms: 50,
        timeout_ms: 500,
        expected_status: vec![200],
    }
}

/// 收集通道中已有的事件（不等待新事件）
fn drain(receiver: &mut async_broadcast::Receiver<RegistryEvent>) -> Vec<RegistryEvent> {
    let mut events = Vec::new();
    while let Ok(event) = receiver.try_recv() {
        events.push(event);
    }
    events
}

/// 测试：注册服务后每个端点对应一个实例，且默认路由前缀为 /{name}
#[tokio::test]
async fn test_register_service_builds_instances() {
    let registry = ServiceRegistry::new();
    registry
        .register_service(definition("users", &["http://10.0.0.1:8080", "http://10.0.0.2:8080/"]))
        .await
        .expect("Failed to register service");

    let config = registry
        .get_service_config("users")
        .await
        .expect("Service config missing");
    assert_eq!(config.route_prefix, "/users");
    assert_eq!(config.upstreams, vec!["http://10.0.0.1:8080", "http://10.0.0.2:8080"]);

    let instances = registry.get_all_instances("users").await;
    assert_eq!(instances.len(), 2);
    assert_eq!(instances[0].id, "users-0");
    assert_eq!(instances[1].id, "users-1");
    assert!(instances.iter().all(|i| i.is_healthy));

    let default = registry
        .get_default_version("users")
        .await
        .expect("Default version missing");
    assert_eq!(default.version, "1.0.0");

    registry.destroy().await;
}

/// 测试：非法注册输入被拒绝
#[tokio::test]
async fn test_register_service_rejects_invalid_input() {
    let registry = ServiceRegistry::new();

    let no_endpoints = ServiceDefinition::new("empty", "empty");
    assert!(matches!(
        registry.register_service(no_endpoints).await,
        Err(GatewayError::Validation(_))
    ));

    let bad_scheme = definition("ftp", &["ftp://10.0.0.1"]);
    assert!(matches!(
        registry.register_service(bad_scheme).await,
        Err(GatewayError::Validation(_))
    ));

    let zero_weight = ServiceDefinition::new("weights", "weights")
        .with_weighted_endpoint("http://10.0.0.1:8080", 0)
        .with_health_check(HealthCheckPolicy::disabled());
    assert!(matches!(
        registry.register_service(zero_weight).await,
        Err(GatewayError::Validation(_))
    ));

    let zero_interval = ServiceDefinition::new("eager", "eager")
        .with_endpoint("http://10.0.0.1:8080")
        .with_health_check(HealthCheckPolicy {
            interval_ms: 0,
            ..fast_health_check()
        });
    assert!(matches!(
        registry.register_service(zero_interval).await,
        Err(GatewayError::Validation(_))
    ));

    assert!(!registry.has_service("empty").await);
    assert!(!registry.has_service("eager").await);
    registry.destroy().await;
}

/// 测试：注册与注销并发执行后，健康检查任务数与存活服务一致
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_register_and_deregister_leave_no_orphan_task() {
    let registry = ServiceRegistry::new();
    let url = dead_url().await;

    for _ in 0..50 {
        let definition = ServiceDefinition::new("racy", "racy")
            .with_endpoint(url.clone())
            .with_health_check(HealthCheckPolicy {
                interval_ms: 60_000,
                ..fast_health_check()
            });
        let register = {
            let registry = registry.clone();
            tokio::spawn(async move { registry.register_service(definition).await })
        };
        let deregister = {
            let registry = registry.clone();
            tokio::spawn(async move { registry.deregister_service("racy").await })
        };
        let (registered, _) = tokio::join!(register, deregister);
        registered
            .expect("Register task panicked")
            .expect("Failed to register service");

        let stats = registry.get_stats().await;
        assert_eq!(stats.health_check_tasks, stats.total_services);

        let _ = registry.deregister_service("racy").await;
        assert_eq!(registry.get_stats().await.health_check_tasks, 0);
    }

    registry.destroy().await;
}

/// 测试：健康实例始终是全部实例的子集
#[tokio::test]
async fn test_healthy_instances_subset_of_all() {
    let registry = ServiceRegistry::new();
    registry
        .register_service(definition(
            "catalog",
            &["http://10.0.0.1:80", "http://10.0.0.2:80", "http://10.0.0.3:80"],
        ))
        .await
        .expect("Failed to register service");

    registry.update_instance_health("catalog", "catalog-1", false).await;

    let all = registry.get_all_instances("catalog").await;
    let healthy = registry.get_healthy_instances("catalog").await;
    assert_eq!(healthy.len(), 2);
    assert!(healthy.iter().all(|h| all.iter().any(|a| a.id == h.id)));
    assert!(healthy.iter().all(|h| h.id != "catalog-1"));

    assert!(registry.get_healthy_instances("unknown").await.is_empty());
    registry.destroy().await;
}

/// 测试：重复设置相同健康状态只产生一次状态变化事件
#[tokio::test]
async fn test_health_update_emits_single_transition() {
    let registry = ServiceRegistry::new();
    registry
        .register_service(definition("billing", &["http://10.0.0.1:80"]))
        .await
        .expect("Failed to register service");

    let mut events = registry.subscribe();

    // 已健康的实例再设置为健康不算变化
    assert!(!registry.update_instance_health("billing", "billing-0", true).await);
    assert!(!registry.update_instance_health("billing", "billing-0", true).await);
    assert!(registry.update_instance_health("billing", "billing-0", false).await);
    assert!(!registry.update_instance_health("billing", "billing-0", false).await);
    assert!(registry.update_instance_health("billing", "billing-0", true).await);
    assert!(!registry.update_instance_health("billing", "billing-0", true).await);

    let transitions: Vec<bool> = drain(&mut events)
        .into_iter()
        .filter_map(|e| match e {
            RegistryEvent::InstanceHealthChanged { healthy, .. } => Some(healthy),
            _ => None,
        })
        .collect();
    assert_eq!(transitions, vec![false, true]);

    let instance = &registry.get_all_instances("billing").await[0];
    assert!(instance.last_health_check.is_some());

    // 未知 ID 静默忽略
    assert!(!registry.update_instance_health("billing", "billing-9", false).await);
    assert!(!registry.update_instance_health("missing", "missing-0", false).await);
    registry.destroy().await;
}

/// 测试：健康检查任务把不可达实例标记为不健康
#[tokio::test]
async fn test_health_check_marks_dead_instance() {
    let upstream = spawn_upstream("alive").await;
    let dead = dead_url().await;

    let registry = ServiceRegistry::new();
    let mut events = registry.subscribe();
    let service = ServiceDefinition::new("inventory", "inventory")
        .with_endpoint(&upstream.url)
        .with_endpoint(&dead)
        .with_health_check(fast_health_check());
    registry
        .register_service(service)
        .await
        .expect("Failed to register service");

    let changed = timeout(Duration::from_secs(5), async {
        loop {
            match events.recv().await {
                Ok(RegistryEvent::InstanceHealthChanged { instance_id, healthy, .. }) => {
                    return (instance_id, healthy);
                }
                Ok(_) => continue,
                Err(e) => panic!("event channel failed: {:?}", e),
            }
        }
    })
    .await
    .expect("No health transition observed");
    assert_eq!(changed, ("inventory-1".to_string(), false));

    let healthy = registry.get_healthy_instances("inventory").await;
    assert_eq!(healthy.len(), 1);
    assert_eq!(healthy[0].url, upstream.url);
    assert!(upstream.health_hits() > 0);

    registry.destroy().await;
}

/// 测试：注销服务后统计中不再有实例，也不再发起健康检查
#[tokio::test]
async fn test_deregister_stops_health_checks() {
    let upstream = spawn_upstream("payments").await;
    let registry = ServiceRegistry::new();
    let service = ServiceDefinition::new("payments", "payments")
        .with_endpoint(&upstream.url)
        .with_health_check(fast_health_check());
    registry
        .register_service(service)
        .await
        .expect("Failed to register service");

    sleep(Duration::from_millis(200)).await;
    assert!(upstream.health_hits() > 0);
    assert_eq!(registry.get_stats().await.health_check_tasks, 1);

    registry
        .deregister_service("payments")
        .await
        .expect("Failed to deregister service");
    let hits_after_deregister = upstream.health_hits();

    let stats = registry.get_stats().await;
    assert_eq!(stats.total_instances, 0);
    assert_eq!(stats.health_check_tasks, 0);
    assert!(stats.service("payments").is_none());

    sleep(Duration::from_millis(300)).await;
    assert_eq!(upstream.health_hits(), hits_after_deregister);

    let missing = registry.deregister_service("payments").await;
    assert!(matches!(missing, Err(GatewayError::NotFound { .. })));
    registry.destroy().await;
}

/// 测试：新的默认版本会清除旧版本的默认标记
#[tokio::test]
async fn test_default_version_is_exclusive() {
    let registry = ServiceRegistry::new();
    registry
        .register_service(definition("search", &["http://10.0.0.1:80"]))
        .await
        .expect("Failed to register service");

    registry
        .register_service_version("search", ServiceVersionConfig::new("search", "v1").as_default())
        .await
        .expect("Failed to register v1");
    registry
        .register_service_version("search", ServiceVersionConfig::new("search", "v2").as_default())
        .await
        .expect("Failed to register v2");

    let versions = registry.get_service_versions("search").await;
    let v1 = versions.iter().find(|v| v.version == "v1").expect("v1 missing");
    assert!(!v1.is_default);
    assert_eq!(versions.iter().filter(|v| v.is_default).count(), 1);
    assert_eq!(
        registry.get_default_version("search").await.map(|v| v.version),
        Some("v2".to_string())
    );

    registry
        .deprecate_service_version("search", "v1", None)
        .await
        .expect("Failed to deprecate v1");
    let versions = registry.get_service_versions("search").await;
    assert!(versions.iter().any(|v| v.version == "v1" && v.deprecation_date.is_some()));

    let unknown = registry
        .register_service_version("nope", ServiceVersionConfig::new("nope", "v1"))
        .await;
    assert!(matches!(unknown, Err(GatewayError::NotFound { .. })));
    registry.destroy().await;
}

/// 测试：重写规则的添加与删除
#[tokio::test]
async fn test_rewrite_rule_lifecycle() {
    let registry = ServiceRegistry::new();
    registry
        .register_service(definition("legacy", &["http://10.0.0.1:80"]))
        .await
        .expect("Failed to register service");

    let rule = PathRewriteRule::new("^/legacy/v1", "/v2").expect("Invalid rule");
    registry
        .add_path_rewrite_rule("legacy", rule)
        .await
        .expect("Failed to add rewrite rule");
    let config = registry.get_service_config("legacy").await.expect("Config missing");
    assert_eq!(config.rewrite_path("/legacy/v1/items"), "/v2/items");

    assert!(registry.remove_path_rewrite_rule("legacy", "^/legacy/v1").await);
    assert!(!registry.remove_path_rewrite_rule("legacy", "^/legacy/v1").await);

    let rule = PathRewriteRule::new("/a", "/b").expect("Invalid rule");
    assert!(matches!(
        registry.add_path_rewrite_rule("ghost", rule).await,
        Err(GatewayError::NotFound { .. })
    ));
    assert!(PathRewriteRule::new("([", "/x").is_err());
    registry.destroy().await;
}

/// 测试：静态服务发现注册新服务，相同端点集合（顺序不同）不会触发更新
#[tokio::test]
async fn test_static_discovery_merges_services() {
    let registry = ServiceRegistry::new();
    assert!(matches!(
        registry.discover_services().await,
        Err(GatewayError::Validation(_))
    ));

    let discovered = definition("geo", &["http://10.0.0.1:80", "http://10.0.0.2:80"]);
    let config = ServiceDiscoveryConfig::new(DiscoveryProviderKind::Static).with_service(discovered);
    registry
        .configure_discovery(config)
        .await
        .expect("Failed to configure discovery");

    let report = registry.discover_services().await.expect("Discovery failed");
    assert_eq!(report.discovered, 1);
    assert_eq!(report.changed, 1);
    assert!(registry.has_service("geo").await);

    let report = registry.discover_services().await.expect("Discovery failed");
    assert_eq!(report.changed, 0);

    let reordered = definition("geo", &["http://10.0.0.2:80", "http://10.0.0.1:80"]);
    assert!(!registry
        .register_or_update_service(reordered)
        .await
        .expect("Update failed"));

    let grown = definition(
        "geo",
        &["http://10.0.0.2:80", "http://10.0.0.1:80", "http://10.0.0.3:80"],
    );
    assert!(registry
        .register_or_update_service(grown)
        .await
        .expect("Update failed"));
    assert_eq!(registry.get_all_instances("geo").await.len(), 3);
    registry.destroy().await;
}

/// 测试：销毁后状态清空，事件通道关闭
#[tokio::test]
async fn test_destroy_clears_state() {
    let registry = ServiceRegistry::new();
    let mut events = registry.subscribe();
    registry
        .register_service(definition("temp", &["http://10.0.0.1:80"]))
        .await
        .expect("Failed to register service");

    registry.destroy().await;

    assert!(registry.get_all_services().await.is_empty());
    let stats = registry.get_stats().await;
    assert_eq!(stats.total_services, 0);
    assert!(!stats.discovery_enabled);

    let mut saw_registered = false;
    loop {
        match events.recv().await {
            Ok(RegistryEvent::ServiceRegistered { .. }) => saw_registered = true,
            Ok(_) => {}
            Err(_) => break,
        }
    }
    assert!(saw_registered);
}
