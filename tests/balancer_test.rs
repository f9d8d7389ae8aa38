//! 负载均衡器集成测试

use std::collections::HashMap;
use std::time::Duration;

use flare_gateway::registry::{LoadBalancingAlgorithm, LoadBalancingConfig};
use flare_gateway::{EndpointDefinition, LoadBalancer, ServiceInstance, SessionLimits};

fn instances(service_id: &str, weights: &[u32]) -> Vec<ServiceInstance> {
    weights
        .iter()
        .enumerate()
        .map(|(i, weight)| {
            let endpoint = EndpointDefinition::new(format!("http://10.0.0.{}:8080", i + 1)).with_weight(*weight);
            ServiceInstance::from_endpoint(service_id, i, &endpoint)
        })
        .collect()
}

async fn distribution(
    balancer: &LoadBalancer,
    service_id: &str,
    config: &LoadBalancingConfig,
    candidates: &[ServiceInstance],
    requests: usize,
) -> HashMap<String, usize> {
    let mut counts = HashMap::new();
    for _ in 0..requests {
        let selected = balancer
            .select_instance(service_id, config, candidates)
            .await
            .expect("No instance selected");
        *counts.entry(selected.id).or_insert(0) += 1;
    }
    counts
}

/// 测试：轮询分布的实例间差值不超过 1
#[tokio::test]
async fn test_round_robin_is_even() {
    let balancer = LoadBalancer::new();
    let config = LoadBalancingConfig::default();
    let candidates = instances("rr", &[1, 1, 1]);

    for requests in [3usize, 10, 11, 100] {
        let counts = distribution(&balancer, "rr", &config, &candidates, requests).await;
        let max = counts.values().copied().max().unwrap_or(0);
        let min = candidates
            .iter()
            .map(|i| counts.get(&i.id).copied().unwrap_or(0))
            .min()
            .unwrap_or(0);
        assert!(max - min <= 1, "uneven distribution for {} requests: {:?}", requests, counts);
        balancer.forget_service("rr").await;
    }
}

/// 测试：权重全部相同时加权策略退化为轮询
#[tokio::test]
async fn test_weighted_equal_weights_falls_back_to_round_robin() {
    let balancer = LoadBalancer::new();
    let config = LoadBalancingConfig::default().with_algorithm(LoadBalancingAlgorithm::Weighted);
    let candidates = instances("w", &[5, 5]);

    let counts = distribution(&balancer, "w", &config, &candidates, 10).await;
    assert_eq!(counts.get("w-0"), Some(&5));
    assert_eq!(counts.get("w-1"), Some(&5));
}

/// 测试：加权策略只会选中候选列表中的实例，且高权重实例更常被选中
#[tokio::test]
async fn test_weighted_prefers_heavier_instance() {
    let balancer = LoadBalancer::new();
    let config = LoadBalancingConfig::default().with_algorithm(LoadBalancingAlgorithm::Weighted);
    let candidates = instances("w", &[1, 99]);

    let counts = distribution(&balancer, "w", &config, &candidates, 500).await;
    let heavy = counts.get("w-1").copied().unwrap_or(0);
    let light = counts.get("w-0").copied().unwrap_or(0);
    assert_eq!(heavy + light, 500);
    assert!(heavy > light);
}

/// 测试：最少连接选择在途连接最少的实例，相同时取靠前的实例
#[tokio::test]
async fn test_least_connections() {
    let balancer = LoadBalancer::new();
    let config = LoadBalancingConfig::default().with_algorithm(LoadBalancingAlgorithm::LeastConnections);
    let candidates = instances("lc", &[1, 1, 1]);

    let first = balancer
        .select_instance("lc", &config, &candidates)
        .await
        .expect("No instance selected");
    assert_eq!(first.id, "lc-0");

    let _busy0 = balancer.reserve(&candidates[0]);
    let _busy1 = balancer.reserve(&candidates[1]);
    let selected = balancer
        .select_instance("lc", &config, &candidates)
        .await
        .expect("No instance selected");
    assert_eq!(selected.id, "lc-2");
}

/// 测试：同一会话键的 10 个请求全部落在同一实例
#[tokio::test]
async fn test_sticky_session_pins_instance() {
    let balancer = LoadBalancer::new();
    let config = LoadBalancingConfig::default().with_sticky_sessions(true);
    let candidates = instances("sticky", &[1, 1, 1]);

    let mut chosen = Vec::new();
    for _ in 0..10 {
        let selected = balancer
            .select_instance_with_sticky_session("sticky", &config, &candidates, Some("user-42"))
            .await
            .expect("No instance selected");
        chosen.push(selected.id);
    }
    assert!(chosen.iter().all(|id| id == &chosen[0]), "{:?}", chosen);

    let stats = balancer.get_stats().await;
    assert_eq!(stats.service("sticky").map(|s| s.sticky_sessions), Some(1));
}

/// 测试：绑定实例从候选列表消失后重新选择
#[tokio::test]
async fn test_sticky_session_rebinds_when_instance_leaves() {
    let balancer = LoadBalancer::new();
    let config = LoadBalancingConfig::default().with_sticky_sessions(true);
    let candidates = instances("sticky", &[1, 1]);

    let bound = balancer
        .select_instance_with_sticky_session("sticky", &config, &candidates, Some("s"))
        .await
        .expect("No instance selected");

    let remaining: Vec<ServiceInstance> = candidates.into_iter().filter(|i| i.id != bound.id).collect();
    let rebound = balancer
        .select_instance_with_sticky_session("sticky", &config, &remaining, Some("s"))
        .await
        .expect("No instance selected");
    assert_ne!(rebound.id, bound.id);

    let again = balancer
        .select_instance_with_sticky_session("sticky", &config, &remaining, Some("s"))
        .await
        .expect("No instance selected");
    assert_eq!(again.id, rebound.id);
}

/// 测试：大量不同客户端不会让会话表无限增长，最新的绑定仍然有效
#[tokio::test]
async fn test_sticky_sessions_are_bounded() {
    let balancer = LoadBalancer::with_session_limits(SessionLimits::new(100, Duration::from_secs(600)));
    let config = LoadBalancingConfig::default().with_sticky_sessions(true);
    let candidates = instances("crowd", &[1, 1, 1]);

    let mut last = None;
    for client in 0..1_000 {
        let key = format!("10.1.{}.{}", client / 256, client % 256);
        let selected = balancer
            .select_instance_with_sticky_session("crowd", &config, &candidates, Some(&key))
            .await
            .expect("No instance selected");
        last = Some((key, selected.id));
    }

    let stats = balancer.get_stats().await;
    assert_eq!(stats.service("crowd").map(|s| s.sticky_sessions), Some(100));

    let (key, instance_id) = last.expect("No requests sent");
    let again = balancer
        .select_instance_with_sticky_session("crowd", &config, &candidates, Some(&key))
        .await
        .expect("No instance selected");
    assert_eq!(again.id, instance_id);
}

/// 测试：空闲超时的会话绑定失效后按算法重新选择
#[tokio::test]
async fn test_sticky_session_expires() {
    let balancer = LoadBalancer::with_session_limits(SessionLimits::new(100, Duration::ZERO));
    let config = LoadBalancingConfig::default().with_sticky_sessions(true);
    let candidates = instances("idle", &[1, 1]);

    let first = balancer
        .select_instance_with_sticky_session("idle", &config, &candidates, Some("s"))
        .await
        .expect("No instance selected");
    let second = balancer
        .select_instance_with_sticky_session("idle", &config, &candidates, Some("s"))
        .await
        .expect("No instance selected");
    assert_ne!(first.id, second.id);
}

/// 测试：空候选列表返回 None
#[tokio::test]
async fn test_empty_candidates() {
    let balancer = LoadBalancer::new();
    for algorithm in [
        LoadBalancingAlgorithm::RoundRobin,
        LoadBalancingAlgorithm::Weighted,
        LoadBalancingAlgorithm::LeastConnections,
        LoadBalancingAlgorithm::Random,
    ] {
        let config = LoadBalancingConfig::default().with_algorithm(algorithm);
        assert!(balancer.select_instance("none", &config, &[]).await.is_none());
    }
}

/// 测试：连接计数不会低于 0，占用在 drop 时释放
#[tokio::test]
async fn test_connection_counter_floor() {
    let balancer = LoadBalancer::new();
    let candidates = instances("conn", &[1]);

    assert!(balancer.decrement_connections("conn-0", &candidates));
    assert_eq!(candidates[0].connections(), 0);

    assert!(balancer.increment_connections("conn-0", &candidates));
    assert_eq!(candidates[0].connections(), 1);
    {
        let reservation = balancer.reserve(&candidates[0]);
        assert_eq!(reservation.instance_id(), "conn-0");
        assert_eq!(candidates[0].connections(), 2);
    }
    assert_eq!(candidates[0].connections(), 1);

    assert!(balancer.decrement_connections("conn-0", &candidates));
    assert!(balancer.decrement_connections("conn-0", &candidates));
    assert_eq!(candidates[0].connections(), 0);

    assert!(!balancer.increment_connections("conn-9", &candidates));
}
